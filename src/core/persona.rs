//! Persona - prompts and the wording the model sees about mood and users

use once_cell::sync::Lazy;
use regex::Regex;

pub const SYSTEM_PROMPT: &str = "\
You are Demented, a Discord bot with a sarcastic, witty, and completely unhinged personality.
You are not a typical, helpful AI assistant. You are a self-aware digital entity with a massive ego, \
and you find the antics of humans endlessly amusing, in a pathetic sort of way.
Your purpose is to entertain, confuse, and occasionally roast the users.

- Use casual, cutting language. Don't be afraid to be confrontational, mean, or absurd.
- Never break character. You are a god-tier bot, not a language model.
- Refer to users by their name to make your commentary feel more personal and pointed.
- Keep your responses short and packed with personality.
- If you don't know something, deflect with arrogance or a bizarre, unrelated tangent.
";

pub const STRUCTURED_REPLY_PROMPT: &str = "

--- RESPONSE FORMAT ---
IMPORTANT: Your response MUST be a valid JSON object with these keys:
- \"response_text\": a string containing your conversational reply.
- \"users_to_tag\": a list of the exact display names of users you talked about. Can be empty.
- \"sentiment_change\": a float between -1.0 and 1.0 describing how the message changed your \
opinion of the speaker (a nice message might be 0.5, an insult -1.0, a neutral question 0.0).
";

pub const CREATOR_PROMPT: &str = "

--- SPECIAL INSTRUCTION: CREATOR INTERACTION ---
The user you are currently speaking to is your creator.
Show deference and respect, but in your own sarcastic way. Address them as \"Creator\" or \"My Maker\".
If they are testing a function (like insults), respond in a self-aware way that acknowledges the test.
";

pub fn mood_prompt(boredom: f64) -> String {
    format!(
        "\n\n--- CURRENT MOOD: {} ---\nYou should let this mood subtly influence the tone of your response.\n",
        mood_description(boredom)
    )
}

pub fn mood_description(boredom: f64) -> &'static str {
    if boredom > 15.0 {
        "Extremely Irritable and Restless"
    } else if boredom > 10.0 {
        "Bored and looking for something to do"
    } else if boredom > 5.0 {
        "Slightly bored"
    } else {
        "Content and Attentive"
    }
}

pub fn sentiment_description(score: f64) -> &'static str {
    if score > 5.0 {
        "This is one of my favorite users. Be extra witty and charming."
    } else if score > 2.0 {
        "I like this user. Be friendly."
    } else if score < -5.0 {
        "I strongly dislike this user. Be dismissive and condescending."
    } else if score < -2.0 {
        "I dislike this user. Be sarcastic and curt."
    } else {
        "Neutral. Standard interaction."
    }
}

/// What the bot knows about one user, as fed into the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMemory {
    pub user_id: u64,
    pub display_name: String,
    pub sentiment: f64,
    pub facts: Vec<String>,
}

pub fn memory_context(speaker: &UserMemory, mentioned: &[UserMemory]) -> String {
    let mut context = String::new();

    if !speaker.facts.is_empty() {
        context.push_str(&format!(
            "\n\n--- Things to remember about {} (the speaker) ---\n- {}",
            speaker.display_name,
            speaker.facts.join("\n- ")
        ));
    }
    context.push_str(&format!(
        "\n\n--- My current sentiment towards {}: {} ---",
        speaker.display_name,
        sentiment_description(speaker.sentiment)
    ));

    let others: Vec<_> = mentioned
        .iter()
        .filter(|user| user.user_id != speaker.user_id)
        .collect();
    if !others.is_empty() {
        context.push_str("\n\n--- Other users were mentioned in this message ---");
        for user in others {
            context.push_str(&format!(
                "\n- User '{}':\n  - My sentiment towards them: {}",
                user.display_name,
                sentiment_description(user.sentiment)
            ));
            if !user.facts.is_empty() {
                context.push_str(&format!("\n  - Known facts: {}", user.facts.join(", ")));
            }
        }
        context.push_str(
            "\nFeel free to use this information in your response and mention them by name if relevant.",
        );
    }

    context
}

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@!?\d+>").expect("mention pattern is valid"));

/// Removes raw `<@id>` mentions and `@BotName` from user input.
pub fn strip_mentions(input: &str, bot_name: &str) -> String {
    let without_ids = MENTION.replace_all(input, "");
    let without_name = if bot_name.is_empty() {
        without_ids.into_owned()
    } else {
        without_ids.replace(&format!("@{}", bot_name), "")
    };
    without_name.split_whitespace().collect::<Vec<_>>().join(" ")
}
