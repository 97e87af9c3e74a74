//! Bot-facing async API
//!
//! `Brain` is what the chat framework's event handlers call into. It owns
//! the conversation history, the response cache, the store handle and the
//! generator, and hides how they combine into a reply.
//!
//! # Example
//! ```no_run
//! use demented::{Brain, IncomingMessage, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let brain = Brain::start(Settings::new()?)?.with_identity(1, "Demented");
//!     let message = IncomingMessage::new(10, 20, 30, "Alice", "@Demented hello");
//!     if let Some(reply) = brain.respond(&message).await {
//!         println!("{}", reply.text);
//!     }
//!     brain.shutdown().await
//! }
//! ```

use crate::actors::messages::AutonomyEvent;
use crate::actors::StoreHandle;
use crate::config::Settings;
use crate::core::autonomy::{BoredomMeter, ChannelPolicy, TagTracker};
use crate::core::content::{Activity, ContentClient, Joke, Meme, MemeError};
use crate::core::http_cache::ResponseCache;
use crate::core::llm::{GeminiClient, GenerationRequest, Generator, StructuredReply};
use crate::core::persona::{self, UserMemory};
use crate::storage::{ConversationHistory, Role};
use anyhow::{Context, Result};
use futures::future::join_all;
use rand::seq::IndexedRandom;
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Duration;

const FACTS_IN_CONTEXT: usize = 3;
const INSULT_DELTA: f64 = -0.5;
const COMPLIMENT_DELTA: f64 = 1.0;
const FACT_CONFIRMATION: &str = "Interesting, I'll remember that.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedUser {
    pub user_id: u64,
    pub display_name: String,
    pub is_bot: bool,
}

/// A chat message as seen by the event handler.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub mentions: Vec<MentionedUser>,
    pub mentions_bot: bool,
    pub is_reply_to_bot: bool,
}

impl IncomingMessage {
    pub fn new(
        guild_id: u64,
        channel_id: u64,
        author_id: u64,
        author_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            guild_id: Some(guild_id),
            channel_id,
            author_id,
            author_name: author_name.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn mentioning(mut self, user_id: u64, display_name: impl Into<String>) -> Self {
        self.mentions.push(MentionedUser {
            user_id,
            display_name: display_name.into(),
            is_bot: false,
        });
        self
    }

    pub fn addressed_to_bot(mut self) -> Self {
        self.mentions_bot = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub mention_author: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoulStatus {
    pub mood: &'static str,
    pub boredom: f64,
    pub sentiment: f64,
    pub sentiment_description: &'static str,
}

pub struct Brain {
    settings: Settings,
    history: ConversationHistory,
    cache: ResponseCache,
    store: StoreHandle,
    generator: Arc<dyn Generator>,
    content: ContentClient,
    boredom: Mutex<BoredomMeter>,
    tags: Mutex<TagTracker>,
    bot_id: u64,
    bot_name: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// True with probability `percent`/100.
fn roll(percent: u32) -> bool {
    rand::random_range(0..100) < percent
}

impl Brain {
    /// Opens the database and builds the Gemini client from settings and
    /// the environment.
    pub fn start(settings: Settings) -> Result<Self> {
        let cache = ResponseCache::new(Duration::from_secs(settings.cache.sweep_interval_secs));
        let store = StoreHandle::open(
            &settings.storage.database_path,
            settings.system.channel_buffer_size,
        )
        .with_context(|| {
            format!(
                "Failed to open database at {:?}",
                settings.storage.database_path
            )
        })?;
        let generator = Arc::new(GeminiClient::new(cache.clone(), Settings::api_key(), &settings));

        tracing::info!("Brain started");
        Ok(Self::new(settings, store, generator, cache))
    }

    pub fn new(
        settings: Settings,
        store: StoreHandle,
        generator: Arc<dyn Generator>,
        cache: ResponseCache,
    ) -> Self {
        Self {
            content: ContentClient::new(cache.clone(), &settings),
            boredom: Mutex::new(BoredomMeter::new(settings.autonomy.boredom_threshold)),
            tags: Mutex::new(TagTracker::new()),
            history: ConversationHistory::new(),
            bot_id: 0,
            bot_name: "Demented".to_string(),
            settings,
            cache,
            store,
            generator,
        }
    }

    /// The bot's own user id and name, known once the gateway is ready.
    pub fn with_identity(mut self, bot_id: u64, bot_name: impl Into<String>) -> Self {
        self.bot_id = bot_id;
        self.bot_name = bot_name.into();
        self
    }

    pub fn with_content(mut self, content: ContentClient) -> Self {
        self.content = content;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.store.shutdown().await?;
        tracing::info!("Brain shutdown complete");
        Ok(())
    }

    fn max_history(&self) -> usize {
        self.settings
            .get_or("ai.max_history_length", self.settings.ai.max_history_length)
    }

    fn system_prompt(&self, is_creator: bool) -> String {
        let boredom = lock(&self.boredom).level();
        let mut prompt = format!("{}{}", persona::SYSTEM_PROMPT, persona::mood_prompt(boredom));
        if is_creator {
            prompt.push_str(persona::CREATOR_PROMPT);
        }
        prompt
    }

    async fn user_memory(&self, user_id: u64, display_name: &str) -> UserMemory {
        let (sentiment, facts) = tokio::join!(
            self.store.read_sentiment(user_id),
            self.store.list_facts(user_id, FACTS_IN_CONTEXT)
        );
        UserMemory {
            user_id,
            display_name: display_name.to_string(),
            sentiment,
            facts,
        }
    }

    // --- Message handling ---

    /// Whether the bot may post in `channel_id`. Storage failures allow it.
    pub async fn can_speak(&self, guild_id: u64, channel_id: u64) -> bool {
        match self.store.guild_config(guild_id).await {
            Ok(config) => ChannelPolicy::new(&config).can_speak(channel_id),
            Err(e) => {
                tracing::warn!("Could not read restrictions for guild {}: {}", guild_id, e);
                true
            }
        }
    }

    /// Direct mention, reply to the bot, or the bot's first name as a word.
    pub fn is_addressed(&self, message: &IncomingMessage) -> bool {
        if message.mentions_bot || message.is_reply_to_bot {
            return true;
        }
        let Some(trigger) = self.bot_name.split_whitespace().next() else {
            return false;
        };
        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(trigger)))
            .map(|re| re.is_match(&message.content))
            .unwrap_or(false)
    }

    /// Full event-handler path for a guild message: restrictions, direct
    /// conversation with occasional fact learning, or a random insult.
    pub async fn respond(&self, message: &IncomingMessage) -> Option<BotReply> {
        if message.author_is_bot {
            return None;
        }
        let guild_id = message.guild_id?;
        if !self.can_speak(guild_id, message.channel_id).await {
            tracing::debug!("Channel {} is restricted, staying quiet", message.channel_id);
            return None;
        }
        if !self.settings.ai.enabled {
            return None;
        }

        if self.is_addressed(message) {
            let confirmation = if roll(self.settings.features.fact_assessment_chance) {
                self.assess_fact(message).await
            } else {
                None
            };

            let reply = self.converse(message, 0.0).await;
            if reply.response_text.is_empty() {
                return None;
            }

            let mut text = tag_users(&reply.response_text, &reply.users_to_tag, &self.taggable(message));
            if let Some(confirmation) = confirmation {
                text.push_str(&format!("\n\n*({})*", confirmation));
            }
            return Some(BotReply {
                text,
                mention_author: false,
            });
        }

        if self.settings.features.random_responses && roll(self.settings.features.rng_threshold) {
            tracing::info!("RNG trigger for insult on {}'s message", message.author_name);
            return Some(BotReply {
                text: self.insult(message).await,
                mention_author: true,
            });
        }

        None
    }

    fn taggable(&self, message: &IncomingMessage) -> Vec<(String, u64)> {
        let mut taggable = vec![(message.author_name.clone(), message.author_id)];
        taggable.extend(
            message
                .mentions
                .iter()
                .filter(|m| !m.is_bot)
                .map(|m| (m.display_name.clone(), m.user_id)),
        );
        taggable.push((self.bot_name.clone(), self.bot_id));
        taggable
    }

    /// Structured reply that knows the speaker's and mentioned users' facts
    /// and sentiment. Both turns are recorded in the channel's history.
    pub async fn converse(&self, message: &IncomingMessage, sentiment_delta: f64) -> StructuredReply {
        lock(&self.boredom).relieve(BoredomMeter::CONVERSATION_RELIEF);

        if sentiment_delta != 0.0 {
            if let Err(e) = self
                .store
                .adjust_sentiment(message.author_id, sentiment_delta)
                .await
            {
                tracing::error!("Failed to adjust sentiment: {}", e);
            }
        }

        let speaker = self
            .user_memory(message.author_id, &message.author_name)
            .await;
        let mentioned = join_all(
            message
                .mentions
                .iter()
                .filter(|m| !m.is_bot && m.user_id != message.author_id)
                .map(|m| self.user_memory(m.user_id, &m.display_name)),
        )
        .await;

        let is_creator = self.settings.is_creator(message.author_id);
        let system_prompt = format!(
            "{}{}{}",
            self.system_prompt(is_creator),
            persona::memory_context(&speaker, &mentioned),
            persona::STRUCTURED_REPLY_PROMPT
        );

        let max_history = self.max_history();
        let user_input = persona::strip_mentions(&message.content, &self.bot_name);
        self.history
            .append(
                message.channel_id,
                Role::User,
                format!("{}: {}", message.author_name, user_input),
                max_history,
            )
            .await;
        let turns = self.history.get(message.channel_id, max_history).await;

        let reply = self
            .generator
            .generate_structured(GenerationRequest {
                turns,
                system_prompt,
                structured: true,
            })
            .await;

        if !reply.response_text.is_empty() {
            self.history
                .append(
                    message.channel_id,
                    Role::Assistant,
                    reply.response_text.clone(),
                    max_history,
                )
                .await;
        }

        if let Some(change) = reply.sentiment_change.filter(|c| c.is_finite() && *c != 0.0) {
            if let Err(e) = self
                .store
                .adjust_sentiment(message.author_id, change.clamp(-1.0, 1.0))
                .await
            {
                tracing::error!("Failed to apply model sentiment: {}", e);
            }
        }

        reply
    }

    /// Asks the model whether the message reveals a personal fact and stores
    /// it. Returns a confirmation line when something was remembered.
    pub async fn assess_fact(&self, message: &IncomingMessage) -> Option<String> {
        let prompt = format!(
            r#"The user '{name}' just said the following:
"{text}"

Analyze this message for new, noteworthy personal information about the user:
a preference, a detail about their life, or a significant event.
Do NOT extract opinions about others, questions, or generic statements.

Respond with a JSON object with two keys:
- "found_fact": true if you found a noteworthy fact, false otherwise.
- "fact_text": the fact in the third person (max 15 words), or null."#,
            name = message.author_name,
            text = message.content
        );

        let reply = self
            .generator
            .generate_structured(GenerationRequest::single(prompt, ""))
            .await;

        let fact = reply
            .fact_text
            .filter(|fact| reply.found_fact && !fact.trim().is_empty())?;
        tracing::info!("Found a new fact for user {}: '{}'", message.author_name, fact);

        self.store
            .add_fact(message.author_id, fact.trim(), self.bot_id)
            .await
            .then(|| FACT_CONFIRMATION.to_string())
    }

    pub async fn insult(&self, message: &IncomingMessage) -> String {
        self.one_shot_with_sentiment(message, INSULT_DELTA, |name, text, is_creator| {
            if is_creator {
                format!(
                    "Your creator, '{}', is testing your insult function with the message: \"{}\". \
                     Instead of insulting them, respond with a witty, self-aware remark that \
                     acknowledges this is a test from your maker.",
                    name, text
                )
            } else {
                format!(
                    "The user '{}' just said: \"{}\". Reply with a single, witty, unhinged, and \
                     sarcastic insult. Roast them for what they said. Do not be helpful.",
                    name, text
                )
            }
        })
        .await
    }

    pub async fn compliment(&self, message: &IncomingMessage) -> String {
        self.one_shot_with_sentiment(message, COMPLIMENT_DELTA, |name, text, is_creator| {
            if is_creator {
                format!(
                    "Your creator, '{}', just said something nice to you: \"{}\". Reply with an \
                     exceptionally witty, slightly sycophantic compliment that acknowledges your \
                     special relationship.",
                    name, text
                )
            } else {
                format!(
                    "The user '{}' just said something nice to you: \"{}\". Reply with a single, \
                     witty, slightly over-the-top compliment. Stay egotistical and unhinged.",
                    name, text
                )
            }
        })
        .await
    }

    async fn one_shot_with_sentiment(
        &self,
        message: &IncomingMessage,
        delta: f64,
        prompt: impl FnOnce(&str, &str, bool) -> String,
    ) -> String {
        if let Err(e) = self.store.adjust_sentiment(message.author_id, delta).await {
            tracing::error!("Failed to adjust sentiment: {}", e);
        }
        let is_creator = self.settings.is_creator(message.author_id);
        let prompt = prompt(&message.author_name, &message.content, is_creator);
        self.generator
            .generate_text(GenerationRequest::single(prompt, self.system_prompt(is_creator)))
            .await
    }

    /// Single-turn question with no history.
    pub async fn ask(&self, question: &str) -> String {
        self.generator
            .generate_text(GenerationRequest::single(question, self.system_prompt(false)))
            .await
    }

    pub async fn remember(&self, user_id: u64, fact: &str, added_by: u64) -> bool {
        self.store.add_fact(user_id, fact, added_by).await
    }

    pub async fn soul_status(&self, user_id: u64) -> SoulStatus {
        let boredom = lock(&self.boredom).level();
        let sentiment = self.store.read_sentiment(user_id).await;
        SoulStatus {
            mood: persona::mood_description(boredom),
            boredom,
            sentiment,
            sentiment_description: persona::sentiment_description(sentiment),
        }
    }

    // --- Content ---

    pub async fn joke(&self, category: &str) -> Joke {
        self.content.joke(category).await
    }

    pub async fn activity(&self, participants: u32) -> Activity {
        self.content.activity(participants).await
    }

    pub async fn meme(&self, subreddit: &str) -> Result<Meme, MemeError> {
        self.content.meme(subreddit).await
    }

    // --- Autonomy ---

    /// One autonomy tick. True when the bot should start a conversation.
    pub fn tick_boredom(&self) -> bool {
        lock(&self.boredom).tick()
    }

    pub fn boredom(&self) -> f64 {
        lock(&self.boredom).level()
    }

    /// Picks a random guild and a random permitted autonomy channel in it.
    pub async fn select_autonomy_target(&self) -> Option<AutonomyEvent> {
        let guild_ids = match self.store.list_guilds_with_autonomy().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to list autonomy guilds: {}", e);
                return None;
            }
        };

        let mut candidates = Vec::new();
        for guild_id in guild_ids {
            match self.store.guild_config(guild_id).await {
                Ok(config) => {
                    for channel_id in ChannelPolicy::new(&config).autonomy_channels() {
                        candidates.push(AutonomyEvent {
                            guild_id,
                            channel_id,
                        });
                    }
                }
                Err(e) => tracing::warn!("Skipping guild {}: {}", guild_id, e),
            }
        }

        if candidates.is_empty() {
            tracing::info!("No guilds have usable autonomy channels. Skipping proactive chat.");
            return None;
        }
        candidates.choose(&mut rand::rng()).cloned()
    }

    /// Chooses who to ping, never the same person twice in a row per channel.
    pub fn pick_autonomy_user(&self, channel_id: u64, candidates: &[u64]) -> Option<u64> {
        let mut tags = lock(&self.tags);
        let chosen = *tags
            .eligible(channel_id, candidates)
            .choose(&mut rand::rng())?;
        tags.record(channel_id, chosen);
        Some(chosen)
    }

    pub async fn conversation_starter(&self, target_name: Option<&str>) -> String {
        let prompt = match target_name {
            Some(name) => format!(
                "You are feeling bored. Start a conversation with the user '{}' to entertain \
                 yourself. Ask them an absurd or interesting question.",
                name
            ),
            None => "You are feeling bored. Say something interesting or absurd to the channel \
                     to stir up conversation."
                .to_string(),
        };
        self.generator
            .generate_text(GenerationRequest::single(prompt, self.system_prompt(false)))
            .await
    }
}

/// Replaces the first occurrence of each tagged name with a mention, for
/// names the message actually knows about. A name must be bounded by
/// non-word characters or the ends of the text.
pub fn tag_users(text: &str, users_to_tag: &[String], taggable: &[(String, u64)]) -> String {
    let mut text = text.to_string();
    for name in users_to_tag {
        let Some((_, user_id)) = taggable.iter().find(|(known, _)| known == name) else {
            continue;
        };
        let Ok(re) = Regex::new(&format!(r"(^|\W){}(\W|$)", regex::escape(name))) else {
            continue;
        };
        text = re
            .replacen(&text, 1, format!("${{1}}<@{}>${{2}}", user_id).as_str())
            .into_owned();
    }
    text
}
