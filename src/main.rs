use anyhow::{Context, Result};
use clap::Parser;
use demented::cli::{Cli, Commands, ConfigAction};
use demented::core::content::Joke;
use demented::{utils, Brain, ConfigKey, ConfigValue, IncomingMessage, Settings};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new().context("Failed to load configuration")?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let brain = Brain::start(settings)?;

    let result = match cli.command {
        Commands::Ask { question } => handle_ask(&brain, &question).await,
        Commands::Chat {
            guild,
            channel,
            user,
            name,
        } => handle_chat(&brain, guild, channel, user, name).await,
        Commands::Joke { category } => handle_joke(&brain, &category).await,
        Commands::Activity { participants } => handle_activity(&brain, participants).await,
        Commands::Meme { subreddit } => handle_meme(&brain, &subreddit).await,
        Commands::Remember { user, fact, by } => {
            handle_remember(&brain, user, &fact, by.unwrap_or(user)).await
        }
        Commands::Facts { user, limit } => handle_facts(&brain, user, limit).await,
        Commands::Sentiment { user, adjust } => handle_sentiment(&brain, user, adjust).await,
        Commands::Config { action } => handle_config(&brain, action).await,
        Commands::AutonomyGuilds => handle_autonomy_guilds(&brain).await,
        Commands::SoulStatus { user } => handle_soul_status(&brain, user).await,
    };

    // Shutdown gracefully
    brain.shutdown().await?;

    result
}

async fn handle_ask(brain: &Brain, question: &str) -> Result<()> {
    utils::print_info("Thinking...");
    println!("\n{}", brain.ask(question).await);
    Ok(())
}

async fn handle_chat(brain: &Brain, guild: u64, channel: u64, user: u64, name: String) -> Result<()> {
    utils::print_header("Chat Mode");
    utils::print_info(&format!(
        "Talking as {} ({}) in channel {} (Ctrl+C to exit)",
        name, user, channel
    ));
    utils::print_info("Lines that don't address the bot by name may be ignored\n");

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt(&format!("{}: ", name));
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            return Ok(());
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let message = IncomingMessage::new(guild, channel, user, name.clone(), input);
        match brain.respond(&message).await {
            Some(reply) if reply.mention_author => println!("<@{}> {}\n", user, reply.text),
            Some(reply) => println!("{}\n", reply.text),
            None => utils::print_info("(no reply)\n"),
        }
    }
}

async fn handle_joke(brain: &Brain, category: &str) -> Result<()> {
    match brain.joke(category).await {
        Joke::Single(joke) => println!("{}", joke),
        Joke::TwoPart { setup, delivery } => {
            println!("{}", setup);
            utils::print_success(&delivery);
        }
    }
    Ok(())
}

async fn handle_activity(brain: &Brain, participants: u32) -> Result<()> {
    let activity = brain.activity(participants).await;
    utils::print_header(&activity.activity);
    utils::print_field("Type", &activity.kind);
    if let Some(participants) = activity.participants {
        utils::print_field("Participants", participants);
    }
    utils::print_field("Price", format!("{:.2}", activity.price));
    utils::print_field("Accessibility", format!("{:.2}", activity.accessibility));
    Ok(())
}

async fn handle_meme(brain: &Brain, subreddit: &str) -> Result<()> {
    match brain.meme(subreddit).await {
        Ok(meme) => {
            utils::print_header(&meme.title);
            utils::print_field("Image", &meme.image_url);
            utils::print_field("Link", &meme.permalink);
            utils::print_field("Score", format!("👍 {} | 💬 {}", meme.ups, meme.comments));
        }
        Err(e) => utils::print_error(&e.to_string()),
    }
    Ok(())
}

async fn handle_remember(brain: &Brain, user: u64, fact: &str, added_by: u64) -> Result<()> {
    if brain.remember(user, fact, added_by).await {
        utils::print_success(&format!("Remembered for {}: {}", user, fact));
    } else {
        utils::print_error("Failed to store the fact");
    }
    Ok(())
}

async fn handle_facts(brain: &Brain, user: u64, limit: usize) -> Result<()> {
    let facts = brain.store().list_facts(user, limit).await;
    if facts.is_empty() {
        utils::print_info(&format!("Nothing remembered about {}", user));
        return Ok(());
    }

    utils::print_header(&format!("Facts about {}", user));
    for fact in facts {
        println!("- {}", fact);
    }
    Ok(())
}

async fn handle_sentiment(brain: &Brain, user: u64, adjust: Option<f64>) -> Result<()> {
    let score = match adjust {
        Some(delta) => brain.store().adjust_sentiment(user, delta).await?,
        None => brain.store().read_sentiment(user).await,
    };
    println!("Sentiment towards {}: {}", user, utils::sentiment_text(score));
    Ok(())
}

async fn handle_config(brain: &Brain, action: ConfigAction) -> Result<()> {
    let store = brain.store();

    let (guild, key, channel, add) = match action {
        ConfigAction::View { guild } => {
            let config = store.guild_config(guild).await?;
            utils::print_header(&format!("Guild {}", guild));
            utils::print_field("autonomy_channels", format!("{:?}", config.autonomy_channels));
            utils::print_field("restricted_channels", format!("{:?}", config.restricted_channels));
            utils::print_field("verified_role_id", format!("{:?}", config.verified_role_id));
            utils::print_field("unverified_role_id", format!("{:?}", config.unverified_role_id));
            return Ok(());
        }
        ConfigAction::SetRole { guild, key, role } => {
            let key: ConfigKey = key.parse()?;
            store.set_config(guild, key, ConfigValue::Role(role)).await?;
            utils::print_success(&format!("{} set to {:?}", key, role));
            return Ok(());
        }
        ConfigAction::AddAutonomy { guild, channel } => {
            (guild, ConfigKey::AutonomyChannels, channel, true)
        }
        ConfigAction::RemoveAutonomy { guild, channel } => {
            (guild, ConfigKey::AutonomyChannels, channel, false)
        }
        ConfigAction::AddRestricted { guild, channel } => {
            (guild, ConfigKey::RestrictedChannels, channel, true)
        }
        ConfigAction::RemoveRestricted { guild, channel } => {
            (guild, ConfigKey::RestrictedChannels, channel, false)
        }
    };

    let changed = if add {
        store.add_channel(guild, key, channel).await?
    } else {
        store.remove_channel(guild, key, channel).await?
    };

    if changed {
        utils::print_success(&format!("Updated {} for guild {}", key, guild));
    } else {
        utils::print_info(&format!("{} already up to date for guild {}", key, guild));
    }
    Ok(())
}

async fn handle_autonomy_guilds(brain: &Brain) -> Result<()> {
    let guilds = brain.store().list_guilds_with_autonomy().await?;
    if guilds.is_empty() {
        utils::print_info("No guilds have autonomy channels configured");
    }
    for guild in guilds {
        println!("{}", guild);
    }
    Ok(())
}

async fn handle_soul_status(brain: &Brain, user: u64) -> Result<()> {
    let status = brain.soul_status(user).await;
    utils::print_header("Soul Status");
    utils::print_field("Mood", format!("{} (boredom {:.1})", status.mood, status.boredom));
    utils::print_field("Sentiment", utils::sentiment_text(status.sentiment));
    utils::print_field("Opinion", status.sentiment_description);
    Ok(())
}
