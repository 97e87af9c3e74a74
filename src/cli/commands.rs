use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "demented")]
#[command(author, version, about = "Admin and smoke-test console for the Demented bot core", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the bot a single question
    Ask { question: String },

    /// Talk to the bot from stdin as one user in one channel
    Chat {
        #[arg(long, default_value = "1")]
        guild: u64,

        #[arg(long, default_value = "1")]
        channel: u64,

        #[arg(long, default_value = "1")]
        user: u64,

        #[arg(long, default_value = "Admin")]
        name: String,
    },

    /// Fetch a joke (Programming, Misc, Dark, Spooky, Christmas, Any)
    Joke {
        #[arg(default_value = "Any")]
        category: String,
    },

    /// Suggest something to do
    Activity {
        #[arg(default_value = "1")]
        participants: u32,
    },

    /// Fetch a random image post from a subreddit
    Meme {
        #[arg(default_value = "memes")]
        subreddit: String,
    },

    /// Store a fact about a user
    Remember {
        user: u64,
        fact: String,

        /// Who is adding the fact (defaults to the user themselves)
        #[arg(long)]
        by: Option<u64>,
    },

    /// List what the bot remembers about a user
    Facts {
        user: u64,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show or adjust how the bot feels about a user
    Sentiment {
        user: u64,

        #[arg(short, long, allow_hyphen_values = true)]
        adjust: Option<f64>,
    },

    /// View or change a guild's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List guilds with autonomous chat channels
    AutonomyGuilds,

    /// Show the bot's mood and its opinion of a user
    SoulStatus { user: u64 },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show every setting for a guild
    View { guild: u64 },

    AddAutonomy { guild: u64, channel: u64 },

    RemoveAutonomy { guild: u64, channel: u64 },

    AddRestricted { guild: u64, channel: u64 },

    RemoveRestricted { guild: u64, channel: u64 },

    /// Set or clear (omit the role) the verified/unverified role
    SetRole {
        guild: u64,

        /// verified_role_id or unverified_role_id
        key: String,

        role: Option<u64>,
    },
}
