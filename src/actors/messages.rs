use crate::storage::{ConfigKey, ConfigValue, GuildConfig, OAuthTokens, StoreResult};
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<StoreResult<T>>;

/// Requests handled by the store actor. Each carries its own reply channel.
#[derive(Debug)]
pub enum StoreMessage {
    AdjustSentiment {
        user_id: u64,
        delta: f64,
        response: Reply<f64>,
    },
    ReadSentiment {
        user_id: u64,
        response: Reply<f64>,
    },
    AddFact {
        user_id: u64,
        text: String,
        added_by: u64,
        response: Reply<i64>,
    },
    ListFacts {
        user_id: u64,
        limit: usize,
        response: Reply<Vec<String>>,
    },
    GetConfig {
        guild_id: u64,
        key: ConfigKey,
        response: Reply<ConfigValue>,
    },
    SetConfig {
        guild_id: u64,
        key: ConfigKey,
        value: ConfigValue,
        response: Reply<()>,
    },
    AddChannel {
        guild_id: u64,
        key: ConfigKey,
        channel_id: u64,
        response: Reply<bool>,
    },
    RemoveChannel {
        guild_id: u64,
        key: ConfigKey,
        channel_id: u64,
        response: Reply<bool>,
    },
    GuildConfig {
        guild_id: u64,
        response: Reply<GuildConfig>,
    },
    GuildsWithAutonomy {
        response: Reply<Vec<u64>>,
    },
    StoreTokens {
        user_id: u64,
        access_token: String,
        refresh_token: String,
        expires_in_secs: i64,
        response: Reply<()>,
    },
    Tokens {
        user_id: u64,
        response: Reply<Option<OAuthTokens>>,
    },
    DeleteTokens {
        user_id: u64,
        response: Reply<bool>,
    },
    AuthorizedUsers {
        response: Reply<Vec<u64>>,
    },
    Shutdown,
}

/// Emitted by the autonomy actor when the bot is bored enough to start a
/// conversation. The chat-framework side decides who, if anyone, to mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutonomyEvent {
    pub guild_id: u64,
    pub channel_id: u64,
}

#[derive(Debug)]
pub enum AutonomyMessage {
    /// Run one boredom check right away.
    TickNow,
    Shutdown,
}
