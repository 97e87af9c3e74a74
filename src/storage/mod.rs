//! Bot State Storage
//!
//! Information Hiding:
//! - `memory`: short-lived per-channel conversation turns, process lifetime only
//! - `sqlite`: durable per-user and per-guild state behind typed operations
//! - SQL text, column names and list encodings never leave this module

use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::{ConversationHistory, ConversationTurn, Role};
pub use sqlite::{ConfigKey, ConfigValue, GuildConfig, OAuthTokens, SqliteStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed channel list: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("config key '{key}' does not accept {value:?}")]
    ValueMismatch { key: ConfigKey, value: ConfigValue },

    #[error("store actor is no longer running")]
    ActorGone,
}

pub type StoreResult<T> = Result<T, StoreError>;
