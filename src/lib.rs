//! Demented - conversational core of a sarcastic Discord bot
//!
//! This library holds everything the bot needs besides the gateway itself:
//! bounded per-channel conversation history, a TTL cache for outbound HTTP,
//! a SQLite store for sentiment, facts and guild settings, and the `Brain`
//! that combines them with a generative-language model.

pub mod actors;
pub mod config;
pub mod core;
pub mod storage;
pub mod utils;

pub mod api;
pub mod cli;

pub use api::*;
pub use config::Settings;

pub use crate::actors::messages::AutonomyEvent;
pub use crate::actors::{AutonomyHandle, StoreHandle};
pub use crate::core::http_cache::{FetchRequest, Payload, ResponseCache};
pub use crate::core::llm::{GeminiClient, GenerationRequest, Generator, StructuredReply};
pub use crate::storage::{ConfigKey, ConfigValue, ConversationHistory, GuildConfig, StoreError};
