//! In-Memory Conversation History
//!
//! Information Hiding:
//! - Per-channel ring buffers hidden behind append/get
//! - Bound changes are absorbed internally by truncating from the front
//! - Lost when the owning process stops; nothing here touches disk

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug)]
struct BoundedTurns {
    max_length: usize,
    turns: VecDeque<ConversationTurn>,
}

impl BoundedTurns {
    fn new(max_length: usize) -> Self {
        Self {
            max_length,
            turns: VecDeque::new(),
        }
    }

    /// Adopts a new bound, keeping the most recent turns.
    fn rebound(&mut self, max_length: usize) {
        if self.max_length != max_length {
            tracing::debug!(
                "[ConversationHistory] Rebounding history from {} to {} turns",
                self.max_length,
                max_length
            );
            self.max_length = max_length;
            self.trim();
        }
    }

    fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        self.trim();
    }

    fn trim(&mut self) {
        while self.turns.len() > self.max_length {
            self.turns.pop_front();
        }
    }
}

/// Recent turns per conversation channel, oldest first.
/// Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    channels: Arc<Mutex<HashMap<u64, BoundedTurns>>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(
        &self,
        channel_id: u64,
        role: Role,
        content: impl Into<String>,
        max_length: usize,
    ) {
        let mut channels = self.channels.lock().await;
        let history = channels
            .entry(channel_id)
            .or_insert_with(|| BoundedTurns::new(max_length));
        history.rebound(max_length);
        history.push(ConversationTurn {
            role,
            content: content.into(),
        });
        tracing::debug!(
            "[ConversationHistory] Channel {} now holds {} turns",
            channel_id,
            history.turns.len()
        );
    }

    pub async fn get(&self, channel_id: u64, max_length: usize) -> Vec<ConversationTurn> {
        let mut channels = self.channels.lock().await;
        match channels.get_mut(&channel_id) {
            Some(history) => {
                history.rebound(max_length);
                history.turns.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}
