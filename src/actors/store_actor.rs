//! Store Actor - single owner of the SQLite connection
//!
//! Information Hiding:
//! - The connection lives on one dedicated thread and is never shared
//! - Callers only see an async handle; requests are serialized by the channel
//! - Storage failures are logged here before they reach callers

use crate::actors::messages::StoreMessage;
use crate::storage::{
    ConfigKey, ConfigValue, GuildConfig, OAuthTokens, SqliteStore, StoreError, StoreResult,
};
use std::path::Path;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;

/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct StoreHandle {
    sender: Sender<StoreMessage>,
}

impl StoreHandle {
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> StoreResult<Self> {
        Self::spawn(SqliteStore::open(path)?, buffer_size)
    }

    pub fn in_memory(buffer_size: usize) -> StoreResult<Self> {
        Self::spawn(SqliteStore::open_in_memory()?, buffer_size)
    }

    fn spawn(store: SqliteStore, buffer_size: usize) -> StoreResult<Self> {
        let (sender, receiver) = channel(buffer_size.max(1));
        std::thread::Builder::new()
            .name("store-actor".to_string())
            .spawn(move || store_actor(receiver, store))?;
        Ok(Self { sender })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StoreResult<T>>) -> StoreMessage,
    ) -> StoreResult<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(build(response_tx))
            .await
            .map_err(|_| StoreError::ActorGone)?;
        response_rx.await.map_err(|_| StoreError::ActorGone)?
    }

    /// Adds `delta` to the user's score and returns the new value.
    pub async fn adjust_sentiment(&self, user_id: u64, delta: f64) -> StoreResult<f64> {
        self.request(|response| StoreMessage::AdjustSentiment {
            user_id,
            delta,
            response,
        })
        .await
    }

    /// Current score, or 0.0 for users never seen (or if storage fails).
    pub async fn read_sentiment(&self, user_id: u64) -> f64 {
        self.request(|response| StoreMessage::ReadSentiment { user_id, response })
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Failed to read sentiment for user {}: {}", user_id, e);
                0.0
            })
    }

    pub async fn add_fact(&self, user_id: u64, text: impl Into<String>, added_by: u64) -> bool {
        let text = text.into();
        match self
            .request(|response| StoreMessage::AddFact {
                user_id,
                text,
                added_by,
                response,
            })
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to store fact for user {}: {}", user_id, e);
                false
            }
        }
    }

    /// Up to `limit` facts, newest first. Empty on storage failure.
    pub async fn list_facts(&self, user_id: u64, limit: usize) -> Vec<String> {
        self.request(|response| StoreMessage::ListFacts {
            user_id,
            limit,
            response,
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to list facts for user {}: {}", user_id, e);
            Vec::new()
        })
    }

    pub async fn get_config(&self, guild_id: u64, key: ConfigKey) -> StoreResult<ConfigValue> {
        self.request(|response| StoreMessage::GetConfig {
            guild_id,
            key,
            response,
        })
        .await
    }

    pub async fn set_config(
        &self,
        guild_id: u64,
        key: ConfigKey,
        value: ConfigValue,
    ) -> StoreResult<()> {
        self.request(|response| StoreMessage::SetConfig {
            guild_id,
            key,
            value,
            response,
        })
        .await
    }

    pub async fn add_channel(
        &self,
        guild_id: u64,
        key: ConfigKey,
        channel_id: u64,
    ) -> StoreResult<bool> {
        self.request(|response| StoreMessage::AddChannel {
            guild_id,
            key,
            channel_id,
            response,
        })
        .await
    }

    pub async fn remove_channel(
        &self,
        guild_id: u64,
        key: ConfigKey,
        channel_id: u64,
    ) -> StoreResult<bool> {
        self.request(|response| StoreMessage::RemoveChannel {
            guild_id,
            key,
            channel_id,
            response,
        })
        .await
    }

    pub async fn guild_config(&self, guild_id: u64) -> StoreResult<GuildConfig> {
        self.request(|response| StoreMessage::GuildConfig { guild_id, response })
            .await
    }

    pub async fn list_guilds_with_autonomy(&self) -> StoreResult<Vec<u64>> {
        self.request(|response| StoreMessage::GuildsWithAutonomy { response })
            .await
    }

    pub async fn store_tokens(
        &self,
        user_id: u64,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
    ) -> StoreResult<()> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        self.request(|response| StoreMessage::StoreTokens {
            user_id,
            access_token,
            refresh_token,
            expires_in_secs,
            response,
        })
        .await
    }

    pub async fn tokens(&self, user_id: u64) -> StoreResult<Option<OAuthTokens>> {
        self.request(|response| StoreMessage::Tokens { user_id, response })
            .await
    }

    pub async fn delete_tokens(&self, user_id: u64) -> StoreResult<bool> {
        self.request(|response| StoreMessage::DeleteTokens { user_id, response })
            .await
    }

    pub async fn authorized_users(&self) -> StoreResult<Vec<u64>> {
        self.request(|response| StoreMessage::AuthorizedUsers { response })
            .await
    }

    pub async fn shutdown(&self) -> StoreResult<()> {
        self.sender
            .send(StoreMessage::Shutdown)
            .await
            .map_err(|_| StoreError::ActorGone)
    }
}

fn store_actor(mut receiver: Receiver<StoreMessage>, store: SqliteStore) {
    tracing::info!("Store actor started");

    while let Some(message) = receiver.blocking_recv() {
        if let StoreMessage::Shutdown = message {
            tracing::info!("Store actor received shutdown signal");
            break;
        }
        handle_store_message(message, &store);
    }

    tracing::info!("Store actor stopped");
}

fn handle_store_message(message: StoreMessage, store: &SqliteStore) {
    // A dropped receiver means the caller gave up waiting; nothing to do.
    match message {
        StoreMessage::AdjustSentiment {
            user_id,
            delta,
            response,
        } => {
            let _ = response.send(logged(store.adjust_sentiment(user_id, delta)));
        }
        StoreMessage::ReadSentiment { user_id, response } => {
            let _ = response.send(logged(store.read_sentiment(user_id)));
        }
        StoreMessage::AddFact {
            user_id,
            text,
            added_by,
            response,
        } => {
            let _ = response.send(logged(store.add_fact(user_id, &text, added_by)));
        }
        StoreMessage::ListFacts {
            user_id,
            limit,
            response,
        } => {
            let _ = response.send(logged(store.list_facts(user_id, limit)));
        }
        StoreMessage::GetConfig {
            guild_id,
            key,
            response,
        } => {
            let _ = response.send(logged(store.get_config(guild_id, key)));
        }
        StoreMessage::SetConfig {
            guild_id,
            key,
            value,
            response,
        } => {
            let _ = response.send(logged(store.set_config(guild_id, key, value)));
        }
        StoreMessage::AddChannel {
            guild_id,
            key,
            channel_id,
            response,
        } => {
            let _ = response.send(logged(store.add_channel(guild_id, key, channel_id)));
        }
        StoreMessage::RemoveChannel {
            guild_id,
            key,
            channel_id,
            response,
        } => {
            let _ = response.send(logged(store.remove_channel(guild_id, key, channel_id)));
        }
        StoreMessage::GuildConfig { guild_id, response } => {
            let _ = response.send(logged(store.guild_config(guild_id)));
        }
        StoreMessage::GuildsWithAutonomy { response } => {
            let _ = response.send(logged(store.guilds_with_autonomy()));
        }
        StoreMessage::StoreTokens {
            user_id,
            access_token,
            refresh_token,
            expires_in_secs,
            response,
        } => {
            let _ = response.send(logged(store.store_tokens(
                user_id,
                &access_token,
                &refresh_token,
                expires_in_secs,
            )));
        }
        StoreMessage::Tokens { user_id, response } => {
            let _ = response.send(logged(store.tokens(user_id)));
        }
        StoreMessage::DeleteTokens { user_id, response } => {
            let _ = response.send(logged(store.delete_tokens(user_id)));
        }
        StoreMessage::AuthorizedUsers { response } => {
            let _ = response.send(logged(store.authorized_users()));
        }
        StoreMessage::Shutdown => {}
    }
}

fn logged<T>(result: StoreResult<T>) -> StoreResult<T> {
    if let Err(e) = &result {
        tracing::error!("Store operation failed: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn handle() -> StoreHandle {
        StoreHandle::in_memory(16).unwrap()
    }

    #[tokio::test]
    async fn test_sentiment_through_actor() {
        let store = handle();
        store.adjust_sentiment(1, 1.0).await.unwrap();
        store.adjust_sentiment(1, -0.3).await.unwrap();

        assert!((store.read_sentiment(1).await - 0.7).abs() < 1e-9);
        assert_eq!(store.read_sentiment(2).await, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_first_adjustments_do_not_race() {
        let store = handle();
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.adjust_sentiment(77, 0.5).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(store.read_sentiment(77).await, 25.0);
    }

    #[tokio::test]
    async fn test_facts_through_actor() {
        let store = handle();
        assert!(store.add_fact(5, "likes tea", 1).await);
        assert!(store.add_fact(5, "hates mondays", 1).await);

        let facts = store.list_facts(5, 5).await;
        assert_eq!(facts, vec!["hates mondays", "likes tea"]);
        assert_eq!(store.list_facts(5, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_config_through_actor() {
        let store = handle();
        store
            .set_config(3, ConfigKey::RestrictedChannels, ConfigValue::Channels(vec![1, 2]))
            .await
            .unwrap();

        assert_eq!(
            store.get_config(3, ConfigKey::RestrictedChannels).await.unwrap(),
            ConfigValue::Channels(vec![1, 2])
        );
        assert_eq!(
            store.get_config(3, ConfigKey::UnverifiedRole).await.unwrap(),
            ConfigValue::Role(None)
        );
        assert!(store.list_guilds_with_autonomy().await.unwrap().is_empty());

        assert!(store
            .add_channel(3, ConfigKey::AutonomyChannels, 9)
            .await
            .unwrap());
        assert_eq!(store.list_guilds_with_autonomy().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_tokens_through_actor() {
        let store = handle();
        store.store_tokens(8, "a", "r", 60).await.unwrap();
        assert_eq!(store.authorized_users().await.unwrap(), vec![8]);
        assert_eq!(store.tokens(8).await.unwrap().unwrap().access_token, "a");
        assert!(store.delete_tokens(8).await.unwrap());
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_degrade() {
        let store = handle();
        store.shutdown().await.unwrap();

        // The actor thread exits; give it a moment to drop the receiver
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(matches!(
            store.adjust_sentiment(1, 1.0).await,
            Err(StoreError::ActorGone)
        ));
        assert!(!store.add_fact(1, "lost", 2).await);
        assert_eq!(store.read_sentiment(1).await, 0.0);
        assert!(store.list_facts(1, 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bot_memory.db");

        let store = StoreHandle::open(&path, 8).unwrap();
        assert!(store.add_fact(1, "persisted", 2).await);
        store.shutdown().await.unwrap();

        let reopened = StoreHandle::open(&path, 8).unwrap();
        assert_eq!(reopened.list_facts(1, 5).await, vec!["persisted"]);
    }
}
