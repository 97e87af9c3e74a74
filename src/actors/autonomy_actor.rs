//! Autonomy Actor - periodic boredom checks
//!
//! Information Hiding:
//! - Tick scheduling and the shutdown signal stay inside the actor loop
//! - Target selection is delegated to the brain
//! - Consumers only see a stream of `AutonomyEvent`s

use crate::actors::messages::{AutonomyEvent, AutonomyMessage};
use crate::api::Brain;
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::time::{timeout, Duration, Instant};

#[derive(Clone)]
pub struct AutonomyHandle {
    sender: Sender<AutonomyMessage>,
}

impl AutonomyHandle {
    /// Ticks at `autonomy.tick_interval_secs` from the brain's settings.
    pub fn spawn(brain: Arc<Brain>) -> (Self, Receiver<AutonomyEvent>) {
        let interval = Duration::from_secs(brain.settings().autonomy.tick_interval_secs.max(1));
        Self::spawn_with_interval(brain, interval)
    }

    pub fn spawn_with_interval(
        brain: Arc<Brain>,
        interval: Duration,
    ) -> (Self, Receiver<AutonomyEvent>) {
        let buffer_size = brain.settings().system.channel_buffer_size.max(1);
        let (sender, receiver) = channel(buffer_size);
        let (event_tx, event_rx) = channel(buffer_size);
        tokio::spawn(autonomy_actor(receiver, event_tx, brain, interval));
        (Self { sender }, event_rx)
    }

    pub async fn tick_now(&self) {
        let _ = self.sender.send(AutonomyMessage::TickNow).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(AutonomyMessage::Shutdown).await;
    }
}

async fn autonomy_actor(
    mut receiver: Receiver<AutonomyMessage>,
    events: Sender<AutonomyEvent>,
    brain: Arc<Brain>,
    interval: Duration,
) {
    tracing::info!("Autonomy actor started (interval {:?})", interval);
    let mut next_tick = Instant::now() + interval;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match timeout(wait, receiver.recv()).await {
            Ok(Some(AutonomyMessage::TickNow)) => {
                if !check_boredom(&brain, &events).await {
                    break;
                }
            }
            Ok(Some(AutonomyMessage::Shutdown)) => {
                tracing::info!("Autonomy actor received shutdown signal");
                break;
            }
            Ok(None) => {
                tracing::info!("Autonomy channel closed");
                break;
            }
            Err(_) => {
                next_tick = Instant::now() + interval;
                if !check_boredom(&brain, &events).await {
                    break;
                }
            }
        }
    }

    tracing::info!("Autonomy actor stopped");
}

/// Returns false once nobody is listening for events anymore.
async fn check_boredom(brain: &Brain, events: &Sender<AutonomyEvent>) -> bool {
    if !brain.settings().autonomy.enabled {
        tracing::debug!("Autonomy is disabled, skipping boredom check");
        return true;
    }
    if !brain.tick_boredom() {
        return true;
    }

    tracing::info!("Boredom threshold reached. Looking for somewhere to talk.");
    match brain.select_autonomy_target().await {
        Some(event) => {
            tracing::info!(
                "Starting a conversation in guild {} channel {}",
                event.guild_id,
                event.channel_id
            );
            events.send(event).await.is_ok()
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::StoreHandle;
    use crate::config::Settings;
    use crate::core::http_cache::ResponseCache;
    use crate::core::llm::{GenerationRequest, Generator};
    use crate::storage::ConfigKey;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl Generator for Silent {
        async fn generate(&self, _request: GenerationRequest) -> Option<String> {
            None
        }
    }

    fn brain_with(toml: &str) -> Arc<Brain> {
        let settings = Settings::from_toml_str(toml).unwrap();
        let store = StoreHandle::in_memory(16).unwrap();
        let cache = ResponseCache::new(Duration::from_secs(300));
        Arc::new(Brain::new(settings, store, Arc::new(Silent), cache))
    }

    fn brain(threshold: f64) -> Arc<Brain> {
        brain_with(&format!(
            "[autonomy]\nenabled = true\nboredom_threshold = {:.1}",
            threshold
        ))
    }

    #[tokio::test]
    async fn test_emits_event_when_bored() {
        let brain = brain(2.0);
        brain.store().add_channel(1, ConfigKey::AutonomyChannels, 10).await.unwrap();

        let (handle, mut events) =
            AutonomyHandle::spawn_with_interval(brain.clone(), Duration::from_millis(10));

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no event before timeout")
            .unwrap();
        assert_eq!(
            event,
            AutonomyEvent {
                guild_id: 1,
                channel_id: 10
            }
        );

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_restricted_autonomy_channel_is_never_chosen() {
        let brain = brain(1.0);
        let store = brain.store();
        store.add_channel(1, ConfigKey::AutonomyChannels, 10).await.unwrap();
        store.add_channel(1, ConfigKey::RestrictedChannels, 10).await.unwrap();

        let (handle, mut events) =
            AutonomyHandle::spawn_with_interval(brain.clone(), Duration::from_secs(3600));
        handle.tick_now().await;
        handle.tick_now().await;

        assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_ticks_fire_at_threshold() {
        let brain = brain(3.0);
        brain.store().add_channel(7, ConfigKey::AutonomyChannels, 70).await.unwrap();

        let (handle, mut events) =
            AutonomyHandle::spawn_with_interval(brain.clone(), Duration::from_secs(3600));
        handle.tick_now().await;
        handle.tick_now().await;
        assert!(timeout(Duration::from_millis(100), events.recv()).await.is_err());

        handle.tick_now().await;
        let event = timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
        assert_eq!(event.channel_id, 70);
        assert_eq!(brain.boredom(), 0.0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_autonomy_never_emits() {
        let brain = brain_with("[autonomy]\nenabled = false\nboredom_threshold = 1.0");
        brain.store().add_channel(1, ConfigKey::AutonomyChannels, 10).await.unwrap();

        let (handle, mut events) =
            AutonomyHandle::spawn_with_interval(brain.clone(), Duration::from_millis(10));
        for _ in 0..3 {
            handle.tick_now().await;
        }

        assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());
        assert_eq!(brain.boredom(), 0.0);
        handle.shutdown().await;
    }
}
