//! Boredom, channel permissions and target choice for unprompted chatter

use crate::storage::GuildConfig;
use std::collections::HashMap;

/// Boredom grows once per autonomy tick and drops whenever someone talks to
/// the bot. Reaching the threshold fires once and resets to zero.
#[derive(Debug, Clone)]
pub struct BoredomMeter {
    level: f64,
    threshold: f64,
}

impl BoredomMeter {
    pub const TICK: f64 = 1.0;
    pub const CONVERSATION_RELIEF: f64 = 2.0;

    pub fn new(threshold: f64) -> Self {
        Self {
            level: 0.0,
            threshold,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Returns true when the bot is bored enough to speak up.
    pub fn tick(&mut self) -> bool {
        self.level += Self::TICK;
        tracing::info!("Autonomy check: Boredom level is now {:.1}", self.level);
        if self.level >= self.threshold {
            self.level = 0.0;
            true
        } else {
            false
        }
    }

    pub fn relieve(&mut self, amount: f64) {
        self.level = (self.level - amount).max(0.0);
    }
}

/// Where the bot may talk in one guild. A restricted channel is off limits
/// even when it is also listed for autonomous chat.
#[derive(Debug, Clone, Copy)]
pub struct ChannelPolicy<'a> {
    config: &'a GuildConfig,
}

impl<'a> ChannelPolicy<'a> {
    pub fn new(config: &'a GuildConfig) -> Self {
        Self { config }
    }

    pub fn can_speak(&self, channel_id: u64) -> bool {
        !self.config.restricted_channels.contains(&channel_id)
    }

    pub fn autonomy_channels(&self) -> Vec<u64> {
        self.config
            .autonomy_channels
            .iter()
            .copied()
            .filter(|id| self.can_speak(*id))
            .collect()
    }

    /// Channels listed both for autonomy and as restricted.
    pub fn conflicts(&self) -> Vec<u64> {
        self.config
            .autonomy_channels
            .iter()
            .copied()
            .filter(|id| !self.can_speak(*id))
            .collect()
    }
}

/// Remembers who was last pinged unprompted in each channel so the same
/// person is not picked twice in a row.
#[derive(Debug, Default)]
pub struct TagTracker {
    last_tagged: HashMap<u64, u64>,
}

impl TagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eligible(&self, channel_id: u64, candidates: &[u64]) -> Vec<u64> {
        let last = self.last_tagged.get(&channel_id);
        candidates
            .iter()
            .copied()
            .filter(|id| Some(id) != last)
            .collect()
    }

    pub fn record(&mut self, channel_id: u64, user_id: u64) {
        self.last_tagged.insert(channel_id, user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boredom_fires_at_threshold_and_resets() {
        let mut meter = BoredomMeter::new(3.0);
        assert!(!meter.tick());
        assert!(!meter.tick());
        assert!(meter.tick());
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn test_conversation_relieves_boredom_without_going_negative() {
        let mut meter = BoredomMeter::new(10.0);
        meter.tick();
        meter.tick();
        meter.tick();
        meter.relieve(BoredomMeter::CONVERSATION_RELIEF);
        assert_eq!(meter.level(), 1.0);
        meter.relieve(BoredomMeter::CONVERSATION_RELIEF);
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn test_restriction_wins_over_autonomy() {
        let config = GuildConfig {
            guild_id: 1,
            autonomy_channels: vec![10, 20, 30],
            restricted_channels: vec![20, 40],
            ..GuildConfig::default()
        };
        let policy = ChannelPolicy::new(&config);

        assert_eq!(policy.autonomy_channels(), vec![10, 30]);
        assert_eq!(policy.conflicts(), vec![20]);
        assert!(policy.can_speak(10));
        assert!(!policy.can_speak(20));
        assert!(!policy.can_speak(40));
        assert!(policy.can_speak(99));
    }

    #[test]
    fn test_tag_tracker_skips_last_target() {
        let mut tracker = TagTracker::new();
        assert_eq!(tracker.eligible(1, &[5, 6]), vec![5, 6]);

        tracker.record(1, 5);
        assert_eq!(tracker.eligible(1, &[5, 6]), vec![6]);
        assert!(tracker.eligible(1, &[5]).is_empty());
        // Other channels are unaffected
        assert_eq!(tracker.eligible(2, &[5]), vec![5]);
    }
}
