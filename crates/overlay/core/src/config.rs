//! Overlay configuration.
//!
//! Durations are written to TOML as whole seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between finger discovery rounds.
pub const DEFAULT_FIND_FINGER_TRAIL_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between periodic successor verifications.
pub const DEFAULT_VERIFY_SUCCESSOR_INTERVAL: Duration = Duration::from_secs(60);

/// Default lifetime of a queued message.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(120);

/// Default backoff a congested peer asks for.
pub const DEFAULT_CONGESTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on messages queued per friend.
pub const DEFAULT_MAX_PENDING_PER_FRIEND: usize = 64;

/// Default cap on trails using one friend as first hop.
pub const DEFAULT_TRAILS_THROUGH_FRIEND_THRESHOLD: usize = 64;

/// Default number of alternative trails kept per finger.
pub const DEFAULT_MAX_TRAILS_PER_FINGER: usize = 2;

/// Default capacity of the in-memory routing table.
pub const DEFAULT_ROUTING_TABLE_THRESHOLD: usize = 64;

/// Configuration for the overlay core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Base interval between finger discovery rounds. Each round adds a random
    /// delay of up to the same length.
    #[serde(default = "default_find_finger_trail_interval", with = "duration_secs")]
    pub find_finger_trail_interval: Duration,

    /// Interval between periodic successor verifications.
    #[serde(default = "default_verify_successor_interval", with = "duration_secs")]
    pub verify_successor_interval: Duration,

    /// How long an outbound message may wait in a friend queue.
    #[serde(default = "default_get_timeout", with = "duration_secs")]
    pub get_timeout: Duration,

    /// Backoff carried in trail rejections sent by this peer.
    #[serde(default = "default_congestion_timeout", with = "duration_secs")]
    pub congestion_timeout: Duration,

    /// Messages queued per friend before the queue overflows.
    #[serde(default = "default_max_pending_per_friend")]
    pub max_pending_per_friend: usize,

    /// Trails allowed through a single friend as first hop.
    #[serde(default = "default_trails_through_friend_threshold")]
    pub trails_through_friend_threshold: usize,

    /// Alternative trails stored per finger.
    #[serde(default = "default_max_trails_per_finger")]
    pub max_trails_per_finger: usize,

    /// Entries the in-memory routing table holds before it reports congestion.
    #[serde(default = "default_routing_table_threshold")]
    pub routing_table_threshold: usize,

    /// Seed for friend selection, trail ids and jitter. Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            find_finger_trail_interval: DEFAULT_FIND_FINGER_TRAIL_INTERVAL,
            verify_successor_interval: DEFAULT_VERIFY_SUCCESSOR_INTERVAL,
            get_timeout: DEFAULT_GET_TIMEOUT,
            congestion_timeout: DEFAULT_CONGESTION_TIMEOUT,
            max_pending_per_friend: DEFAULT_MAX_PENDING_PER_FRIEND,
            trails_through_friend_threshold: DEFAULT_TRAILS_THROUGH_FRIEND_THRESHOLD,
            max_trails_per_finger: DEFAULT_MAX_TRAILS_PER_FINGER,
            routing_table_threshold: DEFAULT_ROUTING_TABLE_THRESHOLD,
            rng_seed: None,
        }
    }
}

impl OverlayConfig {
    /// Set the finger discovery interval.
    pub fn with_find_finger_trail_interval(mut self, interval: Duration) -> Self {
        self.find_finger_trail_interval = interval;
        self
    }

    /// Set the successor verification interval.
    pub fn with_verify_successor_interval(mut self, interval: Duration) -> Self {
        self.verify_successor_interval = interval;
        self
    }

    /// Set the queued message lifetime.
    pub fn with_get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout = timeout;
        self
    }

    /// Set the backoff sent in trail rejections.
    pub fn with_congestion_timeout(mut self, timeout: Duration) -> Self {
        self.congestion_timeout = timeout;
        self
    }

    /// Set the per-friend queue cap.
    pub fn with_max_pending_per_friend(mut self, count: usize) -> Self {
        self.max_pending_per_friend = count;
        self
    }

    /// Set the per-friend trail cap.
    pub fn with_trails_through_friend_threshold(mut self, count: usize) -> Self {
        self.trails_through_friend_threshold = count;
        self
    }

    /// Set the number of trails kept per finger.
    pub fn with_max_trails_per_finger(mut self, count: usize) -> Self {
        self.max_trails_per_finger = count;
        self
    }

    /// Set the in-memory routing table capacity.
    pub fn with_routing_table_threshold(mut self, count: usize) -> Self {
        self.routing_table_threshold = count;
        self
    }

    /// Use a fixed RNG seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

fn default_find_finger_trail_interval() -> Duration {
    DEFAULT_FIND_FINGER_TRAIL_INTERVAL
}

fn default_verify_successor_interval() -> Duration {
    DEFAULT_VERIFY_SUCCESSOR_INTERVAL
}

fn default_get_timeout() -> Duration {
    DEFAULT_GET_TIMEOUT
}

fn default_congestion_timeout() -> Duration {
    DEFAULT_CONGESTION_TIMEOUT
}

fn default_max_pending_per_friend() -> usize {
    DEFAULT_MAX_PENDING_PER_FRIEND
}

fn default_trails_through_friend_threshold() -> usize {
    DEFAULT_TRAILS_THROUGH_FRIEND_THRESHOLD
}

fn default_max_trails_per_finger() -> usize {
    DEFAULT_MAX_TRAILS_PER_FINGER
}

fn default_routing_table_threshold() -> usize {
    DEFAULT_ROUTING_TABLE_THRESHOLD
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OverlayConfig::default();
        assert_eq!(config.max_pending_per_friend, 64);
        assert_eq!(config.max_trails_per_finger, 2);
        assert_eq!(config.congestion_timeout, Duration::from_secs(120));
        assert!(config.rng_seed.is_none());
    }

    #[test]
    fn test_toml_roundtrip_uses_seconds() {
        let config = OverlayConfig::default()
            .with_find_finger_trail_interval(Duration::from_secs(5))
            .with_rng_seed(7);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("find_finger_trail_interval = 5"));
        let parsed: OverlayConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: OverlayConfig = toml::from_str("max_trails_per_finger = 3\n").unwrap();
        assert_eq!(parsed.max_trails_per_finger, 3);
        assert_eq!(parsed.get_timeout, DEFAULT_GET_TIMEOUT);
    }
}
