//! Overlay counters.

use metrics::Counter;

/// Snapshot of the overlay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    /// Frames dropped because they failed to decode or validate.
    pub messages_malformed: u64,
    /// Messages dropped for lack of a next hop.
    pub routing_misses: u64,
    /// Messages dropped because a friend queue was full.
    pub queue_overflows: u64,
    /// Queued messages that expired before transmission.
    pub messages_expired: u64,
    pub trail_rejections_sent: u64,
    pub trail_rejections_received: u64,
    /// Discovered trails already present in the finger table.
    pub duplicate_trails: u64,
    /// Discovered trails not admitted for other reasons.
    pub trails_discarded: u64,
    pub bytes_transmitted: u64,
    pub messages_received: u64,
    pub fingers_admitted: u64,
    pub friends_connected: u64,
}

/// Overlay metrics.
///
/// Every increment goes both to the global `metrics` recorder and to a local
/// [`OverlayStats`] snapshot.
#[derive(Clone, Debug)]
pub(crate) struct OverlayMetrics {
    messages_malformed: Counter,
    routing_misses: Counter,
    queue_overflows: Counter,
    messages_expired: Counter,
    trail_rejections_sent: Counter,
    trail_rejections_received: Counter,
    duplicate_trails: Counter,
    trails_discarded: Counter,
    bytes_transmitted: Counter,
    messages_received: Counter,
    fingers_admitted: Counter,
    friends_connected: Counter,
    stats: OverlayStats,
}

impl Default for OverlayMetrics {
    fn default() -> Self {
        Self {
            messages_malformed: metrics::counter!("overlay.messages_malformed"),
            routing_misses: metrics::counter!("overlay.routing_misses"),
            queue_overflows: metrics::counter!("overlay.queue_overflows"),
            messages_expired: metrics::counter!("overlay.messages_expired"),
            trail_rejections_sent: metrics::counter!("overlay.trail_rejections_sent"),
            trail_rejections_received: metrics::counter!("overlay.trail_rejections_received"),
            duplicate_trails: metrics::counter!("overlay.duplicate_trails"),
            trails_discarded: metrics::counter!("overlay.trails_discarded"),
            bytes_transmitted: metrics::counter!("overlay.bytes_transmitted"),
            messages_received: metrics::counter!("overlay.messages_received"),
            fingers_admitted: metrics::counter!("overlay.fingers_admitted"),
            friends_connected: metrics::counter!("overlay.friends_connected"),
            stats: OverlayStats::default(),
        }
    }
}

impl OverlayMetrics {
    pub(crate) fn stats(&self) -> OverlayStats {
        self.stats
    }

    pub(crate) fn inc_messages_malformed(&mut self) {
        self.messages_malformed.increment(1);
        self.stats.messages_malformed += 1;
    }

    pub(crate) fn inc_routing_misses(&mut self) {
        self.routing_misses.increment(1);
        self.stats.routing_misses += 1;
    }

    pub(crate) fn inc_queue_overflows(&mut self) {
        self.queue_overflows.increment(1);
        self.stats.queue_overflows += 1;
    }

    pub(crate) fn add_messages_expired(&mut self, count: u64) {
        self.messages_expired.increment(count);
        self.stats.messages_expired += count;
    }

    pub(crate) fn inc_trail_rejections_sent(&mut self) {
        self.trail_rejections_sent.increment(1);
        self.stats.trail_rejections_sent += 1;
    }

    pub(crate) fn inc_trail_rejections_received(&mut self) {
        self.trail_rejections_received.increment(1);
        self.stats.trail_rejections_received += 1;
    }

    pub(crate) fn inc_duplicate_trails(&mut self) {
        self.duplicate_trails.increment(1);
        self.stats.duplicate_trails += 1;
    }

    pub(crate) fn inc_trails_discarded(&mut self) {
        self.trails_discarded.increment(1);
        self.stats.trails_discarded += 1;
    }

    pub(crate) fn add_bytes_transmitted(&mut self, bytes: u64) {
        self.bytes_transmitted.increment(bytes);
        self.stats.bytes_transmitted += bytes;
    }

    pub(crate) fn inc_messages_received(&mut self) {
        self.messages_received.increment(1);
        self.stats.messages_received += 1;
    }

    pub(crate) fn inc_fingers_admitted(&mut self) {
        self.fingers_admitted.increment(1);
        self.stats.fingers_admitted += 1;
    }

    pub(crate) fn inc_friends_connected(&mut self) {
        self.friends_connected.increment(1);
        self.stats.friends_connected += 1;
    }
}
