//! Ring maintenance timers.
//!
//! Two deadlines drive maintenance: the next finger discovery round and the
//! next periodic successor verification. The owner polls
//! [`Maintenance::next_deadline`] and calls back into the overlay once it
//! passes.

use std::time::Duration;

use rand::Rng;
use web_time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Maintenance {
    find_finger_at: Option<Instant>,
    verify_at: Option<Instant>,
}

impl Maintenance {
    /// Schedule discovery right away and the first verification one interval
    /// later.
    pub(crate) fn start(&mut self, now: Instant, verify_interval: Duration) {
        self.find_finger_at = Some(now);
        self.verify_at = Some(now + verify_interval);
    }

    pub(crate) fn cancel(&mut self) {
        self.find_finger_at = None;
        self.verify_at = None;
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        match (self.find_finger_at, self.verify_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Clears and reports the discovery deadline if it has passed.
    pub(crate) fn take_due_find_finger(&mut self, now: Instant) -> bool {
        take_due(&mut self.find_finger_at, now)
    }

    pub(crate) fn take_due_verify(&mut self, now: Instant) -> bool {
        take_due(&mut self.verify_at, now)
    }

    pub(crate) fn schedule_find_finger(&mut self, at: Instant) {
        self.find_finger_at = Some(at);
    }

    pub(crate) fn schedule_verify(&mut self, at: Instant) {
        self.verify_at = Some(at);
    }
}

fn take_due(deadline: &mut Option<Instant>, now: Instant) -> bool {
    if deadline.is_some_and(|at| at <= now) {
        *deadline = None;
        return true;
    }
    false
}

/// `interval` plus a random extra of up to `interval`.
pub(crate) fn jittered<R: Rng>(rng: &mut R, interval: Duration) -> Duration {
    let max = u64::try_from(interval.as_micros()).unwrap_or(u64::MAX);
    interval.saturating_add(Duration::from_micros(rng.random_range(0..=max)))
}
