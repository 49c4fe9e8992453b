//! Friend table: directly connected peers, their outbound queues and
//! congestion state.

use std::collections::VecDeque;

use bytes::Bytes;
use hashlink::LinkedHashMap;
use rand::{Rng, seq::IndexedRandom};
use web_time::Instant;
use xvine_overlay_proto::MessageType;
use xvine_primitives::PeerId;

use crate::OverlayError;

/// Relative importance of a queued message. Lower priorities are evicted
/// first when a queue overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    /// PUT, GET and GET_RESULT.
    Data,
    /// Trail management.
    Control,
}

impl Priority {
    pub(crate) fn for_message(kind: MessageType) -> Self {
        match kind {
            MessageType::Put | MessageType::Get | MessageType::GetResult => Self::Data,
            _ => Self::Control,
        }
    }
}

/// One encoded frame waiting for transmission.
#[derive(Debug, Clone)]
pub(crate) struct PendingMessage {
    pub(crate) frame: Bytes,
    pub(crate) expires_at: Instant,
    pub(crate) priority: Priority,
}

/// A directly connected peer.
#[derive(Debug)]
pub struct FriendInfo {
    id: PeerId,
    pending: VecDeque<PendingMessage>,
    trails_count: usize,
    congestion_until: Option<Instant>,
    transmit_in_flight: bool,
}

impl FriendInfo {
    fn new(id: PeerId) -> Self {
        Self {
            id,
            pending: VecDeque::new(),
            trails_count: 0,
            congestion_until: None,
            transmit_in_flight: false,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Number of queued frames.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of stored trails using this friend as first hop.
    pub fn trails_count(&self) -> usize {
        self.trails_count
    }

    pub fn congestion_until(&self) -> Option<Instant> {
        self.congestion_until
    }

    pub fn transmit_in_flight(&self) -> bool {
        self.transmit_in_flight
    }
}

/// Result of queueing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Enqueued {
    /// Size of the head frame if a transmission must be requested.
    pub(crate) request_transmit: Option<usize>,
    /// A lower-priority frame was evicted to make room.
    pub(crate) evicted: bool,
}

/// Frames released by a transmit-ready callback.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub(crate) frames: Vec<Bytes>,
    pub(crate) expired: u64,
    /// Size of the next frame if another transmission must be requested.
    pub(crate) request_transmit: Option<usize>,
}

/// Directly reachable peers, in connection order.
#[derive(Debug)]
pub struct FriendTable {
    friends: LinkedHashMap<PeerId, FriendInfo>,
    max_pending: usize,
    trails_threshold: usize,
}

impl FriendTable {
    pub fn new(max_pending: usize, trails_threshold: usize) -> Self {
        Self {
            friends: LinkedHashMap::new(),
            max_pending,
            trails_threshold,
        }
    }

    /// Add a friend. Returns false if it was already present.
    pub fn add_friend(&mut self, id: PeerId) -> bool {
        if self.friends.contains_key(&id) {
            return false;
        }
        self.friends.insert(id, FriendInfo::new(id));
        true
    }

    /// Remove a friend, dropping its queue.
    pub fn remove_friend(&mut self, id: &PeerId) -> Option<FriendInfo> {
        self.friends.remove(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.friends.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&FriendInfo> {
        self.friends.get(id)
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.friends.keys().copied()
    }

    pub fn clear(&mut self) {
        self.friends.clear();
    }

    /// A friend refuses new trails while it carries the maximum number of
    /// trails or while a rejection backoff is running. Unknown peers count as
    /// congested.
    pub fn is_congested(&self, id: &PeerId, now: Instant) -> bool {
        self.friends.get(id).is_none_or(|friend| {
            friend.trails_count >= self.trails_threshold
                || friend.congestion_until.is_some_and(|until| now < until)
        })
    }

    /// Whether `id` can take one more trail as first hop.
    pub fn has_trail_capacity(&self, id: &PeerId) -> bool {
        self.friends
            .get(id)
            .is_some_and(|friend| friend.trails_count < self.trails_threshold)
    }

    /// Back off from `id` until `until`.
    pub fn mark_congested(&mut self, id: &PeerId, until: Instant) {
        if let Some(friend) = self.friends.get_mut(id) {
            friend.congestion_until = Some(until);
        }
    }

    pub fn increment_trails(&mut self, id: &PeerId) {
        if let Some(friend) = self.friends.get_mut(id) {
            friend.trails_count += 1;
        }
    }

    pub fn decrement_trails(&mut self, id: &PeerId) {
        if let Some(friend) = self.friends.get_mut(id) {
            friend.trails_count = friend.trails_count.saturating_sub(1);
        }
    }

    /// Pick a random friend that is not congested.
    pub fn random_uncongested<R: Rng>(&self, rng: &mut R, now: Instant) -> Option<PeerId> {
        let candidates: Vec<PeerId> = self.ids().filter(|id| !self.is_congested(id, now)).collect();
        candidates.choose(rng).copied()
    }

    /// Queue a frame for `id`.
    ///
    /// A full queue evicts its lowest-priority (oldest first) frame if that
    /// frame ranks strictly below the new one; otherwise the new frame is
    /// refused.
    pub(crate) fn enqueue(
        &mut self,
        id: &PeerId,
        message: PendingMessage,
    ) -> Result<Enqueued, OverlayError> {
        let friend = self
            .friends
            .get_mut(id)
            .ok_or(OverlayError::UnknownFriend { peer: *id })?;

        let mut evicted = false;
        if friend.pending.len() >= self.max_pending {
            let victim = friend
                .pending
                .iter()
                .enumerate()
                .min_by_key(|(index, pending)| (pending.priority, *index))
                .filter(|(_, pending)| pending.priority < message.priority)
                .map(|(index, _)| index);
            match victim {
                Some(index) => {
                    friend.pending.remove(index);
                    evicted = true;
                }
                None => return Err(OverlayError::QueueOverflow { peer: *id }),
            }
        }

        friend.pending.push_back(message);
        let request_transmit = if friend.transmit_in_flight {
            None
        } else {
            friend.transmit_in_flight = true;
            friend.pending.front().map(|head| head.frame.len())
        };
        Ok(Enqueued {
            request_transmit,
            evicted,
        })
    }

    /// Release queued frames into a buffer of `capacity` bytes, in FIFO order,
    /// skipping expired ones. A zero capacity signals a failed transmission.
    pub(crate) fn drain_ready(&mut self, id: &PeerId, capacity: usize, now: Instant) -> Drained {
        let mut drained = Drained::default();
        let Some(friend) = self.friends.get_mut(id) else {
            return drained;
        };
        friend.transmit_in_flight = false;

        let mut remaining = capacity;
        while let Some(head) = friend.pending.front() {
            if head.expires_at <= now {
                friend.pending.pop_front();
                drained.expired += 1;
                continue;
            }
            if head.frame.len() > remaining {
                break;
            }
            remaining -= head.frame.len();
            if let Some(message) = friend.pending.pop_front() {
                drained.frames.push(message.frame);
            }
        }

        if let Some(head) = friend.pending.front() {
            friend.transmit_in_flight = true;
            drained.request_transmit = Some(head.frame.len());
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::{SeedableRng, rngs::StdRng};
    use std::time::Duration;

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn message(len: usize, priority: Priority, now: Instant) -> PendingMessage {
        PendingMessage {
            frame: Bytes::from(vec![len as u8; len]),
            expires_at: now + Duration::from_secs(60),
            priority,
        }
    }

    #[test]
    fn test_priority_by_message_type() {
        assert_eq!(Priority::for_message(MessageType::GetResult), Priority::Data);
        assert_eq!(Priority::for_message(MessageType::Put), Priority::Data);
        assert_eq!(Priority::for_message(MessageType::TrailSetup), Priority::Control);
        assert_eq!(Priority::for_message(MessageType::AddTrail), Priority::Control);
        assert!(Priority::for_message(MessageType::Get) < Priority::for_message(MessageType::TrailTeardown));
    }

    #[test]
    fn test_add_and_remove() {
        let mut table = FriendTable::new(4, 2);
        assert!(table.add_friend(peer(1)));
        assert!(!table.add_friend(peer(1)));
        assert_eq!(table.len(), 1);
        assert!(table.remove_friend(&peer(1)).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_congestion_by_trail_count_and_backoff() {
        let now = Instant::now();
        let mut table = FriendTable::new(4, 2);
        table.add_friend(peer(1));
        assert!(!table.is_congested(&peer(1), now));

        table.increment_trails(&peer(1));
        table.increment_trails(&peer(1));
        assert!(table.is_congested(&peer(1), now));
        assert!(!table.has_trail_capacity(&peer(1)));
        table.decrement_trails(&peer(1));
        assert!(!table.is_congested(&peer(1), now));

        table.mark_congested(&peer(1), now + Duration::from_secs(10));
        assert!(table.is_congested(&peer(1), now));
        assert!(!table.is_congested(&peer(1), now + Duration::from_secs(11)));

        assert!(table.is_congested(&peer(9), now));
    }

    #[test]
    fn test_random_friend_skips_congested() {
        let now = Instant::now();
        let mut rng = StdRng::seed_from_u64(1);
        let mut table = FriendTable::new(4, 1);
        table.add_friend(peer(1));
        table.add_friend(peer(2));
        table.increment_trails(&peer(1));
        for _ in 0..16 {
            assert_eq!(table.random_uncongested(&mut rng, now), Some(peer(2)));
        }
        table.increment_trails(&peer(2));
        assert_eq!(table.random_uncongested(&mut rng, now), None);
    }

    #[test]
    fn test_enqueue_requests_one_transmission() {
        let now = Instant::now();
        let mut table = FriendTable::new(4, 2);
        table.add_friend(peer(1));
        let first = table.enqueue(&peer(1), message(10, Priority::Data, now)).unwrap();
        assert_eq!(first.request_transmit, Some(10));
        let second = table.enqueue(&peer(1), message(20, Priority::Data, now)).unwrap();
        assert_eq!(second.request_transmit, None);
        assert!(table.get(&peer(1)).unwrap().transmit_in_flight());
    }

    #[test]
    fn test_enqueue_unknown_friend() {
        let mut table = FriendTable::new(4, 2);
        assert_matches!(
            table.enqueue(&peer(1), message(1, Priority::Data, Instant::now())),
            Err(OverlayError::UnknownFriend { .. })
        );
    }

    #[test]
    fn test_overflow_evicts_lower_priority() {
        let now = Instant::now();
        let mut table = FriendTable::new(2, 2);
        table.add_friend(peer(1));
        table.enqueue(&peer(1), message(1, Priority::Control, now)).unwrap();
        table.enqueue(&peer(1), message(2, Priority::Data, now)).unwrap();

        let outcome = table.enqueue(&peer(1), message(3, Priority::Control, now)).unwrap();
        assert!(outcome.evicted);

        // queue is all control now; another data frame is refused
        assert_matches!(
            table.enqueue(&peer(1), message(4, Priority::Data, now)),
            Err(OverlayError::QueueOverflow { .. })
        );
        let drained = table.drain_ready(&peer(1), 1024, now);
        let lens: Vec<usize> = drained.frames.iter().map(|f| f.len()).collect();
        assert_eq!(lens, vec![1, 3]);
    }

    #[test]
    fn test_drain_respects_capacity_and_order() {
        let now = Instant::now();
        let mut table = FriendTable::new(8, 2);
        table.add_friend(peer(1));
        for len in [10, 20, 30] {
            table.enqueue(&peer(1), message(len, Priority::Data, now)).unwrap();
        }
        let drained = table.drain_ready(&peer(1), 35, now);
        assert_eq!(drained.frames.len(), 2);
        assert_eq!(drained.request_transmit, Some(30));
        assert!(table.get(&peer(1)).unwrap().transmit_in_flight());

        let drained = table.drain_ready(&peer(1), 100, now);
        assert_eq!(drained.frames.len(), 1);
        assert_eq!(drained.request_transmit, None);
        assert!(!table.get(&peer(1)).unwrap().transmit_in_flight());
    }

    #[test]
    fn test_drain_skips_expired() {
        let now = Instant::now();
        let mut table = FriendTable::new(8, 2);
        table.add_friend(peer(1));
        table.enqueue(&peer(1), message(10, Priority::Data, now)).unwrap();
        table.enqueue(&peer(1), message(11, Priority::Data, now)).unwrap();
        let later = now + Duration::from_secs(61);
        let drained = table.drain_ready(&peer(1), 100, later);
        assert!(drained.frames.is_empty());
        assert_eq!(drained.expired, 2);
    }

    #[test]
    fn test_failed_transmission_rerequests() {
        let now = Instant::now();
        let mut table = FriendTable::new(8, 2);
        table.add_friend(peer(1));
        table.enqueue(&peer(1), message(10, Priority::Data, now)).unwrap();
        let drained = table.drain_ready(&peer(1), 0, now);
        assert!(drained.frames.is_empty());
        assert_eq!(drained.request_transmit, Some(10));
    }
}
