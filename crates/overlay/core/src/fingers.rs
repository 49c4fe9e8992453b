//! Finger table: 64 ring offsets plus the predecessor, each holding a few
//! alternative trails.

use web_time::Instant;
use xvine_primitives::{MAX_FINGERS, PREDECESSOR_FINGER_INDEX, PeerId, TrailId};

use crate::{friends::FriendTable, trail::Trail};

/// The peer occupying one finger slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerInfo {
    pub identity: PeerId,
    pub index: u8,
    pub trails: Vec<Trail>,
}

/// Trail picked for routing toward a finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedTrail {
    pub first_hop: PeerId,
    /// Zero when the finger is a friend reached directly.
    pub trail_id: TrailId,
    pub length: usize,
}

impl FingerInfo {
    pub fn new(identity: PeerId, index: u8, trails: Vec<Trail>) -> Self {
        Self {
            identity,
            index,
            trails,
        }
    }

    /// Shortest trail whose first hop is an uncongested friend.
    ///
    /// A finger that is itself an uncongested friend is reachable even with
    /// no stored trail.
    pub fn select_trail(&self, friends: &FriendTable, now: Instant) -> Option<SelectedTrail> {
        let direct = (self.trails.iter().all(Trail::is_empty)
            && !friends.is_congested(&self.identity, now))
        .then_some(SelectedTrail {
            first_hop: self.identity,
            trail_id: TrailId::ZERO,
            length: 0,
        });

        self.trails
            .iter()
            .filter(|trail| !trail.is_empty())
            .filter(|trail| !friends.is_congested(&trail.first_hop(self.identity), now))
            .min_by_key(|trail| trail.len())
            .map(|trail| SelectedTrail {
                first_hop: trail.first_hop(self.identity),
                trail_id: trail.id,
                length: trail.len(),
            })
            .or(direct)
    }

    pub fn has_trail(&self, elements: &[PeerId]) -> bool {
        self.trails.iter().any(|trail| trail.elements == elements)
    }

    /// Index of the longest stored trail, the first one on ties.
    pub fn longest_trail(&self) -> Option<usize> {
        self.trails
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, trail)| trail.len())
            .map(|(index, _)| index)
    }

    /// Friends used as first hop by the stored trails.
    pub fn first_hops(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.trails.iter().map(|trail| trail.first_hop(self.identity))
    }
}

/// Ongoing discovery round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSearch {
    pub index: u8,
    pub trail_id: TrailId,
}

/// All 65 finger slots.
#[derive(Debug)]
pub struct FingerTable {
    slots: Vec<Option<FingerInfo>>,
    current_search_index: u8,
    active: Option<ActiveSearch>,
}

impl Default for FingerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_FINGERS],
            current_search_index: 0,
            active: None,
        }
    }

    pub fn get(&self, index: u8) -> Option<&FingerInfo> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, index: u8) -> Option<&mut FingerInfo> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    /// Store a finger in its slot, returning the previous occupant.
    pub fn insert(&mut self, finger: FingerInfo) -> Option<FingerInfo> {
        let slot = self.slots.get_mut(finger.index as usize)?;
        slot.replace(finger)
    }

    pub fn remove(&mut self, index: u8) -> Option<FingerInfo> {
        self.slots.get_mut(index as usize).and_then(Option::take)
    }

    pub fn successor(&self) -> Option<&FingerInfo> {
        self.get(0)
    }

    pub fn predecessor(&self) -> Option<&FingerInfo> {
        self.get(PREDECESSOR_FINGER_INDEX)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerInfo> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Remove every finger matching `predicate`.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&FingerInfo) -> bool) -> Vec<FingerInfo> {
        self.slots
            .iter_mut()
            .filter(|slot| slot.as_ref().is_some_and(&mut predicate))
            .filter_map(Option::take)
            .collect()
    }

    /// Slot the next discovery round targets.
    pub fn current_search_index(&self) -> u8 {
        self.current_search_index
    }

    pub(crate) fn set_current_search_index(&mut self, index: u8) {
        self.current_search_index = index.min(PREDECESSOR_FINGER_INDEX);
    }

    pub fn active_search(&self) -> Option<ActiveSearch> {
        self.active
    }

    pub(crate) fn set_active_search(&mut self, active: Option<ActiveSearch>) {
        self.active = active;
    }

    /// Slot blocked for a result of `trail_id`: the slot of a different
    /// discovery round still in flight.
    pub(crate) fn blocked_index(&self, trail_id: &TrailId) -> Option<u8> {
        self.active
            .filter(|active| active.trail_id != *trail_id)
            .map(|active| active.index)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.current_search_index = 0;
        self.active = None;
    }
}
