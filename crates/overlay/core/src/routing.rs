//! Trail routing table: per-trail neighbours at intermediate hops.

use std::collections::HashMap;

use auto_impl::auto_impl;
use parking_lot::RwLock;
use xvine_primitives::{Direction, PeerId, TrailId};

/// Neighbours of the local peer on one trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Toward the trail source.
    pub prev_hop: PeerId,
    /// Toward the trail destination.
    pub next_hop: PeerId,
}

impl RouteEntry {
    pub fn hop(&self, direction: Direction) -> PeerId {
        match direction {
            Direction::SrcToDest => self.next_hop,
            Direction::DestToSrc => self.prev_hop,
        }
    }
}

/// Table mapping `(trail id, direction)` to the next hop.
#[auto_impl(&, Box, Arc)]
pub trait RoutingTable: Send + Sync {
    fn get_next_hop(&self, trail_id: &TrailId, direction: Direction) -> Option<PeerId>;

    /// Install a trail. Returns false if the trail id is already present.
    fn add(&self, trail_id: TrailId, prev_hop: PeerId, next_hop: PeerId) -> bool;

    fn remove_trail(&self, trail_id: &TrailId) -> bool;

    /// Drop every trail that has `peer` as a neighbour. Returns how many.
    fn remove_trails_by_peer(&self, peer: &PeerId) -> usize;

    /// Whether the table refuses to host more trails.
    fn threshold_reached(&self) -> bool;

    fn update_prev_hop(&self, trail_id: &TrailId, prev_hop: PeerId) -> bool;
}

/// In-memory routing table with a fixed capacity.
#[derive(Debug)]
pub struct MemoryRoutingTable {
    entries: RwLock<HashMap<TrailId, RouteEntry>>,
    threshold: usize,
}

impl MemoryRoutingTable {
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            threshold,
        }
    }

    pub fn get(&self, trail_id: &TrailId) -> Option<RouteEntry> {
        self.entries.read().get(trail_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn trail_ids(&self) -> Vec<TrailId> {
        self.entries.read().keys().copied().collect()
    }
}

impl RoutingTable for MemoryRoutingTable {
    fn get_next_hop(&self, trail_id: &TrailId, direction: Direction) -> Option<PeerId> {
        self.get(trail_id).map(|entry| entry.hop(direction))
    }

    fn add(&self, trail_id: TrailId, prev_hop: PeerId, next_hop: PeerId) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&trail_id) {
            return false;
        }
        entries.insert(trail_id, RouteEntry { prev_hop, next_hop });
        true
    }

    fn remove_trail(&self, trail_id: &TrailId) -> bool {
        self.entries.write().remove(trail_id).is_some()
    }

    fn remove_trails_by_peer(&self, peer: &PeerId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.prev_hop != *peer && entry.next_hop != *peer);
        before - entries.len()
    }

    fn threshold_reached(&self) -> bool {
        self.entries.read().len() >= self.threshold
    }

    fn update_prev_hop(&self, trail_id: &TrailId, prev_hop: PeerId) -> bool {
        match self.entries.write().get_mut(trail_id) {
            Some(entry) => {
                entry.prev_hop = prev_hop;
                true
            }
            None => false,
        }
    }
}
