//! Trails: ordered, loop-free lists of intermediate peers toward a finger.

use std::collections::HashSet;

use xvine_primitives::{PeerId, TrailId};

/// A path to a finger, excluding both endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trail {
    pub id: TrailId,
    pub elements: Vec<PeerId>,
}

impl Trail {
    pub fn new(id: TrailId, elements: Vec<PeerId>) -> Self {
        Self { id, elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Friend to hand a message to, or `finger` itself for an empty trail.
    pub fn first_hop(&self, finger: PeerId) -> PeerId {
        self.elements.first().copied().unwrap_or(finger)
    }
}

/// Position of `peer` in `trail`.
pub fn search_my_index(trail: &[PeerId], peer: &PeerId) -> Option<usize> {
    trail.iter().position(|p| p == peer)
}

pub fn is_loop_free(trail: &[PeerId]) -> bool {
    let mut seen = HashSet::with_capacity(trail.len());
    trail.iter().all(|peer| seen.insert(*peer))
}

pub fn inverted(trail: &[PeerId]) -> Vec<PeerId> {
    trail.iter().rev().copied().collect()
}

/// Index of the furthest element, other than the first, that is a friend.
///
/// Messages can skip straight to that friend, so everything before it is
/// dropped from the trail.
pub fn compression_point(trail: &[PeerId], is_friend: impl Fn(&PeerId) -> bool) -> Option<usize> {
    trail
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|(_, peer)| is_friend(peer))
        .map(|(index, _)| index)
}

/// Make a stitched path usable as a trail from `source` to `destination`.
///
/// Everything up to the last appearance of `source` is dropped, the path is
/// cut at the first appearance of `destination`, and any loop is removed by
/// jumping from the first visit of a peer to its last.
pub fn normalize(path: &[PeerId], source: &PeerId, destination: &PeerId) -> Vec<PeerId> {
    let start = path.iter().rposition(|p| p == source).map_or(0, |i| i + 1);
    let tail = path.get(start..).unwrap_or_default();
    let end = tail.iter().position(|p| p == destination).unwrap_or(tail.len());
    let path = tail.get(..end).unwrap_or_default();

    let mut out = Vec::with_capacity(path.len());
    let mut i = 0;
    while let Some(peer) = path.get(i) {
        let last = path.iter().rposition(|p| p == peer).unwrap_or(i);
        out.push(*peer);
        i = last + 1;
    }
    out
}
