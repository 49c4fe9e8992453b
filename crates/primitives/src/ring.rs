//! Ring arithmetic on the 2^64 identifier circle.
//!
//! Peers and keys are mapped to a [`RingValue`]; all arithmetic wraps at 2^64.
//! A finger table has 64 regular slots, slot `i` owning the successor of
//! `self + 2^i`, plus [`PREDECESSOR_FINGER_INDEX`] for the predecessor.
//!
//! Closeness follows the standard Chord interval rule. When searching for the
//! successor of `target`, the best peer is the first one reached walking
//! clockwise from `target`; when searching for a predecessor the walk is
//! counter-clockwise.

use crate::PeerId;

/// Position on the identifier ring.
pub type RingValue = u64;

/// Finger slot holding the predecessor.
pub const PREDECESSOR_FINGER_INDEX: u8 = 64;

/// Number of finger slots (64 fingers plus the predecessor).
pub const MAX_FINGERS: usize = 65;

/// Ring value a discovery round for `finger_index` targets.
///
/// Slot `i < 64` targets `self + 2^i`; the predecessor slot targets `self - 1`.
pub fn finger_target(self_value: RingValue, finger_index: u8) -> RingValue {
    if finger_index >= PREDECESSOR_FINGER_INDEX {
        self_value.wrapping_sub(1)
    } else {
        self_value.wrapping_add(1u64 << finger_index)
    }
}

/// Slot used when comparing peers for a successor or predecessor search.
pub const fn search_index(is_predecessor: bool) -> u8 {
    if is_predecessor { PREDECESSOR_FINGER_INDEX } else { 0 }
}

/// Finger slot a discovery result for `destination` belongs to.
///
/// The predecessor slot is chosen only for a predecessor search whose target is
/// exactly `self - 1`. Otherwise the slot is `floor(log2(destination - self))`.
/// Returns `None` when no slot fits or when the slot equals `active_index`, the
/// slot currently under active discovery by another round.
pub fn finger_map_index(
    self_value: RingValue,
    destination: RingValue,
    is_predecessor: bool,
    active_index: Option<u8>,
) -> Option<u8> {
    let index = if is_predecessor {
        (self_value.wrapping_sub(destination) == 1).then_some(PREDECESSOR_FINGER_INDEX)?
    } else {
        let offset = destination.wrapping_sub(self_value);
        if offset == 0 {
            return None;
        }
        (u64::BITS - 1 - offset.leading_zeros()) as u8
    };

    if index > PREDECESSOR_FINGER_INDEX || Some(index) == active_index {
        return None;
    }
    Some(index)
}

/// Distance from `target` to `candidate` in the search direction of `finger_index`.
///
/// Smaller is closer. For regular slots this is the clockwise distance from the
/// target to the candidate; for the predecessor slot it is counter-clockwise.
pub fn ring_distance(target: RingValue, candidate: RingValue, finger_index: u8) -> u64 {
    if finger_index == PREDECESSOR_FINGER_INDEX {
        target.wrapping_sub(candidate)
    } else {
        candidate.wrapping_sub(target)
    }
}

/// Pick whichever of `peer_a` and `peer_b` is ring-closer to `target`.
///
/// Ties keep `peer_a`.
pub fn select_closest(peer_a: PeerId, peer_b: PeerId, target: RingValue, finger_index: u8) -> PeerId {
    let a = ring_distance(target, peer_a.ring_value(), finger_index);
    let b = ring_distance(target, peer_b.ring_value(), finger_index);
    if b < a { peer_b } else { peer_a }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn peer_at(value: u64) -> PeerId {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        PeerId::new(bytes)
    }

    #[test]
    fn test_finger_target() {
        assert_eq!(finger_target(10, 0), 11);
        assert_eq!(finger_target(10, 3), 18);
        assert_eq!(finger_target(u64::MAX, 0), 0);
        assert_eq!(finger_target(0, PREDECESSOR_FINGER_INDEX), u64::MAX);
    }

    #[test]
    fn test_finger_map_index_regular() {
        assert_eq!(finger_map_index(100, 101, false, None), Some(0));
        assert_eq!(finger_map_index(100, 104, false, None), Some(2));
        assert_eq!(finger_map_index(100, 107, false, None), Some(2));
        assert_eq!(finger_map_index(0, 1 << 63, false, None), Some(63));
        // wraps around the top of the ring
        assert_eq!(finger_map_index(u64::MAX, 0, false, None), Some(0));
        assert_eq!(finger_map_index(100, 100, false, None), None);
    }

    #[test]
    fn test_finger_map_index_predecessor() {
        assert_eq!(
            finger_map_index(100, 99, true, None),
            Some(PREDECESSOR_FINGER_INDEX)
        );
        assert_eq!(finger_map_index(0, u64::MAX, true, None), Some(PREDECESSOR_FINGER_INDEX));
        assert_eq!(finger_map_index(100, 98, true, None), None);
    }

    #[test]
    fn test_finger_map_index_active_slot_rejected() {
        assert_eq!(finger_map_index(100, 104, false, Some(2)), None);
        assert_eq!(finger_map_index(100, 104, false, Some(3)), Some(2));
        assert_eq!(finger_map_index(100, 99, true, Some(PREDECESSOR_FINGER_INDEX)), None);
    }

    #[test]
    fn test_select_closest_successor() {
        let a = peer_at(50);
        let b = peer_at(80);
        assert_eq!(select_closest(a, b, 40, 0), a);
        assert_eq!(select_closest(a, b, 60, 0), b);
        // target past both: wrap around, the smaller value comes first
        assert_eq!(select_closest(a, b, 90, 0), a);
        // exact hit wins
        assert_eq!(select_closest(a, b, 80, 0), b);
    }

    #[test]
    fn test_select_closest_predecessor() {
        let a = peer_at(50);
        let b = peer_at(80);
        assert_eq!(select_closest(a, b, 99, PREDECESSOR_FINGER_INDEX), b);
        assert_eq!(select_closest(a, b, 60, PREDECESSOR_FINGER_INDEX), a);
        assert_eq!(select_closest(a, b, 10, PREDECESSOR_FINGER_INDEX), b);
    }

    #[test]
    fn test_select_closest_tie_keeps_first() {
        let a = peer_at(50);
        let mut bytes = *a.as_bytes();
        bytes[0] ^= 0xff;
        let b = PeerId::new(bytes);
        assert_eq!(select_closest(a, b, 10, 0), a);
        assert_eq!(select_closest(b, a, 10, 0), b);
    }

    #[test]
    fn test_self_loses_successor_search() {
        // Searching the successor slot, self sits at maximal distance.
        let me = peer_at(1_000);
        let other = peer_at(5);
        let target = finger_target(me.ring_value(), 0);
        assert_eq!(select_closest(me, other, target, 0), other);
    }

    proptest! {
        #[test]
        fn test_select_closest_is_min_distance(a in any::<u64>(), b in any::<u64>(), t in any::<u64>(), pred in any::<bool>()) {
            let idx = search_index(pred);
            let (pa, pb) = (peer_at(a), peer_at(b));
            let chosen = select_closest(pa, pb, t, idx);
            let best = ring_distance(t, a, idx).min(ring_distance(t, b, idx));
            prop_assert_eq!(ring_distance(t, chosen.ring_value(), idx), best);
        }

        #[test]
        fn test_finger_index_brackets_offset(me in any::<u64>(), offset in 1u64..) {
            let index = finger_map_index(me, me.wrapping_add(offset), false, None);
            prop_assert!(index.is_some());
            let index = index.unwrap_or_default() as u32;
            prop_assert!(offset >= 1u64 << index);
            prop_assert!(index == 63 || offset < 1u64 << (index + 1));
        }
    }
}
