//! Closest-peer selection over friends and fingers.

use web_time::Instant;
use xvine_primitives::{PeerId, RingValue, TrailId, search_index, select_closest};

use crate::{fingers::FingerTable, friends::FriendTable};

/// Where to send a message so it makes progress toward a ring value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosestPeer {
    /// Friend to hand the message to. Equal to the local peer when the local
    /// peer is itself the closest known peer.
    pub next_hop: PeerId,
    /// Peer believed to own the target ring position.
    pub best_known_destination: PeerId,
    /// Trail toward `best_known_destination`, zero when it is a friend.
    pub trail_id: TrailId,
}

impl ClosestPeer {
    fn local(me: PeerId) -> Self {
        Self {
            next_hop: me,
            best_known_destination: me,
            trail_id: TrailId::ZERO,
        }
    }

    pub fn is_local(&self, me: &PeerId) -> bool {
        self.next_hop == *me
    }
}

/// Closest known peer to `target`.
///
/// Starts from the local peer and folds over uncongested friends, then over
/// fingers that have a usable trail. A candidate only replaces the current
/// one when it is strictly closer.
pub fn find_successor(
    me: PeerId,
    friends: &FriendTable,
    fingers: &FingerTable,
    target: RingValue,
    is_predecessor: bool,
    now: Instant,
) -> ClosestPeer {
    let index = search_index(is_predecessor);

    let from_friends = friends
        .ids()
        .filter(|id| !friends.is_congested(id, now))
        .map(|id| ClosestPeer {
            next_hop: id,
            best_known_destination: id,
            trail_id: TrailId::ZERO,
        });

    let from_fingers = fingers
        .iter()
        .filter(|finger| finger.identity != me)
        .filter_map(|finger| {
            finger.select_trail(friends, now).map(|selected| ClosestPeer {
                next_hop: selected.first_hop,
                best_known_destination: finger.identity,
                trail_id: selected.trail_id,
            })
        });

    from_friends
        .chain(from_fingers)
        .fold(ClosestPeer::local(me), |best, candidate| {
            let closer = select_closest(
                best.best_known_destination,
                candidate.best_known_destination,
                target,
                index,
            );
            if closer == candidate.best_known_destination
                && candidate.best_known_destination != best.best_known_destination
            {
                candidate
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fingers::FingerInfo, trail::Trail};
    use proptest::prelude::*;
    use xvine_primitives::{PREDECESSOR_FINGER_INDEX, ring_distance};

    fn peer_at(value: u64) -> PeerId {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x5a;
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        PeerId::new(bytes)
    }

    #[test]
    fn test_alone_is_local() {
        let me = peer_at(100);
        let closest = find_successor(
            me,
            &FriendTable::new(4, 4),
            &FingerTable::new(),
            500,
            false,
            Instant::now(),
        );
        assert!(closest.is_local(&me));
        assert_eq!(closest.best_known_destination, me);
    }

    #[test]
    fn test_prefers_finger_reached_over_trail() {
        let me = peer_at(100);
        let mut friends = FriendTable::new(4, 4);
        friends.add_friend(peer_at(50));
        let mut fingers = FingerTable::new();
        let trail = Trail::new(TrailId::new([7; 32]), vec![peer_at(50)]);
        fingers.insert(FingerInfo::new(peer_at(300), 7, vec![trail]));

        let closest = find_successor(me, &friends, &fingers, 200, false, Instant::now());
        assert_eq!(closest.next_hop, peer_at(50));
        assert_eq!(closest.best_known_destination, peer_at(300));
        assert_eq!(closest.trail_id, TrailId::new([7; 32]));
    }

    #[test]
    fn test_skips_congested_friend() {
        let me = peer_at(100);
        let mut friends = FriendTable::new(4, 1);
        friends.add_friend(peer_at(150));
        friends.add_friend(peer_at(400));
        friends.increment_trails(&peer_at(150));

        let closest = find_successor(me, &friends, &FingerTable::new(), 120, false, Instant::now());
        assert_eq!(closest.next_hop, peer_at(400));
    }

    #[test]
    fn test_predecessor_search_walks_backwards() {
        let me = peer_at(100);
        let mut friends = FriendTable::new(4, 4);
        friends.add_friend(peer_at(50));
        friends.add_friend(peer_at(90));
        friends.add_friend(peer_at(300));

        let closest = find_successor(me, &friends, &FingerTable::new(), 99, true, Instant::now());
        assert_eq!(closest.next_hop, peer_at(90));
    }

    #[test]
    fn test_self_finger_ignored() {
        let me = peer_at(100);
        let mut fingers = FingerTable::new();
        fingers.insert(FingerInfo::new(me, 3, vec![]));
        let closest = find_successor(
            me,
            &FriendTable::new(4, 4),
            &fingers,
            108,
            false,
            Instant::now(),
        );
        assert!(closest.is_local(&me));
    }

    proptest! {
        #[test]
        fn proptest_result_is_closest_friend_or_self(
            me in any::<u64>(),
            others in proptest::collection::vec(any::<u64>(), 0..16),
            target in any::<u64>(),
            is_predecessor in any::<bool>(),
        ) {
            let index = if is_predecessor { PREDECESSOR_FINGER_INDEX } else { 0 };
            let mut friends = FriendTable::new(4, 4);
            for value in &others {
                friends.add_friend(peer_at(*value));
            }
            let closest = find_successor(
                peer_at(me),
                &friends,
                &FingerTable::new(),
                target,
                is_predecessor,
                Instant::now(),
            );
            let best = ring_distance(target, closest.best_known_destination.ring_value(), index);
            prop_assert!(best <= ring_distance(target, me, index));
            for value in &others {
                prop_assert!(best <= ring_distance(target, *value, index));
            }
        }
    }
}
