//! Finger discovery: trail setup, rejection, results and admission.

use tracing::{debug, info};
use web_time::Instant;
use xvine_overlay_proto::{MessageType, TrailCompression, TrailRejection, TrailSetup, TrailSetupResult};
use xvine_primitives::{
    Direction, PREDECESSOR_FINGER_INDEX, PeerId, RingValue, TrailId, finger_map_index,
    finger_target, search_index, select_closest,
};

use super::Overlay;
use crate::{
    OverlayError,
    fingers::{ActiveSearch, FingerInfo},
    routing::RoutingTable,
    trail::{Trail, compression_point, is_loop_free, search_my_index},
    transport::FriendTransport,
};

/// How a trail offered for admission came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TrailOrigin {
    /// Built hop by hop by a discovery round. Every hop already holds a
    /// routing entry for the trail id.
    Discovery,
    /// Assembled locally from other trails. Routing entries are installed by
    /// the caller after admission.
    Stitched,
}

/// A peer and trail offered for a finger slot.
#[derive(Debug)]
pub(super) struct Candidate {
    pub(super) identity: PeerId,
    /// Ring value the trail was searched for; selects the slot.
    pub(super) target: RingValue,
    pub(super) is_predecessor: bool,
    pub(super) trail_id: TrailId,
    pub(super) trail: Vec<PeerId>,
    pub(super) origin: TrailOrigin,
}

/// What admission does with the slot.
enum Placement {
    Empty,
    Replace,
    Append,
    Swap(usize),
    Duplicate,
    Reject,
}

impl<T: FriendTransport, R: RoutingTable> Overlay<T, R> {
    /// Start a discovery round for `index` right away.
    pub fn discover_finger(&mut self, index: u8) {
        self.fingers.set_current_search_index(index);
        self.send_find_finger_trail();
    }

    /// Start a discovery round for the slot at the current search index.
    pub(crate) fn send_find_finger_trail(&mut self) {
        let Some(friend) = self.friends.random_uncongested(&mut self.rng, Instant::now()) else {
            debug!("no uncongested friend to start finger discovery");
            return;
        };
        let index = self.fingers.current_search_index();
        let trail_id = TrailId::random(&mut self.rng);
        self.fingers.set_active_search(Some(ActiveSearch { index, trail_id }));
        debug!(%friend, index, %trail_id, "starting finger discovery");

        let setup = TrailSetup {
            is_predecessor: index == PREDECESSOR_FINGER_INDEX,
            ultimate_destination: finger_target(self.me.ring_value(), index),
            source: self.me,
            best_known_destination: friend,
            intermediate_trail_id: TrailId::ZERO,
            trail_id,
            trail: Vec::new(),
        };
        self.send(friend, setup);
    }

    pub(super) fn handle_trail_setup(
        &mut self,
        from: PeerId,
        msg: TrailSetup,
    ) -> Result<(), OverlayError> {
        if self.routing.threshold_reached() {
            debug!(%from, trail_id = %msg.trail_id, "routing table full, rejecting trail setup");
            self.metrics.inc_trail_rejections_sent();
            let rejection = TrailRejection {
                source: msg.source,
                congested_peer: self.me,
                ultimate_destination: msg.ultimate_destination,
                is_predecessor: msg.is_predecessor,
                trail_id: msg.trail_id,
                congestion_timeout: self.config.congestion_timeout,
                trail: msg.trail,
            };
            self.send(from, rejection);
            return Ok(());
        }
        self.continue_trail_setup(msg)
    }

    /// Forward a trail setup one hop closer to its target, or answer it.
    fn continue_trail_setup(&mut self, mut msg: TrailSetup) -> Result<(), OverlayError> {
        let me = self.me;
        if msg.source == me || msg.trail.contains(&me) {
            return Err(OverlayError::TrailLoop {
                trail_id: msg.trail_id,
            });
        }

        let target = msg.ultimate_destination;
        let local = self.find_successor(target, msg.is_predecessor);
        let index = search_index(msg.is_predecessor);
        let best = msg.best_known_destination;

        if best != me
            && best != local.best_known_destination
            && select_closest(best, local.best_known_destination, target, index) == best
        {
            // keep following the trail the previous hop chose
            let direction = Direction::SrcToDest;
            let next_hop = self
                .routing
                .get_next_hop(&msg.intermediate_trail_id, direction)
                .ok_or(OverlayError::RoutingMiss {
                    trail_id: msg.intermediate_trail_id,
                    direction,
                })?;
            msg.trail.push(me);
            self.send(next_hop, msg);
            return Ok(());
        }

        if local.is_local(&me) {
            let to = msg.trail.last().copied().unwrap_or(msg.source);
            debug!(trail_id = %msg.trail_id, source = %msg.source, "trail setup reached its finger");
            let result = TrailSetupResult {
                finger_identity: me,
                querying_peer: msg.source,
                is_predecessor: msg.is_predecessor,
                ultimate_destination: target,
                trail_id: msg.trail_id,
                trail: msg.trail,
            };
            self.send(to, result);
            return Ok(());
        }

        msg.trail.push(me);
        if local.next_hop == msg.source {
            // the querying peer is the closest peer known here
            let to = msg
                .trail
                .len()
                .checked_sub(2)
                .and_then(|i| msg.trail.get(i).copied())
                .unwrap_or(msg.source);
            let result = TrailSetupResult {
                finger_identity: msg.source,
                querying_peer: msg.source,
                is_predecessor: msg.is_predecessor,
                ultimate_destination: target,
                trail_id: msg.trail_id,
                trail: msg.trail,
            };
            self.send(to, result);
            return Ok(());
        }

        msg.best_known_destination = local.best_known_destination;
        msg.intermediate_trail_id = local.trail_id;
        self.send(local.next_hop, msg);
        Ok(())
    }

    pub(super) fn handle_trail_setup_result(
        &mut self,
        from: PeerId,
        msg: TrailSetupResult,
    ) -> Result<(), OverlayError> {
        let me = self.me;
        let unexpected = OverlayError::UnexpectedSender {
            peer: from,
            kind: MessageType::TrailSetupResult,
        };

        if msg.querying_peer == me {
            let expected = msg.trail.first().copied().unwrap_or(msg.finger_identity);
            if from != expected {
                return Err(unexpected);
            }
            let candidate = Candidate {
                identity: msg.finger_identity,
                target: msg.ultimate_destination,
                is_predecessor: msg.is_predecessor,
                trail_id: msg.trail_id,
                trail: msg.trail,
                origin: TrailOrigin::Discovery,
            };
            return self.admit(candidate).map(|_| ());
        }

        let i = search_my_index(&msg.trail, &me).ok_or(OverlayError::NotOnTrail {
            trail_id: msg.trail_id,
        })?;
        let expected = msg.trail.get(i + 1).copied().unwrap_or(msg.finger_identity);
        if from != expected {
            return Err(unexpected);
        }
        let prev_hop = match i.checked_sub(1) {
            Some(prev) => msg.trail.get(prev).copied().unwrap_or(msg.querying_peer),
            None => msg.querying_peer,
        };
        if msg.querying_peer != msg.finger_identity {
            self.routing.add(msg.trail_id, prev_hop, from);
        }
        self.send(prev_hop, msg);
        Ok(())
    }

    pub(super) fn handle_trail_rejection(
        &mut self,
        from: PeerId,
        msg: TrailRejection,
    ) -> Result<(), OverlayError> {
        let me = self.me;
        self.metrics.inc_trail_rejections_received();
        let congested = if self.friends.contains(&msg.congested_peer) {
            msg.congested_peer
        } else {
            from
        };
        self.friends
            .mark_congested(&congested, Instant::now() + msg.congestion_timeout);
        debug!(peer = %congested, timeout = ?msg.congestion_timeout, "friend rejected trail setup");

        if msg.source == me {
            if self
                .fingers
                .active_search()
                .is_some_and(|active| active.trail_id == msg.trail_id)
            {
                self.fingers.set_active_search(None);
            }
            return Ok(());
        }

        if msg.trail.last() != Some(&me) {
            return Err(OverlayError::NotOnTrail {
                trail_id: msg.trail_id,
            });
        }
        let mut trail = msg.trail;
        trail.pop();

        if self.routing.threshold_reached() {
            let to = trail.last().copied().unwrap_or(msg.source);
            self.metrics.inc_trail_rejections_sent();
            let rejection = TrailRejection {
                congested_peer: me,
                congestion_timeout: self.config.congestion_timeout,
                trail,
                ..msg
            };
            self.send(to, rejection);
            return Ok(());
        }

        self.continue_trail_setup(TrailSetup {
            is_predecessor: msg.is_predecessor,
            ultimate_destination: msg.ultimate_destination,
            source: msg.source,
            best_known_destination: me,
            intermediate_trail_id: TrailId::ZERO,
            trail_id: msg.trail_id,
            trail,
        })
    }

    /// Offer a peer and trail to the finger table.
    ///
    /// Returns the stored (possibly compressed) trail when admitted. A
    /// discovery trail that is not admitted is torn down.
    pub(super) fn admit(&mut self, candidate: Candidate) -> Result<Option<Trail>, OverlayError> {
        let me = self.me;
        let Candidate {
            identity,
            target,
            is_predecessor,
            trail_id,
            trail,
            origin,
        } = candidate;
        let discovery = origin == TrailOrigin::Discovery;

        if discovery
            && self
                .fingers
                .active_search()
                .is_some_and(|active| active.trail_id == trail_id)
        {
            self.fingers.set_active_search(None);
        }
        let blocked = if discovery {
            self.fingers.blocked_index(&trail_id)
        } else {
            None
        };
        let Some(index) = finger_map_index(me.ring_value(), target, is_predecessor, blocked) else {
            self.discard(identity, trail_id, &trail, origin);
            return Err(OverlayError::InvalidFingerIndex { destination: target });
        };

        if identity == me {
            if self.fingers.get(index).is_none() {
                self.fingers.insert(FingerInfo::new(me, index, Vec::new()));
            }
            if discovery {
                self.advance_search_index(index, me, false);
            }
            return Ok(None);
        }

        if !is_loop_free(&trail) || trail.contains(&me) || trail.contains(&identity) {
            debug!(finger = %identity, "discarding looping trail");
            self.discard(identity, trail_id, &trail, origin);
            return Ok(None);
        }

        let new_trail = Trail::new(trail_id, self.stored_elements(identity, &trail));
        let first_hop = new_trail.first_hop(identity);
        if !self.friends.has_trail_capacity(&first_hop) {
            self.discard(identity, trail_id, &trail, origin);
            return Err(OverlayError::Congested { peer: first_hop });
        }

        let previous = self.fingers.get(index).map(|finger| finger.identity);
        let placement = match self.fingers.get(index) {
            None => Placement::Empty,
            Some(existing) if existing.identity != identity => {
                let slot_target = finger_target(me.ring_value(), index);
                if select_closest(existing.identity, identity, slot_target, index) == identity {
                    Placement::Replace
                } else {
                    Placement::Reject
                }
            }
            Some(existing) if existing.has_trail(&new_trail.elements) => Placement::Duplicate,
            Some(existing) if existing.trails.len() < self.config.max_trails_per_finger => {
                Placement::Append
            }
            Some(existing) => existing
                .longest_trail()
                .filter(|&i| existing.trails.get(i).is_some_and(|old| new_trail.len() < old.len()))
                .map_or(Placement::Reject, Placement::Swap),
        };

        match placement {
            Placement::Reject => {
                debug!(finger = %identity, index, "trail no better than stored ones");
                self.discard(identity, trail_id, &trail, origin);
                return Ok(None);
            }
            Placement::Duplicate => {
                if discovery {
                    self.teardown_trail(identity, trail_id, &trail);
                }
                return Err(OverlayError::DuplicateTrail { finger: identity });
            }
            Placement::Empty => {
                self.fingers
                    .insert(FingerInfo::new(identity, index, vec![new_trail.clone()]));
            }
            Placement::Replace => {
                if let Some(old) = self
                    .fingers
                    .insert(FingerInfo::new(identity, index, vec![new_trail.clone()]))
                {
                    debug!(old = %old.identity, new = %identity, index, "replacing finger");
                    self.release_finger(old);
                }
            }
            Placement::Append => {
                if let Some(finger) = self.fingers.get_mut(index) {
                    finger.trails.push(new_trail.clone());
                }
            }
            Placement::Swap(i) => {
                let replaced = self
                    .fingers
                    .get_mut(index)
                    .and_then(|finger| finger.trails.get_mut(i))
                    .map(|slot| std::mem::replace(slot, new_trail.clone()));
                if let Some(old) = replaced {
                    debug!(finger = %identity, old_len = old.len(), new_len = new_trail.len(), "replacing longest trail");
                    self.release_trail(identity, &old);
                }
            }
        }

        if discovery && new_trail.elements.first() != trail.first() {
            if let Some(&old_first) = trail.first() {
                self.send(
                    old_first,
                    TrailCompression {
                        source: me,
                        destination: identity,
                        new_first_friend: first_hop,
                        trail_id,
                    },
                );
            }
        }

        self.friends.increment_trails(&first_hop);
        self.metrics.inc_fingers_admitted();
        info!(finger = %identity, index, trail_len = new_trail.len(), "finger admitted");

        if discovery {
            let successor_changed = index == 0 && previous != Some(identity);
            self.advance_search_index(index, identity, successor_changed);
        }
        Ok(Some(new_trail))
    }

    /// Elements of `trail` as the finger table would store them: empty for a
    /// friend, otherwise cut at the furthest friend on the trail.
    pub(super) fn stored_elements(&self, identity: PeerId, trail: &[PeerId]) -> Vec<PeerId> {
        if self.friends.contains(&identity) {
            return Vec::new();
        }
        compression_point(trail, |peer| self.friends.contains(peer))
            .and_then(|point| trail.get(point..))
            .unwrap_or(trail)
            .to_vec()
    }

    /// Drop a trail that was not admitted.
    fn discard(&mut self, identity: PeerId, trail_id: TrailId, trail: &[PeerId], origin: TrailOrigin) {
        self.metrics.inc_trails_discarded();
        if origin == TrailOrigin::Discovery {
            self.teardown_trail(identity, trail_id, trail);
        }
    }

    /// Move discovery on after a result for `index`.
    fn advance_search_index(&mut self, index: u8, identity: PeerId, successor_changed: bool) {
        if index != self.fingers.current_search_index() {
            return;
        }
        if index == 0 {
            self.fingers.set_current_search_index(PREDECESSOR_FINGER_INDEX);
            if successor_changed && identity != self.me {
                self.verify_successor();
            }
        } else if self
            .fingers
            .successor()
            .is_some_and(|successor| successor.identity == identity)
        {
            self.fingers.set_current_search_index(0);
        } else {
            self.fingers.set_current_search_index(index - 1);
        }
    }
}
