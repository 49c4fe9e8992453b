//! Ring stabilisation: successor verification, successor notification and
//! predecessor trails.

use tracing::{debug, trace};
use xvine_overlay_proto::{AddTrail, NotifyNewSuccessor, VerifySuccessor, VerifySuccessorResult};
use xvine_primitives::{Direction, PREDECESSOR_FINGER_INDEX, PeerId, TrailId, finger_target};

use super::{
    Overlay,
    setup::{Candidate, TrailOrigin},
};
use crate::{
    OverlayError,
    routing::RoutingTable,
    trail::{Trail, inverted, normalize, search_my_index},
    transport::FriendTransport,
};

impl<T: FriendTransport, R: RoutingTable> Overlay<T, R> {
    /// Send VERIFY_SUCCESSOR along every trail to the current successor.
    pub fn verify_successor(&mut self) {
        let me = self.me;
        let Some(successor) = self
            .fingers
            .successor()
            .filter(|finger| finger.identity != me)
            .cloned()
        else {
            return;
        };

        let mut routes: Vec<(PeerId, TrailId, Vec<PeerId>)> = successor
            .trails
            .iter()
            .map(|trail| (trail.first_hop(successor.identity), trail.id, trail.elements.clone()))
            .collect();
        if routes.is_empty() {
            routes.push((successor.identity, TrailId::ZERO, Vec::new()));
        }

        for (first_hop, trail_id, trail) in routes {
            debug!(successor = %successor.identity, %trail_id, "verifying successor");
            let verify = VerifySuccessor {
                source: me,
                successor: successor.identity,
                trail_id,
                trail,
            };
            self.send(first_hop, verify);
        }
    }

    pub(super) fn handle_verify_successor(
        &mut self,
        from: PeerId,
        msg: VerifySuccessor,
    ) -> Result<(), OverlayError> {
        let me = self.me;
        if msg.successor != me {
            let direction = Direction::SrcToDest;
            let next_hop = self
                .routing
                .get_next_hop(&msg.trail_id, direction)
                .ok_or(OverlayError::RoutingMiss {
                    trail_id: msg.trail_id,
                    direction,
                })?;
            self.send(next_hop, msg);
            return Ok(());
        }

        let predecessor = self.compare_and_update_predecessor(msg.source, &msg.trail);
        let trail = if predecessor == msg.source || predecessor == me {
            Vec::new()
        } else {
            let to_predecessor = self
                .fingers
                .predecessor()
                .and_then(|finger| finger.trails.iter().min_by_key(|trail| trail.len()))
                .map(|trail| trail.elements.clone())
                .unwrap_or_default();
            let mut path = msg.trail;
            path.push(me);
            path.extend(to_predecessor);
            normalize(&path, &msg.source, &predecessor)
        };

        trace!(source = %msg.source, %predecessor, "answering successor verification");
        let result = VerifySuccessorResult {
            querying_peer: msg.source,
            source_successor: me,
            current_predecessor: predecessor,
            trail_id: msg.trail_id,
            direction: Direction::DestToSrc,
            trail,
        };
        self.send(from, result);
        Ok(())
    }

    pub(super) fn handle_verify_successor_result(
        &mut self,
        _from: PeerId,
        msg: VerifySuccessorResult,
    ) -> Result<(), OverlayError> {
        let me = self.me;
        if msg.querying_peer != me {
            let next_hop = self
                .routing
                .get_next_hop(&msg.trail_id, msg.direction)
                .ok_or(OverlayError::RoutingMiss {
                    trail_id: msg.trail_id,
                    direction: msg.direction,
                })?;
            self.send(next_hop, msg);
            return Ok(());
        }

        let Some(successor) = self.fingers.successor().map(|finger| finger.identity) else {
            return Ok(());
        };
        if msg.source_successor != successor {
            debug!(stale = %msg.source_successor, %successor, "ignoring stale verification result");
            return Ok(());
        }
        let candidate = msg.current_predecessor;
        if candidate == me || candidate == successor {
            trace!(%successor, "successor confirmed");
            return Ok(());
        }

        let trail_id = TrailId::random(&mut self.rng);
        let admitted = self.admit(Candidate {
            identity: candidate,
            target: finger_target(me.ring_value(), 0),
            is_predecessor: false,
            trail_id,
            trail: msg.trail,
            origin: TrailOrigin::Stitched,
        })?;
        if let Some(trail) = admitted {
            debug!(new_successor = %candidate, "learned closer successor");
            let notify = NotifyNewSuccessor {
                source: me,
                new_successor: candidate,
                trail_id,
                trail: trail.elements.clone(),
            };
            self.send(trail.first_hop(candidate), notify);
        }
        Ok(())
    }

    pub(super) fn handle_notify_new_successor(
        &mut self,
        from: PeerId,
        msg: NotifyNewSuccessor,
    ) -> Result<(), OverlayError> {
        let me = self.me;
        if msg.new_successor == me {
            self.compare_and_update_predecessor(msg.source, &msg.trail);
            return Ok(());
        }

        let i = search_my_index(&msg.trail, &me).ok_or(OverlayError::NotOnTrail {
            trail_id: msg.trail_id,
        })?;
        let next_hop = msg.trail.get(i + 1).copied().unwrap_or(msg.new_successor);
        self.routing.add(msg.trail_id, from, next_hop);
        self.send(next_hop, msg);
        Ok(())
    }

    pub(super) fn handle_add_trail(&mut self, from: PeerId, msg: AddTrail) -> Result<(), OverlayError> {
        let me = self.me;
        if msg.destination == me {
            return Ok(());
        }

        let i = search_my_index(&msg.trail, &me).ok_or(OverlayError::NotOnTrail {
            trail_id: msg.trail_id,
        })?;
        let next_hop = msg.trail.get(i + 1).copied().unwrap_or(msg.destination);
        self.routing.add(msg.trail_id, from, next_hop);
        self.send(next_hop, msg);
        Ok(())
    }

    /// Offer `candidate`, reached from here over the reverse of
    /// `trail_from_candidate`, as predecessor. Returns the predecessor
    /// afterwards, or the local peer when there is none.
    fn compare_and_update_predecessor(
        &mut self,
        candidate: PeerId,
        trail_from_candidate: &[PeerId],
    ) -> PeerId {
        let me = self.me;
        let trail = inverted(trail_from_candidate);
        let known = self.fingers.predecessor().is_some_and(|finger| {
            finger.identity == candidate
                && finger.has_trail(&self.stored_elements(candidate, &trail))
        });
        if candidate != me && !known {
            let trail_id = TrailId::random(&mut self.rng);
            let admitted = self.admit(Candidate {
                identity: candidate,
                target: finger_target(me.ring_value(), PREDECESSOR_FINGER_INDEX),
                is_predecessor: true,
                trail_id,
                trail,
                origin: TrailOrigin::Stitched,
            });
            match admitted {
                Ok(Some(trail)) => self.announce_trail(candidate, &trail),
                Ok(None) => {}
                Err(err) => self.record_error(&err),
            }
        }
        self.fingers
            .predecessor()
            .map_or(me, |finger| finger.identity)
    }

    /// Install routing entries for a stitched trail along its hops.
    fn announce_trail(&mut self, destination: PeerId, trail: &Trail) {
        let Some(&first) = trail.elements.first() else {
            return;
        };
        let add = AddTrail {
            source: self.me,
            destination,
            trail_id: trail.id,
            trail: trail.elements.clone(),
        };
        self.send(first, add);
    }
}
