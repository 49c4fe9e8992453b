//! Trail compression and teardown.

use tracing::{debug, trace};
use xvine_overlay_proto::{TrailCompression, TrailTeardown};
use xvine_primitives::{Direction, PeerId, TrailId};

use super::Overlay;
use crate::{
    OverlayError,
    fingers::FingerInfo,
    routing::RoutingTable,
    trail::Trail,
    transport::FriendTransport,
};

impl<T: FriendTransport, R: RoutingTable> Overlay<T, R> {
    /// Ask every hop of `elements` to forget the trail toward `finger`.
    pub(super) fn teardown_trail(&mut self, finger: PeerId, trail_id: TrailId, elements: &[PeerId]) {
        let Some(&first) = elements.first() else {
            return;
        };
        if !self.friends.contains(&first) {
            return;
        }
        debug!(%finger, %trail_id, "tearing down trail");
        let teardown = TrailTeardown {
            source: self.me,
            destination: finger,
            trail_id,
            direction: Direction::SrcToDest,
        };
        self.send(first, teardown);
    }

    /// Give back the first-hop quota of a stored trail and tear it down.
    pub(super) fn release_trail(&mut self, finger: PeerId, trail: &Trail) {
        self.friends.decrement_trails(&trail.first_hop(finger));
        self.teardown_trail(finger, trail.id, &trail.elements);
    }

    pub(super) fn release_finger(&mut self, finger: FingerInfo) {
        for trail in &finger.trails {
            self.release_trail(finger.identity, trail);
        }
    }

    pub(super) fn handle_trail_compression(
        &mut self,
        from: PeerId,
        msg: TrailCompression,
    ) -> Result<(), OverlayError> {
        if msg.new_first_friend == self.me {
            if msg.destination != self.me {
                self.routing.update_prev_hop(&msg.trail_id, msg.source);
            }
            trace!(%from, trail_id = %msg.trail_id, "became first hop of compressed trail");
            return Ok(());
        }

        let direction = Direction::SrcToDest;
        let next_hop = self
            .routing
            .get_next_hop(&msg.trail_id, direction)
            .ok_or(OverlayError::RoutingMiss {
                trail_id: msg.trail_id,
                direction,
            })?;
        self.routing.remove_trail(&msg.trail_id);
        self.send(next_hop, msg);
        Ok(())
    }

    pub(super) fn handle_trail_teardown(
        &mut self,
        from: PeerId,
        msg: TrailTeardown,
    ) -> Result<(), OverlayError> {
        if msg.destination == self.me {
            trace!(%from, trail_id = %msg.trail_id, "trail teardown reached its end");
            return Ok(());
        }

        let next_hop = self
            .routing
            .get_next_hop(&msg.trail_id, msg.direction)
            .ok_or(OverlayError::RoutingMiss {
                trail_id: msg.trail_id,
                direction: msg.direction,
            })?;
        self.routing.remove_trail(&msg.trail_id);
        self.send(next_hop, msg);
        Ok(())
    }
}
