//! Error types for the overlay core.

use xvine_net_codec::CodecError;
use xvine_overlay_proto::MessageType;
use xvine_primitives::{Direction, PeerId, RingValue, TrailId};

/// Failure while handling an overlay event.
///
/// None of these are fatal: inbound handlers report them to the dispatcher,
/// which counts and logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Frame could not be decoded.
    #[error("malformed message from {peer}: {source}")]
    Malformed {
        peer: PeerId,
        #[source]
        source: CodecError,
    },

    /// Well-formed frame with content this peer refuses.
    #[error("invalid {kind} from {peer}: {reason}")]
    InvalidMessage {
        peer: PeerId,
        kind: MessageType,
        reason: &'static str,
    },

    /// Message from, or addressed to, a peer that is not a friend.
    #[error("peer {peer} is not a friend")]
    UnknownFriend { peer: PeerId },

    /// No routing table entry for a trail.
    #[error("no next hop for trail {trail_id} ({direction})")]
    RoutingMiss {
        trail_id: TrailId,
        direction: Direction,
    },

    /// Message arrived from a neighbour other than the one the trail names.
    #[error("unexpected sender {peer} for {kind}")]
    UnexpectedSender { peer: PeerId, kind: MessageType },

    /// This peer does not appear on the trail it was asked to act on.
    #[error("local peer not on trail {trail_id}")]
    NotOnTrail { trail_id: TrailId },

    /// Forwarding would visit a peer twice.
    #[error("trail {trail_id} loops back through the local peer")]
    TrailLoop { trail_id: TrailId },

    /// Discovery result that fits no finger slot.
    #[error("no finger slot for destination {destination:#018x}")]
    InvalidFingerIndex { destination: RingValue },

    /// First-hop friend already carries its share of trails.
    #[error("friend {peer} is congested")]
    Congested { peer: PeerId },

    /// Friend queue full.
    #[error("queue to {peer} is full")]
    QueueOverflow { peer: PeerId },

    /// Trail already stored for this finger.
    #[error("duplicate trail to finger {finger}")]
    DuplicateTrail { finger: PeerId },

    /// Outbound message does not fit in a frame.
    #[error("cannot encode {kind}: {source}")]
    Encode {
        kind: MessageType,
        #[source]
        source: CodecError,
    },

    /// The service task is gone.
    #[error("overlay service stopped")]
    ServiceStopped,
}
