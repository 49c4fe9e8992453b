//! Successor verification and notification.

use bytes::{BufMut, BytesMut};
use xvine_net_codec::{CodecError, WireReader};
use xvine_primitives::{Direction, PEER_ID_LEN, PeerId, TRAIL_ID_LEN, TrailId};

use crate::{
    Body, peers_len, put_peer, put_peers, put_trail_id, read_direction, read_peer, read_trail,
    read_trail_id,
};

/// Ask `successor` who its predecessor is, along a stored trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySuccessor {
    pub source: PeerId,
    pub successor: PeerId,
    pub trail_id: TrailId,
    pub trail: Vec<PeerId>,
}

impl Body for VerifySuccessor {
    const FIXED_LEN: usize = 2 * PEER_ID_LEN + TRAIL_ID_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.source);
        put_peer(dst, &self.successor);
        put_trail_id(dst, &self.trail_id);
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: read_peer(r)?,
            successor: read_peer(r)?,
            trail_id: read_trail_id(r)?,
            trail: read_trail(r)?,
        })
    }
}

/// The successor's answer: its current predecessor and a trail to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySuccessorResult {
    pub querying_peer: PeerId,
    pub source_successor: PeerId,
    pub current_predecessor: PeerId,
    pub trail_id: TrailId,
    pub direction: Direction,
    /// Intermediate peers from `querying_peer` to `current_predecessor`; empty
    /// when the querier is the predecessor.
    pub trail: Vec<PeerId>,
}

impl Body for VerifySuccessorResult {
    const FIXED_LEN: usize = 3 * PEER_ID_LEN + TRAIL_ID_LEN + 4;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.querying_peer);
        put_peer(dst, &self.source_successor);
        put_peer(dst, &self.current_predecessor);
        put_trail_id(dst, &self.trail_id);
        dst.put_u32(self.direction as u32);
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            querying_peer: read_peer(r)?,
            source_successor: read_peer(r)?,
            current_predecessor: read_peer(r)?,
            trail_id: read_trail_id(r)?,
            direction: read_direction(r)?,
            trail: read_trail(r)?,
        })
    }
}

/// Tell `new_successor` that `source` now treats it as successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyNewSuccessor {
    pub source: PeerId,
    pub new_successor: PeerId,
    pub trail_id: TrailId,
    pub trail: Vec<PeerId>,
}

impl Body for NotifyNewSuccessor {
    const FIXED_LEN: usize = 2 * PEER_ID_LEN + TRAIL_ID_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.source);
        put_peer(dst, &self.new_successor);
        put_trail_id(dst, &self.trail_id);
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: read_peer(r)?,
            new_successor: read_peer(r)?,
            trail_id: read_trail_id(r)?,
            trail: read_trail(r)?,
        })
    }
}
