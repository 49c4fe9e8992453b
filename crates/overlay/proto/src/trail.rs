//! Trail setup, rejection, compression, teardown and ADD_TRAIL.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use xvine_net_codec::{CodecError, WireReader, utils::duration_to_micros};
use xvine_primitives::{Direction, PEER_ID_LEN, PeerId, RingValue, TRAIL_ID_LEN, TrailId};

use crate::{
    Body, peers_len, put_flag, put_peer, put_peers, put_trail_id, read_direction, read_peer,
    read_trail, read_trail_id,
};

/// Discover the peer responsible for `ultimate_destination`.
///
/// `trail` accumulates every peer the request passed, excluding `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailSetup {
    pub is_predecessor: bool,
    pub ultimate_destination: RingValue,
    pub source: PeerId,
    pub best_known_destination: PeerId,
    pub intermediate_trail_id: TrailId,
    pub trail_id: TrailId,
    pub trail: Vec<PeerId>,
}

impl Body for TrailSetup {
    const FIXED_LEN: usize = 4 + 8 + 2 * PEER_ID_LEN + 2 * TRAIL_ID_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_flag(dst, self.is_predecessor);
        dst.put_u64(self.ultimate_destination);
        put_peer(dst, &self.source);
        put_peer(dst, &self.best_known_destination);
        put_trail_id(dst, &self.intermediate_trail_id);
        put_trail_id(dst, &self.trail_id);
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            is_predecessor: r.read_flag("is_predecessor")?,
            ultimate_destination: r.read_u64()?,
            source: read_peer(r)?,
            best_known_destination: read_peer(r)?,
            intermediate_trail_id: read_trail_id(r)?,
            trail_id: read_trail_id(r)?,
            trail: read_trail(r)?,
        })
    }
}

/// Reply from the discovered finger, walking `trail` back to `querying_peer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailSetupResult {
    pub finger_identity: PeerId,
    pub querying_peer: PeerId,
    pub is_predecessor: bool,
    pub ultimate_destination: RingValue,
    pub trail_id: TrailId,
    pub trail: Vec<PeerId>,
}

impl Body for TrailSetupResult {
    const FIXED_LEN: usize = 2 * PEER_ID_LEN + 4 + 8 + TRAIL_ID_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.finger_identity);
        put_peer(dst, &self.querying_peer);
        put_flag(dst, self.is_predecessor);
        dst.put_u64(self.ultimate_destination);
        put_trail_id(dst, &self.trail_id);
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            finger_identity: read_peer(r)?,
            querying_peer: read_peer(r)?,
            is_predecessor: r.read_flag("is_predecessor")?,
            ultimate_destination: r.read_u64()?,
            trail_id: read_trail_id(r)?,
            trail: read_trail(r)?,
        })
    }
}

/// A congested peer refusing to extend a trail setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailRejection {
    pub source: PeerId,
    pub congested_peer: PeerId,
    pub ultimate_destination: RingValue,
    pub is_predecessor: bool,
    pub trail_id: TrailId,
    /// How long the congested peer should be avoided.
    pub congestion_timeout: Duration,
    pub trail: Vec<PeerId>,
}

impl Body for TrailRejection {
    const FIXED_LEN: usize = 2 * PEER_ID_LEN + 8 + 4 + TRAIL_ID_LEN + 8;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.source);
        put_peer(dst, &self.congested_peer);
        dst.put_u64(self.ultimate_destination);
        put_flag(dst, self.is_predecessor);
        put_trail_id(dst, &self.trail_id);
        dst.put_u64(duration_to_micros(self.congestion_timeout));
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: read_peer(r)?,
            congested_peer: read_peer(r)?,
            ultimate_destination: r.read_u64()?,
            is_predecessor: r.read_flag("is_predecessor")?,
            trail_id: read_trail_id(r)?,
            congestion_timeout: Duration::from_micros(r.read_u64()?),
            trail: read_trail(r)?,
        })
    }
}

/// Shortcut an established trail at `new_first_friend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailCompression {
    pub source: PeerId,
    pub destination: PeerId,
    pub new_first_friend: PeerId,
    pub trail_id: TrailId,
}

impl Body for TrailCompression {
    const FIXED_LEN: usize = 3 * PEER_ID_LEN + TRAIL_ID_LEN;

    fn trailer_len(&self) -> usize {
        0
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.source);
        put_peer(dst, &self.destination);
        put_peer(dst, &self.new_first_friend);
        put_trail_id(dst, &self.trail_id);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: read_peer(r)?,
            destination: read_peer(r)?,
            new_first_friend: read_peer(r)?,
            trail_id: read_trail_id(r)?,
        })
    }
}

/// Release the routing state of a trail, hop by hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailTeardown {
    pub source: PeerId,
    pub destination: PeerId,
    pub trail_id: TrailId,
    pub direction: Direction,
}

impl Body for TrailTeardown {
    const FIXED_LEN: usize = 2 * PEER_ID_LEN + TRAIL_ID_LEN + 4;

    fn trailer_len(&self) -> usize {
        0
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.source);
        put_peer(dst, &self.destination);
        put_trail_id(dst, &self.trail_id);
        dst.put_u32(self.direction as u32);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: read_peer(r)?,
            destination: read_peer(r)?,
            trail_id: read_trail_id(r)?,
            direction: read_direction(r)?,
        })
    }
}

/// Install routing state for a trail that `source` already stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTrail {
    pub source: PeerId,
    pub destination: PeerId,
    pub trail_id: TrailId,
    /// Intermediate peers from `source` to `destination`.
    pub trail: Vec<PeerId>,
}

impl Body for AddTrail {
    const FIXED_LEN: usize = 2 * PEER_ID_LEN + TRAIL_ID_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.trail)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_peer(dst, &self.source);
        put_peer(dst, &self.destination);
        put_trail_id(dst, &self.trail_id);
        put_peers(dst, &self.trail);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            source: read_peer(r)?,
            destination: read_peer(r)?,
            trail_id: read_trail_id(r)?,
            trail: read_trail(r)?,
        })
    }
}
