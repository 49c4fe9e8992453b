//! Wire messages of the X-Vine overlay.
//!
//! Twelve message types travel between friends: data messages (PUT, GET,
//! GET_RESULT) and the trail-management messages that build and maintain the
//! ring. Each is a typed struct here; [`OverlayMessage`] ties them together and
//! implements [`WireMessage`] so frames can be produced with
//! [`xvine_net_codec::encode_frame`] and parsed with
//! [`xvine_net_codec::decode_frame`].
//!
//! All integers are big-endian. Every variable-length trailer is checked
//! against the bytes actually present before it is read.

use bytes::{BufMut, BytesMut};
use xvine_net_codec::{CodecError, WireMessage, WireReader};
use xvine_primitives::{Direction, Key, PEER_ID_LEN, PeerId, TrailId};

mod data;
mod ring;
mod trail;
mod types;

pub use data::{Get, GetResult, Put};
pub use ring::{NotifyNewSuccessor, VerifySuccessor, VerifySuccessorResult};
pub use trail::{AddTrail, TrailCompression, TrailRejection, TrailSetup, TrailSetupResult, TrailTeardown};
pub use types::{MessageType, RouteOptions, max_path_len};

/// Any overlay message.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum OverlayMessage {
    Put(Put),
    Get(Get),
    GetResult(GetResult),
    TrailSetup(TrailSetup),
    TrailSetupResult(TrailSetupResult),
    TrailRejection(TrailRejection),
    VerifySuccessor(VerifySuccessor),
    VerifySuccessorResult(VerifySuccessorResult),
    NotifyNewSuccessor(NotifyNewSuccessor),
    TrailCompression(TrailCompression),
    TrailTeardown(TrailTeardown),
    AddTrail(AddTrail),
}

impl OverlayMessage {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Put(_) => MessageType::Put,
            Self::Get(_) => MessageType::Get,
            Self::GetResult(_) => MessageType::GetResult,
            Self::TrailSetup(_) => MessageType::TrailSetup,
            Self::TrailSetupResult(_) => MessageType::TrailSetupResult,
            Self::TrailRejection(_) => MessageType::TrailRejection,
            Self::VerifySuccessor(_) => MessageType::VerifySuccessor,
            Self::VerifySuccessorResult(_) => MessageType::VerifySuccessorResult,
            Self::NotifyNewSuccessor(_) => MessageType::NotifyNewSuccessor,
            Self::TrailCompression(_) => MessageType::TrailCompression,
            Self::TrailTeardown(_) => MessageType::TrailTeardown,
            Self::AddTrail(_) => MessageType::AddTrail,
        }
    }
}

impl WireMessage for OverlayMessage {
    fn message_type(&self) -> u16 {
        self.kind() as u16
    }

    fn body_len(&self) -> usize {
        match self {
            Self::Put(m) => m.body_len(),
            Self::Get(m) => m.body_len(),
            Self::GetResult(m) => m.body_len(),
            Self::TrailSetup(m) => m.body_len(),
            Self::TrailSetupResult(m) => m.body_len(),
            Self::TrailRejection(m) => m.body_len(),
            Self::VerifySuccessor(m) => m.body_len(),
            Self::VerifySuccessorResult(m) => m.body_len(),
            Self::NotifyNewSuccessor(m) => m.body_len(),
            Self::TrailCompression(m) => m.body_len(),
            Self::TrailTeardown(m) => m.body_len(),
            Self::AddTrail(m) => m.body_len(),
        }
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            Self::Put(m) => m.encode(dst),
            Self::Get(m) => m.encode(dst),
            Self::GetResult(m) => m.encode(dst),
            Self::TrailSetup(m) => m.encode(dst),
            Self::TrailSetupResult(m) => m.encode(dst),
            Self::TrailRejection(m) => m.encode(dst),
            Self::VerifySuccessor(m) => m.encode(dst),
            Self::VerifySuccessorResult(m) => m.encode(dst),
            Self::NotifyNewSuccessor(m) => m.encode(dst),
            Self::TrailCompression(m) => m.encode(dst),
            Self::TrailTeardown(m) => m.encode(dst),
            Self::AddTrail(m) => m.encode(dst),
        }
    }

    fn decode_body(message_type: u16, body: &[u8]) -> Result<Self, CodecError> {
        let kind = MessageType::from_repr(message_type).ok_or(CodecError::UnknownType(message_type))?;
        let mut r = WireReader::new(body);
        let message = match kind {
            MessageType::Put => Put::decode(&mut r)?.into(),
            MessageType::Get => Get::decode(&mut r)?.into(),
            MessageType::GetResult => GetResult::decode(&mut r)?.into(),
            MessageType::TrailSetup => TrailSetup::decode(&mut r)?.into(),
            MessageType::TrailSetupResult => TrailSetupResult::decode(&mut r)?.into(),
            MessageType::TrailRejection => TrailRejection::decode(&mut r)?.into(),
            MessageType::VerifySuccessor => VerifySuccessor::decode(&mut r)?.into(),
            MessageType::VerifySuccessorResult => VerifySuccessorResult::decode(&mut r)?.into(),
            MessageType::NotifyNewSuccessor => NotifyNewSuccessor::decode(&mut r)?.into(),
            MessageType::TrailCompression => TrailCompression::decode(&mut r)?.into(),
            MessageType::TrailTeardown => TrailTeardown::decode(&mut r)?.into(),
            MessageType::AddTrail => AddTrail::decode(&mut r)?.into(),
        };
        r.finish()?;
        Ok(message)
    }
}

/// Per-message body layout.
pub(crate) trait Body: Sized {
    /// Size of the fields before any trailer.
    const FIXED_LEN: usize;

    fn trailer_len(&self) -> usize;

    fn encode(&self, dst: &mut BytesMut);

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError>;

    fn body_len(&self) -> usize {
        Self::FIXED_LEN + self.trailer_len()
    }
}

pub(crate) fn put_peer(dst: &mut BytesMut, peer: &PeerId) {
    dst.put_slice(peer.as_bytes());
}

pub(crate) fn put_peers(dst: &mut BytesMut, peers: &[PeerId]) {
    for peer in peers {
        put_peer(dst, peer);
    }
}

pub(crate) fn put_trail_id(dst: &mut BytesMut, id: &TrailId) {
    dst.put_slice(id.as_bytes());
}

pub(crate) fn put_key(dst: &mut BytesMut, key: &Key) {
    dst.put_slice(key.as_bytes());
}

pub(crate) fn put_flag(dst: &mut BytesMut, flag: bool) {
    dst.put_u32(u32::from(flag));
}

pub(crate) fn read_peer(r: &mut WireReader<'_>) -> Result<PeerId, CodecError> {
    r.read_b256().map(PeerId::from)
}

pub(crate) fn read_trail_id(r: &mut WireReader<'_>) -> Result<TrailId, CodecError> {
    r.read_b256().map(TrailId::from)
}

pub(crate) fn read_key(r: &mut WireReader<'_>) -> Result<Key, CodecError> {
    r.read_b512().map(Key::from)
}

pub(crate) fn read_direction(r: &mut WireReader<'_>) -> Result<Direction, CodecError> {
    let value = r.read_u32()?;
    Direction::from_repr(value).ok_or(CodecError::InvalidField {
        field: "direction",
        value,
    })
}

/// Read a path whose length was declared in a header field.
pub(crate) fn read_path(
    r: &mut WireReader<'_>,
    field: &'static str,
    declared: u32,
    max: usize,
) -> Result<Vec<PeerId>, CodecError> {
    if declared as usize > max {
        return Err(CodecError::InvalidField {
            field,
            value: declared,
        });
    }
    Ok(r.read_b256_list(declared as usize)?.into_iter().map(PeerId::from).collect())
}

/// Read a trail that fills the rest of the body.
pub(crate) fn read_trail(r: &mut WireReader<'_>) -> Result<Vec<PeerId>, CodecError> {
    Ok(r.rest_b256_list()?.into_iter().map(PeerId::from).collect())
}

pub(crate) fn peers_len(peers: &[PeerId]) -> usize {
    peers.len() * PEER_ID_LEN
}
