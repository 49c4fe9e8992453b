//! Core primitive types for the X-Vine overlay.
//!
//! Identities ([`PeerId`], [`TrailId`], [`Key`]) and the routing direction of a
//! trail live here together with the ring arithmetic in [`ring`], so the wire
//! and overlay crates agree on one definition of "closest".

use std::fmt;

use alloy_primitives::{B256, B512};
use rand::Rng;

pub mod ring;

pub use ring::{
    MAX_FINGERS, PREDECESSOR_FINGER_INDEX, RingValue, finger_map_index, finger_target,
    ring_distance, search_index, select_closest,
};

/// Length in bytes of an encoded peer identity.
pub const PEER_ID_LEN: usize = 32;

/// Length in bytes of an encoded trail identifier.
pub const TRAIL_ID_LEN: usize = 32;

/// Length in bytes of an encoded key.
pub const KEY_LEN: usize = 64;

/// Public identity of a peer.
///
/// The identity is opaque except for its ring position: the low 64 bits of the
/// identity read as a big-endian integer.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, derive_more::From, derive_more::Into,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerId(B256);

impl PeerId {
    /// Build a peer identity from raw bytes.
    pub const fn new(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(B256::new(bytes))
    }

    /// Generate a random identity.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; PEER_ID_LEN];
        rng.fill(&mut bytes[..]);
        Self::new(bytes)
    }

    /// Position of this peer on the 2^64 ring.
    pub fn ring_value(&self) -> RingValue {
        low_u64(self.0.as_slice())
    }

    /// Raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, long enough to tell peers apart in logs.
        let bytes = self.as_bytes();
        write!(f, "{}", hex::encode(&bytes[..4]))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl From<[u8; PEER_ID_LEN]> for PeerId {
    fn from(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self::new(bytes)
    }
}

/// Random identifier naming one trail in the routing tables along it.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, derive_more::From, derive_more::Into,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrailId(B256);

impl TrailId {
    /// The all-zero id, used where a message carries no intermediate trail.
    pub const ZERO: Self = Self(B256::ZERO);

    /// Build a trail id from raw bytes.
    pub const fn new(bytes: [u8; TRAIL_ID_LEN]) -> Self {
        Self(B256::new(bytes))
    }

    /// Generate a fresh random trail id.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; TRAIL_ID_LEN];
        rng.fill(&mut bytes[..]);
        Self::new(bytes)
    }

    /// Returns true for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == B256::ZERO
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; TRAIL_ID_LEN] {
        &self.0.0
    }
}

impl fmt::Display for TrailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.as_bytes()[..4]))
    }
}

impl fmt::Debug for TrailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrailId({})", self.0)
    }
}

/// Key of a stored block (512-bit hash).
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, derive_more::From, derive_more::Into,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Key(B512);

impl Key {
    /// Build a key from raw bytes.
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(B512::new(bytes))
    }

    /// Ring position the key is routed to: its low 64 bits.
    pub fn ring_value(&self) -> RingValue {
        low_u64(self.0.as_slice())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.as_bytes()[..8]))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

/// Direction of travel along a trail, relative to the peer that set it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum Direction {
    /// From the trail source toward the finger.
    #[default]
    SrcToDest = 0,

    /// From the finger back toward the trail source.
    DestToSrc = 1,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::SrcToDest => Self::DestToSrc,
            Self::DestToSrc => Self::SrcToDest,
        }
    }
}

fn low_u64(bytes: &[u8]) -> u64 {
    let mut low = [0u8; 8];
    if let Some(tail) = bytes.len().checked_sub(8).and_then(|start| bytes.get(start..)) {
        low.copy_from_slice(tail);
    }
    u64::from_be_bytes(low)
}
