//! Message type codes and routing option bits.

use xvine_net_codec::{HEADER_LEN, MAX_FRAME_SIZE};
use xvine_primitives::PEER_ID_LEN;

/// Overlay message type codes carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum MessageType {
    Put = 156,
    Get = 157,
    GetResult = 158,
    TrailSetup = 159,
    TrailSetupResult = 160,
    TrailRejection = 161,
    VerifySuccessor = 162,
    VerifySuccessorResult = 163,
    NotifyNewSuccessor = 164,
    TrailCompression = 165,
    TrailTeardown = 166,
    AddTrail = 167,
}

/// Routing option bits of PUT and GET.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::From, derive_more::Into,
)]
pub struct RouteOptions(u32);

impl RouteOptions {
    pub const NONE: Self = Self(0);
    /// Record the path a PUT takes.
    pub const RECORD_ROUTE: Self = Self(2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Most peers a path trailer can hold after `fixed_len` bytes of fixed fields.
pub const fn max_path_len(fixed_len: usize) -> usize {
    MAX_FRAME_SIZE.saturating_sub(HEADER_LEN + fixed_len) / PEER_ID_LEN
}
