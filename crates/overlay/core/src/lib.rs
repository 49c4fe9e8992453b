//! X-Vine overlay routing core.
//!
//! Peers form a Chord-like ring even though each one talks only to its
//! friends. Fingers that are not friends are reached over *trails*: source
//! routed paths whose intermediate hops remember the trail in a
//! [`RoutingTable`]. This crate holds the per-peer state machine:
//!
//! - [`FriendTable`]: directly connected peers, their send queues and
//!   congestion state.
//! - [`FingerTable`]: 64 ring fingers plus the predecessor, each with a few
//!   alternative [`Trail`]s.
//! - [`find_successor`]: the closest-peer rule used for every routing
//!   decision.
//! - [`Overlay`]: the message router and ring maintenance.
//! - [`OverlayService`]: a tokio task driving an [`Overlay`] from channels.
//!
//! The routing table, block store, client layer and transport are traits so
//! they can be supplied from outside; in-memory versions are included.

mod client;
mod config;
mod datacache;
mod error;
mod fingers;
mod friends;
mod maintenance;
mod metrics;
mod router;
mod routing;
mod selector;
mod service;
mod trail;
mod transport;

pub use client::{ClientHandler, ClientResult, NoopClient};
pub use config::*;
pub use datacache::{
    AcceptAll, BLOCK_TYPE_ANY, BlockRecord, BlockStore, BlockValidator, BlockVerdict,
    MemoryBlockStore,
};
pub use error::OverlayError;
pub use fingers::{ActiveSearch, FingerInfo, FingerTable, SelectedTrail};
pub use friends::{FriendInfo, FriendTable, Priority};
pub use metrics::OverlayStats;
pub use router::Overlay;
pub use routing::{MemoryRoutingTable, RouteEntry, RoutingTable};
pub use selector::{ClosestPeer, find_successor};
pub use service::{
    ChannelClient, ChannelTransport, OverlayCommand, OverlayEvent, OverlayHandle, OverlayService,
    RingSnapshot,
};
pub use trail::{Trail, compression_point, inverted, is_loop_free, normalize, search_my_index};
pub use transport::FriendTransport;
