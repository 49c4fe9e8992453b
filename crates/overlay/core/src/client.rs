//! Hand-off of GET results to local applications.

use std::time::SystemTime;

use auto_impl::auto_impl;
use bytes::Bytes;
use xvine_primitives::{Key, PeerId};

/// A block found for a local GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResult {
    pub expiration: SystemTime,
    pub key: Key,
    pub get_path: Vec<PeerId>,
    pub put_path: Vec<PeerId>,
    pub block_type: u32,
    pub payload: Bytes,
}

/// Receives results of GETs issued by this peer.
#[auto_impl(&, Box, Arc)]
pub trait ClientHandler: Send + Sync {
    fn deliver_result(&self, result: ClientResult);
}

/// Client that discards results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClient;

impl ClientHandler for NoopClient {
    fn deliver_result(&self, _result: ClientResult) {}
}
