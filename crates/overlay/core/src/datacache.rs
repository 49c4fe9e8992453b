//! Local block storage and block validation hooks.

use std::{collections::HashMap, time::SystemTime};

use auto_impl::auto_impl;
use bytes::Bytes;
use parking_lot::RwLock;
use xvine_primitives::{Key, PeerId};

/// Block type matching any stored type in a lookup.
pub const BLOCK_TYPE_ANY: u32 = 0;

/// One stored block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub key: Key,
    pub block_type: u32,
    pub expiration: SystemTime,
    pub put_path: Vec<PeerId>,
    pub payload: Bytes,
}

/// Local key/value cache the overlay stores PUTs into and answers GETs from.
#[auto_impl(&, Box, Arc)]
pub trait BlockStore: Send + Sync {
    fn put(&self, record: BlockRecord);

    /// Unexpired records for `key` of `block_type` ([`BLOCK_TYPE_ANY`] for all).
    fn get(&self, key: &Key, block_type: u32) -> Vec<BlockRecord>;
}

/// Outcome of validating a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockVerdict {
    Valid,
    Invalid,
    /// Type not understood by the validator.
    Unknown,
}

/// Validates blocks carried by inbound PUTs.
#[auto_impl(&, Box, Arc)]
pub trait BlockValidator: Send + Sync {
    fn validate(&self, block_type: u32, key: &Key, payload: &[u8]) -> BlockVerdict;
}

/// Validator that accepts every block.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl BlockValidator for AcceptAll {
    fn validate(&self, _block_type: u32, _key: &Key, _payload: &[u8]) -> BlockVerdict {
        BlockVerdict::Valid
    }
}

/// In-memory block store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    records: RwLock<HashMap<Key, Vec<BlockRecord>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, record: BlockRecord) {
        let mut records = self.records.write();
        let entry = records.entry(record.key).or_default();
        // same content replaces the older copy
        entry.retain(|r| r.block_type != record.block_type || r.payload != record.payload);
        entry.push(record);
    }

    fn get(&self, key: &Key, block_type: u32) -> Vec<BlockRecord> {
        let now = SystemTime::now();
        self.records
            .read()
            .get(key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| block_type == BLOCK_TYPE_ANY || r.block_type == block_type)
                    .filter(|r| r.expiration > now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
