use crate::ports::outbound::ChainReader;
use parking_lot::RwLock;
use shared_types::{BlockNumber, Hash};
use std::collections::HashMap;

/// Chain reader for hosts without canonical-chain access.
///
/// Reorg detection then relies on each block's parent hash alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCanonicalChain;

impl ChainReader for NoCanonicalChain {
    fn canonical_hash(&self, _number: BlockNumber) -> Option<Hash> {
        None
    }
}

/// Chain reader backed by an explicit height -> hash table.
///
/// Used by tests and by hosts that mirror the canonical chain themselves.
#[derive(Debug, Default)]
pub struct StaticChainReader {
    hashes: RwLock<HashMap<BlockNumber, Hash>>,
}

impl StaticChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, number: BlockNumber, hash: Hash) {
        self.hashes.write().insert(number, hash);
    }
}

impl ChainReader for StaticChainReader {
    fn canonical_hash(&self, number: BlockNumber) -> Option<Hash> {
        self.hashes.read().get(&number).copied()
    }
}

impl<R: ChainReader + ?Sized> ChainReader for std::sync::Arc<R> {
    fn canonical_hash(&self, number: BlockNumber) -> Option<Hash> {
        (**self).canonical_hash(number)
    }
}
