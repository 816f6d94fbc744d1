//! Fixtures shared by unit tests and the workspace test crate.

use crate::adapters::InMemoryKVStore;
use crate::error::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use parking_lot::RwLock;
use shared_types::{
    Address, Amount, BlockNumber, ChainBlock, Hash, PoolName, RewardCredit, RoundId,
    TransferDelta,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const TOKEN: Address = [0xAA; 20];
pub const ALICE: Address = [0x01; 20];
pub const BOB: Address = [0x02; 20];
pub const CAROL: Address = [0x03; 20];

pub fn whole(n: i64) -> Amount {
    Amount::from_whole(n)
}

pub fn round(id: &str) -> RoundId {
    RoundId::new(id).unwrap()
}

/// Deterministic block hash; `fork` distinguishes competing branches.
pub fn block_hash(number: BlockNumber, fork: u8) -> Hash {
    let mut hash = [0u8; 32];
    hash[0] = 0xB0;
    hash[1] = fork;
    hash[24..].copy_from_slice(&number.to_be_bytes());
    hash
}

/// Empty block on the main branch.
pub fn block(number: BlockNumber) -> ChainBlock {
    fork_block(number, 0, 0)
}

/// Empty block on branch `fork` whose parent sits on branch `parent_fork`.
pub fn fork_block(number: BlockNumber, fork: u8, parent_fork: u8) -> ChainBlock {
    let parent_hash = match number.checked_sub(1) {
        Some(parent) => block_hash(parent, parent_fork),
        None => [0u8; 32],
    };
    ChainBlock::empty(number, block_hash(number, fork), parent_hash)
}

pub fn transfer(tx: u8, index: u32, holder: Address, amount: Amount) -> TransferDelta {
    TransferDelta {
        transaction_hash: [tx; 32],
        event_index: index,
        token: TOKEN,
        holder,
        amount,
    }
}

pub fn reward(round_id: &str, holder: Address, amount: Amount) -> RewardCredit {
    pool_reward(round_id, PoolName::EXTERNAL, holder, amount)
}

pub fn pool_reward(round_id: &str, pool: &str, holder: Address, amount: Amount) -> RewardCredit {
    RewardCredit {
        round: round(round_id),
        pool: PoolName::new(pool).unwrap(),
        holder,
        amount,
    }
}

pub trait ChainBlockExt {
    fn with_events(self, events: Vec<TransferDelta>) -> Self;
    fn with_credits(self, credits: Vec<RewardCredit>) -> Self;
}

impl ChainBlockExt for ChainBlock {
    fn with_events(mut self, events: Vec<TransferDelta>) -> Self {
        self.events = events;
        self
    }

    fn with_credits(mut self, credits: Vec<RewardCredit>) -> Self {
        self.credits = credits;
        self
    }
}

/// Store handle that can be cloned and reopened, like a database on disk.
#[derive(Clone, Default)]
pub struct SharedKVStore {
    inner: Arc<RwLock<InMemoryKVStore>>,
}

impl SharedKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KeyValueStore for SharedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.inner.read().get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.inner.write().put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.inner.write().delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.inner.write().atomic_batch_write(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.inner.read().exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        self.inner.read().prefix_scan(prefix)
    }
}

/// Store whose batch writes can be made to fail on demand.
#[derive(Clone, Default)]
pub struct FailingKVStore {
    store: SharedKVStore,
    fail_writes: Arc<AtomicBool>,
}

impl FailingKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that toggles failures after the store moved into a service.
    pub fn switch(&self) -> Arc<AtomicBool> {
        self.fail_writes.clone()
    }

    pub fn inner(&self) -> SharedKVStore {
        self.store.clone()
    }
}

impl KeyValueStore for FailingKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.store.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.store.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.store.delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KVStoreError::IOError {
                message: "injected write failure".to_string(),
            });
        }
        self.store.atomic_batch_write(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.store.exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        self.store.prefix_scan(prefix)
    }
}
