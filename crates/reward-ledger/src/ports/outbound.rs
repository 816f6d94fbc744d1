//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the ledger service. These are the interfaces the
//! host application implements.

use crate::domain::entities::RoundRecord;
use crate::error::{BroadcastError, CodecError, KVStoreError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Address, Amount, BlockNumber, Hash, Timestamp};

/// Result of a prefix scan: `(key, value)` pairs.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Abstract interface for key-value database operations.
///
/// Production: `RocksDbStore` (ledger-runtime, `rocksdb` feature) or
/// `FileBackedKVStore`.
/// Testing: `InMemoryKVStore`.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, in order, or NONE are.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Abstract interface for record serialization.
pub trait RecordCodec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Canonical chain lookup used to locate the common ancestor of a reorg.
pub trait ChainReader: Send + Sync {
    /// Canonical block hash at `number`, or `None` when unknown.
    fn canonical_hash(&self, number: BlockNumber) -> Option<Hash>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;
}

/// Decides when an open mining round should mature.
pub trait FinalizationPolicy: Send + Sync {
    /// `tip` is the highest observed block, if any.
    fn should_finalize(&self, round: &RoundRecord, tip: Option<BlockNumber>) -> bool;
}

/// Transfer instruction handed to the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOrder {
    pub payment_id: u64,
    pub holder: Address,
    pub amount: Amount,
    pub nonce: u64,
}

/// On-chain outcome of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Not mined yet.
    Pending,
    Succeeded,
    /// Mined but reverted.
    Failed,
}

/// Wallet-side broadcaster. Re-sending an order with the same nonce must
/// not produce a second transfer.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sign and broadcast, returning the transaction hash.
    async fn send(&self, order: &PaymentOrder) -> Result<Hash, BroadcastError>;

    /// Look up the receipt of a broadcast transaction.
    async fn receipt(&self, transaction_hash: &Hash) -> Result<ReceiptStatus, BroadcastError>;
}
