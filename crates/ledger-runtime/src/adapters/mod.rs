//! Runtime adapters: the storage backend chosen at startup and the
//! broadcaster used when no wallet is attached.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;

use crate::config::StorageBackend;
use async_trait::async_trait;
use reward_ledger::{
    BatchOperation, BroadcastError, Broadcaster, FileBackedKVStore, InMemoryKVStore, KVStoreError,
    KeyValueStore, PaymentOrder, ReceiptStatus,
};
use sha3::{Digest, Keccak256};
use shared_types::{address_hex, Hash};
use std::path::Path;
use tracing::info;

/// Snapshot file used by the file backend, relative to the data directory.
pub const LEDGER_FILE: &str = "ledger.db";

/// RocksDB directory, relative to the data directory.
pub const ROCKSDB_DIR: &str = "ledger.rocksdb";

/// Store selected by `storage_backend`.
pub enum RuntimeStore {
    Memory(InMemoryKVStore),
    File(FileBackedKVStore),
    #[cfg(feature = "rocksdb")]
    RocksDb(rocksdb_store::RocksDbStore),
}

impl RuntimeStore {
    /// Open the backend under `data_dir`.
    pub fn open(backend: StorageBackend, data_dir: &Path) -> Result<Self, KVStoreError> {
        match backend {
            StorageBackend::Memory => {
                info!("[runtime] 🧠 Using in-memory storage; nothing survives a restart");
                Ok(RuntimeStore::Memory(InMemoryKVStore::new()))
            }
            StorageBackend::File => {
                let path = data_dir.join(LEDGER_FILE);
                info!("[runtime] 💾 Using file-backed storage at {}", path.display());
                Ok(RuntimeStore::File(FileBackedKVStore::open(path)?))
            }
            #[cfg(feature = "rocksdb")]
            StorageBackend::RocksDb => {
                let path = data_dir.join(ROCKSDB_DIR);
                info!("[runtime] 🗄️ Using RocksDB storage at {}", path.display());
                Ok(RuntimeStore::RocksDb(rocksdb_store::RocksDbStore::open(
                    rocksdb_store::RocksDbConfig::new(path),
                )?))
            }
            #[cfg(not(feature = "rocksdb"))]
            StorageBackend::RocksDb => Err(KVStoreError::IOError {
                message: "RocksDB backend is not compiled in".to_string(),
            }),
        }
    }

    fn inner(&self) -> &dyn KeyValueStore {
        match self {
            RuntimeStore::Memory(store) => store,
            RuntimeStore::File(store) => store,
            #[cfg(feature = "rocksdb")]
            RuntimeStore::RocksDb(store) => store,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn KeyValueStore {
        match self {
            RuntimeStore::Memory(store) => store,
            RuntimeStore::File(store) => store,
            #[cfg(feature = "rocksdb")]
            RuntimeStore::RocksDb(store) => store,
        }
    }
}

impl KeyValueStore for RuntimeStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.inner().get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.inner_mut().put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.inner_mut().delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.inner_mut().atomic_batch_write(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.inner().exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        self.inner().prefix_scan(prefix)
    }
}

/// Broadcaster that signs nothing and sends nothing.
///
/// The returned hash is `keccak256(payment_id || holder || amount || nonce)`,
/// so a re-sent order gets the same hash. Every receipt reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBroadcaster;

impl DryRunBroadcaster {
    pub fn transaction_hash(order: &PaymentOrder) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(order.payment_id.to_be_bytes());
        hasher.update(order.holder);
        hasher.update(order.amount.raw().to_be_bytes());
        hasher.update(order.nonce.to_be_bytes());
        hasher.finalize().into()
    }
}

#[async_trait]
impl Broadcaster for DryRunBroadcaster {
    async fn send(&self, order: &PaymentOrder) -> Result<Hash, BroadcastError> {
        let hash = Self::transaction_hash(order);
        info!(
            "[runtime] 🧪 Dry run: payment {} of {} to {} (nonce {})",
            order.payment_id,
            order.amount,
            address_hex(&order.holder),
            order.nonce
        );
        Ok(hash)
    }

    async fn receipt(&self, _transaction_hash: &Hash) -> Result<ReceiptStatus, BroadcastError> {
        Ok(ReceiptStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Amount;
    use tempfile::TempDir;

    fn order(nonce: u64) -> PaymentOrder {
        PaymentOrder {
            payment_id: 1,
            holder: [7u8; 20],
            amount: Amount::from_whole(5),
            nonce,
        }
    }

    #[test]
    fn test_file_backend_persists_under_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = RuntimeStore::open(StorageBackend::File, temp_dir.path()).unwrap();
            store
                .atomic_batch_write(vec![BatchOperation::put(b"k1".to_vec(), b"v1".to_vec())])
                .unwrap();
        }
        assert!(temp_dir.path().join(LEDGER_FILE).exists());

        let store = RuntimeStore::open(StorageBackend::File, temp_dir.path()).unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_memory_backend_scans_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = RuntimeStore::open(StorageBackend::Memory, temp_dir.path()).unwrap();
        store.put(b"p:2", b"b").unwrap();
        store.put(b"p:1", b"a").unwrap();
        store.put(b"q:1", b"c").unwrap();

        let keys: Vec<_> = store.prefix_scan(b"p:").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"p:1".to_vec(), b"p:2".to_vec()]);
    }

    #[cfg(not(feature = "rocksdb"))]
    #[test]
    fn test_rocksdb_backend_requires_feature() {
        let temp_dir = TempDir::new().unwrap();
        assert!(RuntimeStore::open(StorageBackend::RocksDb, temp_dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_hash_is_stable_per_nonce() {
        let broadcaster = DryRunBroadcaster;
        let first = broadcaster.send(&order(3)).await.unwrap();
        let again = broadcaster.send(&order(3)).await.unwrap();
        let other = broadcaster.send(&order(4)).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(broadcaster.receipt(&first).await.unwrap(), ReceiptStatus::Succeeded);
    }
}
