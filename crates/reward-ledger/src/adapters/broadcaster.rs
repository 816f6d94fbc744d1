use crate::error::BroadcastError;
use crate::ports::outbound::{Broadcaster, PaymentOrder, ReceiptStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::Hash;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory mock broadcaster for testing.
///
/// Transaction hashes are derived from the nonce, so a re-sent order yields
/// the hash of the first send, like a wallet replaying a signed transaction.
/// Receipts succeed unless set otherwise.
#[derive(Default)]
pub struct MockBroadcaster {
    sent: RwLock<Vec<PaymentOrder>>,
    by_nonce: RwLock<HashMap<u64, Hash>>,
    receipts: RwLock<HashMap<Hash, ReceiptStatus>>,
    offline: AtomicBool,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get every order received, including repeats.
    pub fn sent(&self) -> Vec<PaymentOrder> {
        self.sent.read().clone()
    }

    /// Make subsequent sends fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_receipt(&self, transaction_hash: Hash, status: ReceiptStatus) {
        self.receipts.write().insert(transaction_hash, status);
    }

    pub fn hash_for_nonce(nonce: u64) -> Hash {
        let mut hash = [0xB7u8; 32];
        hash[24..].copy_from_slice(&nonce.to_be_bytes());
        hash
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn send(&self, order: &PaymentOrder) -> Result<Hash, BroadcastError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BroadcastError::Unavailable {
                reason: "mock broadcaster offline".to_string(),
            });
        }
        self.sent.write().push(order.clone());
        let hash = *self
            .by_nonce
            .write()
            .entry(order.nonce)
            .or_insert_with(|| Self::hash_for_nonce(order.nonce));
        Ok(hash)
    }

    async fn receipt(&self, transaction_hash: &Hash) -> Result<ReceiptStatus, BroadcastError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BroadcastError::Unavailable {
                reason: "mock broadcaster offline".to_string(),
            });
        }
        Ok(self
            .receipts
            .read()
            .get(transaction_hash)
            .copied()
            .unwrap_or(ReceiptStatus::Succeeded))
    }
}
