//! Storage key layout
//!
//! All integers are big-endian so that prefix scans return rows in block
//! order. Round ids and pool names are prefixed with their byte length so
//! that one label can never be a prefix of another's key.

use super::entities::TokenEvent;
use shared_types::{Address, BlockNumber, PoolName, RoundId};

/// Key prefixes for different record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    /// Observed block: `b:{number}` -> BlockHeader
    Block,
    /// Token event: `e:{block}{tx}{index}{token}{holder}` -> TokenEvent
    Event,
    /// Per-holder event index: `h:{token}{holder}{block}{tx}{index}` -> Amount
    HolderEvent,
    /// Immature credit: `i:{block}{round}{pool}{holder}` -> ImmatureMiningReward
    Credit,
    /// Round lifecycle: `o:{round}` -> RoundRecord
    Round,
    /// Mature reward: `m:{round}{holder}` -> MatureMiningReward
    Mature,
    /// Payment: `p:{id}` -> Payment
    Payment,
    /// Round allocation: `q:{id}` -> RoundPayment
    RoundPayment,
    /// Ledger counters: `x:metadata` -> LedgerMetadata
    Metadata,
}

impl KeyPrefix {
    /// Get the byte prefix for this key type.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            KeyPrefix::Block => b"b:",
            KeyPrefix::Event => b"e:",
            KeyPrefix::HolderEvent => b"h:",
            KeyPrefix::Credit => b"i:",
            KeyPrefix::Round => b"o:",
            KeyPrefix::Mature => b"m:",
            KeyPrefix::Payment => b"p:",
            KeyPrefix::RoundPayment => b"q:",
            KeyPrefix::Metadata => b"x:",
        }
    }

    /// Build a full key with the given suffix.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.as_bytes().to_vec();
        key.extend_from_slice(suffix);
        key
    }

    pub fn block_key(number: BlockNumber) -> Vec<u8> {
        KeyPrefix::Block.key(&number.to_be_bytes())
    }

    /// Prefix of every event recorded in one block.
    pub fn event_block_prefix(number: BlockNumber) -> Vec<u8> {
        KeyPrefix::Event.key(&number.to_be_bytes())
    }

    pub fn event_key(event: &TokenEvent) -> Vec<u8> {
        let mut key = Self::event_block_prefix(event.block_number);
        key.extend_from_slice(&event.transaction_hash);
        key.extend_from_slice(&event.event_index.to_be_bytes());
        key.extend_from_slice(&event.token);
        key.extend_from_slice(&event.holder);
        key
    }

    /// Prefix of every event touching one (token, holder) pair.
    pub fn holder_event_prefix(token: &Address, holder: &Address) -> Vec<u8> {
        let mut key = KeyPrefix::HolderEvent.key(token);
        key.extend_from_slice(holder);
        key
    }

    pub fn holder_event_key(event: &TokenEvent) -> Vec<u8> {
        let mut key = Self::holder_event_prefix(&event.token, &event.holder);
        key.extend_from_slice(&event.block_number.to_be_bytes());
        key.extend_from_slice(&event.transaction_hash);
        key.extend_from_slice(&event.event_index.to_be_bytes());
        key
    }

    /// Prefix of every credit recorded in one block.
    pub fn credit_block_prefix(number: BlockNumber) -> Vec<u8> {
        KeyPrefix::Credit.key(&number.to_be_bytes())
    }

    pub fn credit_key(
        number: BlockNumber,
        round: &RoundId,
        pool: &PoolName,
        holder: &Address,
    ) -> Vec<u8> {
        let mut key = Self::credit_block_prefix(number);
        push_label(&mut key, round.as_str());
        push_label(&mut key, pool.as_str());
        key.extend_from_slice(holder);
        key
    }

    pub fn round_key(round: &RoundId) -> Vec<u8> {
        let mut key = KeyPrefix::Round.as_bytes().to_vec();
        push_label(&mut key, round.as_str());
        key
    }

    pub fn mature_key(round: &RoundId, holder: &Address) -> Vec<u8> {
        let mut key = KeyPrefix::Mature.as_bytes().to_vec();
        push_label(&mut key, round.as_str());
        key.extend_from_slice(holder);
        key
    }

    pub fn payment_key(id: u64) -> Vec<u8> {
        KeyPrefix::Payment.key(&id.to_be_bytes())
    }

    pub fn round_payment_key(id: u64) -> Vec<u8> {
        KeyPrefix::RoundPayment.key(&id.to_be_bytes())
    }

    pub fn metadata_key() -> Vec<u8> {
        KeyPrefix::Metadata.key(b"metadata")
    }
}

fn push_label(key: &mut Vec<u8>, label: &str) {
    let bytes = label.as_bytes();
    // RoundId and PoolName guarantee at most 255 bytes
    key.push(bytes.len() as u8);
    key.extend_from_slice(bytes);
}
