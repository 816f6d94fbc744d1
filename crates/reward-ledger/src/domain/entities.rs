//! # Ledger Records
//!
//! Persisted rows and derived views. Every stored record is bincode encoded
//! under a key built by [`crate::domain::keys::KeyPrefix`].

use super::maturation::RoundState;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, BlockNumber, Hash, PoolName, RoundId, Timestamp, TransferDelta};
use std::fmt;

/// One signed balance change, keyed by
/// `(block_number, transaction_hash, event_index, token, holder)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub block_number: BlockNumber,
    pub transaction_hash: Hash,
    pub event_index: u32,
    pub token: Address,
    pub holder: Address,
    pub amount: Amount,
}

impl TokenEvent {
    pub fn from_delta(block_number: BlockNumber, delta: &TransferDelta) -> Self {
        Self {
            block_number,
            transaction_hash: delta.transaction_hash,
            event_index: delta.event_index,
            token: delta.token,
            holder: delta.holder,
            amount: delta.amount,
        }
    }
}

/// Current balance of one holder for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: Address,
    pub holder: Address,
    pub balance: Amount,
}

/// Immature reward credited to a holder in one block for one round and pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmatureMiningReward {
    pub block_number: BlockNumber,
    pub mining_round: RoundId,
    pub pool_name: PoolName,
    pub holder: Address,
    pub mcb_balance: Amount,
}

/// Sum of a holder's immature credits for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmatureMiningRewardSummary {
    pub mining_round: RoundId,
    pub holder: Address,
    pub mcb_balance: Amount,
}

/// Payable reward of a holder for a matured round. Written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatureMiningReward {
    pub mining_round: RoundId,
    pub holder: Address,
    pub mcb_balance: Amount,
}

/// Lifecycle record of a mining round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub mining_round: RoundId,
    pub state: RoundState,
    /// Block of the first credit ever recorded for the round.
    pub opened_at_block: BlockNumber,
    /// Cursor tip when maturation completed.
    pub matured_at_block: Option<BlockNumber>,
}

/// Settlement progress of a payment.
///
/// `Authorized -> Broadcast -> Settled`, or `Failed` from either of the
/// first two. A failed payment no longer counts against the entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Authorized,
    Broadcast,
    Settled,
    Failed,
}

impl PaymentStatus {
    pub fn counts_as_paid(self) -> bool {
        self != PaymentStatus::Failed
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Broadcast => "broadcast",
            PaymentStatus::Settled => "settled",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An authorized payment to one holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: u64,
    pub holder: Address,
    pub amount: Amount,
    pub pay_time: Timestamp,
    pub nonce: u64,
    /// `None` until the wallet reports a broadcast.
    pub transaction_hash: Option<Hash>,
    pub status: PaymentStatus,
}

/// Share of a payment charged against one round's matured reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPayment {
    pub id: u64,
    pub mining_round: RoundId,
    pub holder: Address,
    pub amount: Amount,
    pub payment_id: u64,
}

/// Counters persisted alongside the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub next_payment_id: u64,
    pub next_round_payment_id: u64,
    pub next_nonce: u64,
}

impl LedgerMetadata {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            next_payment_id: 1,
            next_round_payment_id: 1,
            next_nonce: initial_nonce,
        }
    }
}

/// One round's share of a payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub round: RoundId,
    pub amount: Amount,
}

impl Allocation {
    pub fn new(round: RoundId, amount: Amount) -> Self {
        Self { round, amount }
    }
}

/// Request to authorize a payment against matured rewards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub holder: Address,
    pub amount: Amount,
    pub allocations: Vec<Allocation>,
    /// Caller-chosen nonce; assigned by the ledger when `None`.
    pub nonce: Option<u64>,
}

impl PaymentRequest {
    /// Payment charged entirely against one round.
    pub fn single(round: RoundId, holder: Address, amount: Amount) -> Self {
        Self {
            holder,
            amount,
            allocations: vec![Allocation::new(round, amount)],
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

/// Matured, paid and still payable amounts for one (round, holder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub mining_round: RoundId,
    pub holder: Address,
    pub mature: Amount,
    pub paid: Amount,
    pub unpaid: Amount,
}

/// Totals paid to one holder across all rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSummary {
    pub holder: Address,
    pub total_paid: Amount,
    pub payment_count: usize,
    pub unbroadcast_count: usize,
    /// Broadcast but without a successful receipt yet.
    pub unconfirmed_count: usize,
    pub failed_count: usize,
}

/// Outcome of a rollback or a rollback-plus-reapply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgReport {
    pub diverging_at: BlockNumber,
    pub removed_blocks: u64,
    pub removed_events: usize,
    pub removed_credits: usize,
    pub applied_blocks: usize,
    pub new_tip: Option<BlockNumber>,
}
