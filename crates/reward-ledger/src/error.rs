//! Error types for the reward ledger

use crate::domain::entities::PaymentStatus;
use crate::domain::maturation::RoundState;
use shared_types::{
    address_hex, hash_hex, Address, Amount, AmountError, BlockNumber, Hash, PoolName, RoundId,
};
use std::fmt;
use thiserror::Error;

/// Primary key of an append-only ledger row, carried by [`LedgerError::DuplicateKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    TokenEvent {
        block_number: BlockNumber,
        transaction_hash: Hash,
        event_index: u32,
        token: Address,
        holder: Address,
    },
    RewardCredit {
        block_number: BlockNumber,
        round: RoundId,
        pool: PoolName,
        holder: Address,
    },
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::TokenEvent {
                block_number,
                transaction_hash,
                event_index,
                token,
                holder,
            } => write!(
                f,
                "token event (block {}, tx {}, index {}, token {}, holder {})",
                block_number,
                hash_hex(transaction_hash),
                event_index,
                address_hex(token),
                address_hex(holder)
            ),
            RecordKey::RewardCredit {
                block_number,
                round,
                pool,
                holder,
            } => write!(
                f,
                "reward credit (block {}, round {}, pool {}, holder {})",
                block_number,
                round,
                pool,
                address_hex(holder)
            ),
        }
    }
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}

/// Record encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Record codec error: {message}")]
pub struct CodecError {
    pub message: String,
}

/// Payment broadcast errors reported by the wallet side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// Wallet rejected the order.
    #[error("Broadcast rejected: {reason}")]
    Rejected { reason: String },

    /// Wallet unreachable; the order may be retried.
    #[error("Broadcaster unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Reward ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Append-only row already present
    #[error("Duplicate key: {key}")]
    DuplicateKey { key: RecordKey },

    /// Amount not representable, not positive where required, or overflowing
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Referenced block is not part of the observed chain
    #[error("Unknown block: {number}")]
    UnknownBlock { number: BlockNumber },

    /// Credit or rollback aimed at a round past `Open`
    #[error("Round {round} is already {state}")]
    RoundAlreadyMatured { round: RoundId, state: RoundState },

    /// No credits were ever recorded for this round
    #[error("Unknown mining round: {round}")]
    UnknownRound { round: RoundId },

    /// Payment against a round that has not matured
    #[error("Round {round} is {state}, payments require a matured round")]
    RoundNotMatured { round: RoundId, state: RoundState },

    /// Payment would exceed the matured entitlement
    #[error(
        "Insufficient entitlement for {} in round {round}: requested {requested}, available {available}",
        address_hex(.holder)
    )]
    InsufficientEntitlement {
        round: RoundId,
        holder: Address,
        requested: Amount,
        available: Amount,
    },

    /// Round allocations do not add up to the payment
    #[error("Allocation mismatch: {reason}")]
    AllocationMismatch { reason: String },

    /// Nonce already used by a different payment
    #[error("Nonce {nonce} already used by payment {payment_id}")]
    NonceConflict { nonce: u64, payment_id: u64 },

    /// Payment not found
    #[error("Payment not found: {payment_id}")]
    PaymentNotFound { payment_id: u64 },

    /// Payment already carries a different transaction hash
    #[error("Payment {payment_id} already broadcast as {}", hash_hex(.transaction_hash))]
    AlreadyBroadcast {
        payment_id: u64,
        transaction_hash: Hash,
    },

    /// Payment status does not allow the requested transition
    #[error("Payment {payment_id} is {status}; cannot mark it {target}")]
    InvalidPaymentStatus {
        payment_id: u64,
        status: PaymentStatus,
        target: PaymentStatus,
    },

    /// Rollback range exceeds the retained history
    #[error("Reorg depth {depth} exceeds maximum {max}")]
    ReorgTooDeep { depth: u64, max: u64 },

    /// Rollback would remove every retained block
    #[error("Cannot roll back to block {diverging_at}: lowest retained block is {lowest_retained}")]
    ReorgBeyondHistory {
        diverging_at: BlockNumber,
        lowest_retained: BlockNumber,
    },

    /// Rollback would remove credits of a round past `Open`
    #[error("Reorg at block {block} would remove credits of round {round}, which is {state}")]
    ReorgIntoMaturedRound {
        round: RoundId,
        block: BlockNumber,
        state: RoundState,
    },

    /// Replacement blocks do not link to the retained ancestor
    #[error("Reorg replacement rejected: {reason}")]
    ReorgMismatch { reason: String },

    /// Ledger configuration rejected on open
    #[error("Invalid ledger configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Stored records disagree with each other
    #[error("Inconsistent ledger state: {reason}")]
    InconsistentState { reason: String },

    /// Storage error
    #[error(transparent)]
    Storage(#[from] KVStoreError),

    /// Serialization error
    #[error(transparent)]
    Serialization(#[from] CodecError),
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::InvalidAmount {
            reason: err.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
