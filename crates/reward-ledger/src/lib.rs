//! # Reward Ledger
//!
//! Persistent ledger that turns on-chain token activity into mining rewards
//! and reconciles the payments made against them.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Block Cursor**: tracks the observed chain and detects reorganizations
//! - **Event Ledger**: append-only signed balance changes per block
//! - **Balance Aggregator**: current balance per (token, holder)
//! - **Reward Accrual**: immature credits and per-round summaries
//! - **Maturation**: Open → Finalizing → Matured, crash-safe
//! - **Payment Reconciler**: payments never exceed matured entitlement
//!
//! ## Architecture
//!
//! ```text
//! Block feed ──ChainBlock──→ LedgerService ──one batch per block──→ KeyValueStore
//!                               │
//!                               ├── finalize / finalize_ready ──→ MatureMiningReward
//!                               │
//!                               └── authorize_payment ──→ Payment ──→ Payer ──→ Broadcaster
//! ```
//!
//! ## Ledger Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Atomic Blocks | A block and all of its rows commit together or not at all |
//! | Unique Rows | Events and credits are keyed; duplicates are rejected |
//! | Balance Consistency | Balance equals the sum of the holder's stored events |
//! | Immutable Maturity | A matured round accepts no credits and no rollback |
//! | Bounded Payments | Paid per (round, holder) never exceeds the mature reward |
//! | Unique Nonces | One payment per nonce; identical retries are idempotent |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Pure domain logic (records, books, cursor, key layout)
//! - `ports/` - Port traits (inbound API, outbound SPI)
//! - `service/` - Application service implementing the API
//! - `adapters/` - Storage, codec, chain, clock, policy and wallet adapters
//! - `payout` - Payout cycle driving the broadcaster
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reward_ledger::{InMemoryLedger, LedgerConfig, RewardLedgerApi};
//!
//! let ledger = InMemoryLedger::in_memory(LedgerConfig::default())?;
//! ledger.ingest_block(block)?;
//! ledger.finalize(&round)?;
//! let payment = ledger.authorize(&round, &holder, amount)?;
//! ledger.record_broadcast(payment.id, tx_hash)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod payout;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{
    BincodeCodec, ConfirmationDepthPolicy, FileBackedKVStore, InMemoryKVStore, ManualFinalization,
    MockBroadcaster, NoCanonicalChain, StaticChainReader, SystemTimeSource,
};
pub use domain::{
    Allocation, Entitlement, ImmatureMiningReward, ImmatureMiningRewardSummary, LedgerConfig,
    MatureMiningReward, ObserveOutcome, Payment, PaymentRequest, PaymentStatus, PaymentSummary,
    ReorgReport, RoundPayment, RoundRecord, RoundState, ShareMiningSchedule, TokenBalance,
    TokenEvent,
};
pub use error::{BroadcastError, CodecError, KVStoreError, LedgerError, LedgerResult};
pub use payout::{Payer, PayoutReport};
pub use ports::inbound::RewardLedgerApi;
pub use ports::outbound::{
    BatchOperation, Broadcaster, ChainReader, FinalizationPolicy, KeyValueStore, PaymentOrder,
    ReceiptStatus, RecordCodec, TimeSource,
};
pub use service::{InMemoryLedger, LedgerDependencies, LedgerService};
