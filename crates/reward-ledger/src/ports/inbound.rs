//! # Inbound Ports (Driving Ports)
//!
//! The API the ledger exposes to its host: the block watcher drives the
//! ingestion half, schedulers and operators drive maturation and settlement.

use crate::domain::cursor::ObserveOutcome;
use crate::domain::maturation::RoundState;
use crate::domain::entities::{
    Entitlement, ImmatureMiningRewardSummary, MatureMiningReward, Payment, PaymentRequest,
    PaymentSummary, ReorgReport, RoundPayment, RoundRecord, TokenEvent,
};
use crate::error::LedgerResult;
use crate::ports::outbound::FinalizationPolicy;
use shared_types::{Address, Amount, BlockHeader, BlockNumber, ChainBlock, Hash, RoundId};

/// Primary API of the reward ledger.
///
/// All mutating calls are atomic: on error nothing was written.
pub trait RewardLedgerApi: Send + Sync {
    // ---------------------------------------------------------------------
    // Block cursor
    // ---------------------------------------------------------------------

    /// Classify a header; record it when accepted.
    fn observe_block(&self, header: BlockHeader) -> LedgerResult<ObserveOutcome>;

    /// Classify a block; when accepted, record it together with its events
    /// and credits in one atomic write.
    fn ingest_block(&self, block: ChainBlock) -> LedgerResult<ObserveOutcome>;

    /// Roll back `[diverging_at, tip]` and apply `replacements` atomically.
    fn apply_reorg(
        &self,
        diverging_at: BlockNumber,
        replacements: Vec<ChainBlock>,
    ) -> LedgerResult<ReorgReport>;

    /// Roll back `[diverging_at, tip]`.
    fn rollback_to(&self, diverging_at: BlockNumber) -> LedgerResult<ReorgReport>;

    /// Highest observed block.
    fn last_observed(&self) -> Option<BlockHeader>;

    // ---------------------------------------------------------------------
    // Event ledger and balances
    // ---------------------------------------------------------------------

    /// Append one event to an already observed block.
    fn append_event(&self, event: TokenEvent) -> LedgerResult<()>;

    /// Current balance; zero for unknown pairs.
    fn balance_of(&self, token: &Address, holder: &Address) -> Amount;

    /// Balance re-summed from the stored events.
    fn recompute_balance(&self, token: &Address, holder: &Address) -> LedgerResult<Amount>;

    /// Non-zero balances of a token.
    fn holders_of(&self, token: &Address) -> Vec<(Address, Amount)>;

    /// Sum of the positive balances of a token.
    fn total_supply(&self, token: &Address) -> LedgerResult<Amount>;

    // ---------------------------------------------------------------------
    // Reward accrual and maturation
    // ---------------------------------------------------------------------

    /// Record an immature credit for an already observed block.
    fn credit(
        &self,
        block_number: BlockNumber,
        round: &RoundId,
        holder: &Address,
        amount: Amount,
    ) -> LedgerResult<()>;

    /// Immature total for a round that has not matured; zero otherwise.
    fn summary_of(&self, round: &RoundId, holder: &Address) -> Amount;

    fn immature_summaries(&self, round: &RoundId) -> Vec<ImmatureMiningRewardSummary>;

    fn round(&self, round: &RoundId) -> Option<RoundRecord>;

    fn rounds(&self) -> Vec<RoundRecord>;

    /// `None` until the round receives its first credit.
    fn round_state(&self, round: &RoundId) -> Option<RoundState>;

    /// Mature a round. Finalizing a matured round returns its existing rows.
    fn finalize(&self, round: &RoundId) -> LedgerResult<Vec<MatureMiningReward>>;

    /// Finalize every open round the policy approves.
    fn finalize_ready(&self, policy: &dyn FinalizationPolicy) -> LedgerResult<Vec<RoundId>>;

    fn mature_reward_of(&self, round: &RoundId, holder: &Address) -> Amount;

    fn mature_rewards(&self, round: &RoundId) -> Vec<MatureMiningReward>;

    // ---------------------------------------------------------------------
    // Payment reconciliation
    // ---------------------------------------------------------------------

    /// Authorize a payment charged entirely against one round.
    fn authorize(&self, round: &RoundId, holder: &Address, amount: Amount) -> LedgerResult<Payment>;

    /// Authorize a payment allocated across one or more rounds.
    fn authorize_payment(&self, request: PaymentRequest) -> LedgerResult<Payment>;

    /// Attach the broadcast transaction hash to a payment.
    fn record_broadcast(&self, payment_id: u64, transaction_hash: Hash) -> LedgerResult<Payment>;

    /// Confirm a broadcast payment.
    fn settle_payment(&self, payment_id: u64) -> LedgerResult<Payment>;

    /// Fail a payment and release its allocations.
    fn fail_payment(&self, payment_id: u64) -> LedgerResult<Payment>;

    /// Authorized payments without a transaction hash, in nonce order.
    fn pending_broadcasts(&self) -> Vec<Payment>;

    /// Broadcast payments awaiting a receipt, in nonce order.
    fn unconfirmed_payments(&self) -> Vec<Payment>;

    /// Holders of a matured round with a positive unpaid remainder.
    fn unpaid_rewards(&self, round: &RoundId) -> Vec<Entitlement>;

    fn entitlement(&self, round: &RoundId, holder: &Address) -> Entitlement;

    fn payment(&self, payment_id: u64) -> Option<Payment>;

    fn payments_of(&self, holder: &Address) -> Vec<Payment>;

    fn round_payments(&self, payment_id: u64) -> Vec<RoundPayment>;

    fn payment_summary(&self, holder: &Address) -> LedgerResult<PaymentSummary>;
}
