//! # Reward Ledger Service
//!
//! The main service implementing `RewardLedgerApi`.
//!
//! ## Architecture
//!
//! This service:
//! 1. Holds the committed aggregates behind one `RwLock`
//! 2. Stages every mutation into a single store batch before touching them
//! 3. Rebuilds its state from the store on open and completes any round
//!    left in `Finalizing`
//! 4. Uses dependency injection for all external dependencies

mod ingest;
mod rewards;
mod settlement;
mod staging;
mod state;

use crate::adapters::{BincodeCodec, InMemoryKVStore, NoCanonicalChain, SystemTimeSource};
use crate::domain::cursor::ObserveOutcome;
use crate::domain::entities::{
    Entitlement, ImmatureMiningRewardSummary, MatureMiningReward, Payment, PaymentRequest,
    PaymentSummary, ReorgReport, RoundPayment, RoundRecord, TokenEvent,
};
use crate::domain::{LedgerConfig, RoundState};
use crate::error::LedgerResult;
use crate::ports::inbound::RewardLedgerApi;
use crate::ports::outbound::{ChainReader, FinalizationPolicy, KeyValueStore, RecordCodec, TimeSource};
use parking_lot::RwLock;
use shared_types::{Address, Amount, BlockHeader, BlockNumber, ChainBlock, Hash, RoundId};
use state::LedgerState;
use tracing::{info, warn};

/// The Reward Ledger Service.
pub struct LedgerService<S, R, T, C>
where
    S: KeyValueStore,
    R: ChainReader,
    T: TimeSource,
    C: RecordCodec,
{
    /// Store, codec and every aggregate derived from the store.
    pub(crate) state: RwLock<LedgerState<S, C>>,
    /// Canonical chain lookup for locating reorg ancestors.
    pub(crate) chain: R,
    /// Clock for payment timestamps.
    pub(crate) clock: T,
    pub(crate) config: LedgerConfig,
}

/// Dependencies for LedgerService
pub struct LedgerDependencies<S, R, T, C> {
    pub store: S,
    pub chain: R,
    pub clock: T,
    pub codec: C,
}

/// Ledger over an in-memory store, used by tests and tooling.
pub type InMemoryLedger =
    LedgerService<InMemoryKVStore, NoCanonicalChain, SystemTimeSource, BincodeCodec>;

impl InMemoryLedger {
    pub fn in_memory(config: LedgerConfig) -> LedgerResult<Self> {
        Self::open(
            LedgerDependencies {
                store: InMemoryKVStore::new(),
                chain: NoCanonicalChain,
                clock: SystemTimeSource,
                codec: BincodeCodec,
            },
            config,
        )
    }
}

impl<S, R, T, C> LedgerService<S, R, T, C>
where
    S: KeyValueStore,
    R: ChainReader,
    T: TimeSource,
    C: RecordCodec,
{
    /// Open the ledger over the given dependencies.
    ///
    /// On open, this will:
    /// 1. Rebuild cursor, balances, summaries and settlement from the store
    /// 2. Complete the maturation of any round found in `Finalizing`
    pub fn open(deps: LedgerDependencies<S, R, T, C>, config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let state = LedgerState::load(deps.store, deps.codec, &config)?;
        let service = Self {
            state: RwLock::new(state),
            chain: deps.chain,
            clock: deps.clock,
            config,
        };
        service.recover()?;
        Ok(service)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn recover(&self) -> LedgerResult<()> {
        let mut state = self.state.write();
        let interrupted: Vec<RoundId> = state
            .rounds
            .values()
            .filter(|r| r.state == RoundState::Finalizing)
            .map(|r| r.mining_round.clone())
            .collect();

        for round in interrupted {
            warn!(round = %round, "[ledger] 🔄 resuming interrupted maturation");
            let rows = Self::finalize_locked(&mut state, &round)?;
            info!(round = %round, holders = rows.len(), "[ledger] ✅ maturation recovered");
        }
        Ok(())
    }
}

impl<S, R, T, C> RewardLedgerApi for LedgerService<S, R, T, C>
where
    S: KeyValueStore,
    R: ChainReader,
    T: TimeSource,
    C: RecordCodec,
{
    fn observe_block(&self, header: BlockHeader) -> LedgerResult<ObserveOutcome> {
        LedgerService::observe_block(self, header)
    }

    fn ingest_block(&self, block: ChainBlock) -> LedgerResult<ObserveOutcome> {
        LedgerService::ingest_block(self, block)
    }

    fn apply_reorg(
        &self,
        diverging_at: BlockNumber,
        replacements: Vec<ChainBlock>,
    ) -> LedgerResult<ReorgReport> {
        LedgerService::apply_reorg(self, diverging_at, replacements)
    }

    fn rollback_to(&self, diverging_at: BlockNumber) -> LedgerResult<ReorgReport> {
        LedgerService::rollback_to(self, diverging_at)
    }

    fn last_observed(&self) -> Option<BlockHeader> {
        LedgerService::last_observed(self)
    }

    fn append_event(&self, event: TokenEvent) -> LedgerResult<()> {
        LedgerService::append_event(self, event)
    }

    fn balance_of(&self, token: &Address, holder: &Address) -> Amount {
        LedgerService::balance_of(self, token, holder)
    }

    fn recompute_balance(&self, token: &Address, holder: &Address) -> LedgerResult<Amount> {
        LedgerService::recompute_balance(self, token, holder)
    }

    fn holders_of(&self, token: &Address) -> Vec<(Address, Amount)> {
        LedgerService::holders_of(self, token)
    }

    fn total_supply(&self, token: &Address) -> LedgerResult<Amount> {
        LedgerService::total_supply(self, token)
    }

    fn credit(
        &self,
        block_number: BlockNumber,
        round: &RoundId,
        holder: &Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        LedgerService::credit(self, block_number, round, holder, amount)
    }

    fn summary_of(&self, round: &RoundId, holder: &Address) -> Amount {
        LedgerService::summary_of(self, round, holder)
    }

    fn immature_summaries(&self, round: &RoundId) -> Vec<ImmatureMiningRewardSummary> {
        LedgerService::immature_summaries(self, round)
    }

    fn round(&self, round: &RoundId) -> Option<RoundRecord> {
        LedgerService::round(self, round)
    }

    fn rounds(&self) -> Vec<RoundRecord> {
        LedgerService::rounds(self)
    }

    fn round_state(&self, round: &RoundId) -> Option<RoundState> {
        LedgerService::round_state(self, round)
    }

    fn finalize(&self, round: &RoundId) -> LedgerResult<Vec<MatureMiningReward>> {
        LedgerService::finalize(self, round)
    }

    fn finalize_ready(&self, policy: &dyn FinalizationPolicy) -> LedgerResult<Vec<RoundId>> {
        LedgerService::finalize_ready(self, policy)
    }

    fn mature_reward_of(&self, round: &RoundId, holder: &Address) -> Amount {
        LedgerService::mature_reward_of(self, round, holder)
    }

    fn mature_rewards(&self, round: &RoundId) -> Vec<MatureMiningReward> {
        LedgerService::mature_rewards(self, round)
    }

    fn authorize(&self, round: &RoundId, holder: &Address, amount: Amount) -> LedgerResult<Payment> {
        LedgerService::authorize(self, round, holder, amount)
    }

    fn authorize_payment(&self, request: PaymentRequest) -> LedgerResult<Payment> {
        LedgerService::authorize_payment(self, request)
    }

    fn record_broadcast(&self, payment_id: u64, transaction_hash: Hash) -> LedgerResult<Payment> {
        LedgerService::record_broadcast(self, payment_id, transaction_hash)
    }

    fn settle_payment(&self, payment_id: u64) -> LedgerResult<Payment> {
        LedgerService::settle_payment(self, payment_id)
    }

    fn fail_payment(&self, payment_id: u64) -> LedgerResult<Payment> {
        LedgerService::fail_payment(self, payment_id)
    }

    fn pending_broadcasts(&self) -> Vec<Payment> {
        LedgerService::pending_broadcasts(self)
    }

    fn unconfirmed_payments(&self) -> Vec<Payment> {
        LedgerService::unconfirmed_payments(self)
    }

    fn unpaid_rewards(&self, round: &RoundId) -> Vec<Entitlement> {
        LedgerService::unpaid_rewards(self, round)
    }

    fn entitlement(&self, round: &RoundId, holder: &Address) -> Entitlement {
        LedgerService::entitlement(self, round, holder)
    }

    fn payment(&self, payment_id: u64) -> Option<Payment> {
        LedgerService::payment(self, payment_id)
    }

    fn payments_of(&self, holder: &Address) -> Vec<Payment> {
        LedgerService::payments_of(self, holder)
    }

    fn round_payments(&self, payment_id: u64) -> Vec<RoundPayment> {
        LedgerService::round_payments(self, payment_id)
    }

    fn payment_summary(&self, holder: &Address) -> LedgerResult<PaymentSummary> {
        LedgerService::payment_summary(self, holder)
    }
}
