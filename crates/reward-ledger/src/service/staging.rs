//! Write staging
//!
//! A mutation is first staged against an overlay of the committed state:
//! store writes are collected into one batch and aggregate changes into
//! deltas. Nothing is visible until `LedgerState::commit_staged` succeeds.

use super::state::LedgerState;
use crate::domain::accrual::validate_credit;
use crate::domain::entities::{ImmatureMiningReward, RoundRecord, TokenEvent};
use crate::domain::share_mining::share_credits;
use crate::domain::{KeyPrefix, LedgerConfig};
use crate::error::{LedgerError, LedgerResult, RecordKey};
use crate::ports::outbound::{BatchOperation, KeyValueStore, RecordCodec};
use serde::Serialize;
use shared_types::{
    Address, Amount, AmountError, BlockHeader, BlockNumber, ChainBlock, PoolName, RoundId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error, warn};

/// Owned result of a staging pass, ready to commit.
pub(crate) struct StagedChanges {
    pub ops: Vec<BatchOperation>,
    pub balance_delta: HashMap<(Address, Address), Amount>,
    pub summary_delta: HashMap<(RoundId, Address), Amount>,
    pub opened_rounds: BTreeMap<RoundId, RoundRecord>,
    pub truncate_from: Option<BlockNumber>,
    pub accepted: Vec<BlockHeader>,
}

/// Row counts removed by a staged rollback.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RollbackCounts {
    pub blocks: u64,
    pub events: usize,
    pub credits: usize,
}

pub(crate) struct Staging<'a, S, C> {
    state: &'a LedgerState<S, C>,
    config: &'a LedgerConfig,
    ops: Vec<BatchOperation>,
    written: HashSet<Vec<u8>>,
    deleted: HashSet<Vec<u8>>,
    balance_delta: HashMap<(Address, Address), Amount>,
    summary_delta: HashMap<(RoundId, Address), Amount>,
    opened_rounds: BTreeMap<RoundId, RoundRecord>,
    truncate_from: Option<BlockNumber>,
    accepted: Vec<BlockHeader>,
}

impl<'a, S: KeyValueStore, C: RecordCodec> Staging<'a, S, C> {
    pub fn new(state: &'a LedgerState<S, C>, config: &'a LedgerConfig) -> Self {
        Self {
            state,
            config,
            ops: Vec::new(),
            written: HashSet::new(),
            deleted: HashSet::new(),
            balance_delta: HashMap::new(),
            summary_delta: HashMap::new(),
            opened_rounds: BTreeMap::new(),
            truncate_from: None,
            accepted: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Overlay reads
    // -------------------------------------------------------------------------

    fn key_exists(&self, key: &[u8]) -> LedgerResult<bool> {
        if self.written.contains(key) {
            return Ok(true);
        }
        if self.deleted.contains(key) {
            return Ok(false);
        }
        Ok(self.state.store.exists(key)?)
    }

    fn balance(&self, token: &Address, holder: &Address) -> Result<Amount, AmountError> {
        let committed = self.state.balances.balance_of(token, holder);
        match self.balance_delta.get(&(*token, *holder)) {
            Some(delta) => committed.checked_add(*delta).ok_or(AmountError::Overflow),
            None => Ok(committed),
        }
    }

    fn holders(&self, token: &Address) -> Result<Vec<(Address, Amount)>, AmountError> {
        let mut holders: BTreeMap<Address, Amount> =
            self.state.balances.holders(token).into_iter().collect();
        for ((t, holder), delta) in &self.balance_delta {
            if t != token {
                continue;
            }
            let entry = holders.entry(*holder).or_insert(Amount::ZERO);
            *entry = entry.checked_add(*delta).ok_or(AmountError::Overflow)?;
        }
        Ok(holders.into_iter().filter(|(_, b)| !b.is_zero()).collect())
    }

    fn round_record(&self, round: &RoundId) -> Option<&RoundRecord> {
        self.opened_rounds
            .get(round)
            .or_else(|| self.state.rounds.get(round))
    }

    // -------------------------------------------------------------------------
    // Overlay writes
    // -------------------------------------------------------------------------

    fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> LedgerResult<()> {
        let bytes = self.state.encode(value)?;
        self.deleted.remove(&key);
        self.written.insert(key.clone());
        self.ops.push(BatchOperation::put(key, bytes));
        Ok(())
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.written.remove(&key);
        self.deleted.insert(key.clone());
        self.ops.push(BatchOperation::delete(key));
    }

    fn add_balance(&mut self, token: Address, holder: Address, amount: Amount) -> LedgerResult<()> {
        // Validates the resulting balance, not just the delta
        self.balance(&token, &holder)?
            .checked_add(amount)
            .ok_or(AmountError::Overflow)?;
        let delta = self.balance_delta.entry((token, holder)).or_insert(Amount::ZERO);
        *delta = delta.checked_add(amount).ok_or(AmountError::Overflow)?;
        Ok(())
    }

    fn add_summary(&mut self, round: RoundId, holder: Address, amount: Amount) -> LedgerResult<()> {
        let delta = self.summary_delta.entry((round, holder)).or_insert(Amount::ZERO);
        *delta = delta.checked_add(amount).ok_or(AmountError::Overflow)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    pub fn stage_event(&mut self, event: TokenEvent) -> LedgerResult<()> {
        let key = KeyPrefix::event_key(&event);
        if self.key_exists(&key)? {
            warn!(block = event.block_number, "[ledger] duplicate token event rejected");
            return Err(LedgerError::DuplicateKey {
                key: RecordKey::TokenEvent {
                    block_number: event.block_number,
                    transaction_hash: event.transaction_hash,
                    event_index: event.event_index,
                    token: event.token,
                    holder: event.holder,
                },
            });
        }

        self.add_balance(event.token, event.holder, event.amount)?;
        self.put(KeyPrefix::holder_event_key(&event), &event.amount)?;
        self.put(key, &event)?;
        debug!(
            block = event.block_number,
            index = event.event_index,
            amount = %event.amount,
            "[ledger] staged token event"
        );
        Ok(())
    }

    pub fn stage_credit(
        &mut self,
        block_number: BlockNumber,
        round: RoundId,
        pool: PoolName,
        holder: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        validate_credit(amount)?;

        match self.round_record(&round) {
            Some(record) if !record.accepts_credits() => {
                let state = record.state;
                error!(
                    round = %round,
                    block = block_number,
                    %state,
                    "[ledger] ❌ credit rejected, round no longer accepts credits"
                );
                return Err(LedgerError::RoundAlreadyMatured { round, state });
            }
            Some(_) => {}
            None => {
                let record = RoundRecord::open(round.clone(), block_number);
                self.put(KeyPrefix::round_key(&round), &record)?;
                self.opened_rounds.insert(round.clone(), record);
            }
        }

        let key = KeyPrefix::credit_key(block_number, &round, &pool, &holder);
        if self.key_exists(&key)? {
            return Err(LedgerError::DuplicateKey {
                key: RecordKey::RewardCredit {
                    block_number,
                    round,
                    pool,
                    holder,
                },
            });
        }

        let row = ImmatureMiningReward {
            block_number,
            mining_round: round.clone(),
            pool_name: pool,
            holder,
            mcb_balance: amount,
        };
        self.put(key, &row)?;
        self.add_summary(round, holder, amount)
    }

    /// Stage a whole block: header, token events, share mining credits
    /// derived from the post-event balances, then external credits.
    pub fn stage_block(&mut self, block: &ChainBlock) -> LedgerResult<()> {
        let header = block.header();
        self.put(KeyPrefix::block_key(block.number), &header)?;
        self.accepted.push(header);

        for delta in &block.events {
            self.stage_event(TokenEvent::from_delta(block.number, delta))?;
        }

        let config = self.config;
        for schedule in config.share_mining.iter().filter(|s| s.covers(block.number)) {
            if let Some(record) = self.round_record(&schedule.round) {
                if !record.accepts_credits() {
                    warn!(
                        round = %schedule.round,
                        block = block.number,
                        "[ledger] share mining skipped, round already {}",
                        record.state
                    );
                    continue;
                }
            }
            let balances = self.holders(&schedule.token)?;
            for (holder, amount) in share_credits(schedule, block.number, &balances)? {
                self.stage_credit(
                    block.number,
                    schedule.round.clone(),
                    schedule.pool.clone(),
                    holder,
                    amount,
                )?;
            }
        }

        for credit in &block.credits {
            self.stage_credit(
                block.number,
                credit.round.clone(),
                credit.pool.clone(),
                credit.holder,
                credit.amount,
            )?;
        }
        Ok(())
    }

    /// Stage removal of every block in `[from, to]` with its events and
    /// credits.
    pub fn stage_rollback(&mut self, from: BlockNumber, to: BlockNumber) -> LedgerResult<RollbackCounts> {
        let mut counts = RollbackCounts::default();

        for number in from..=to {
            let events: Vec<TokenEvent> = self.state.scan(&KeyPrefix::event_block_prefix(number))?;
            for event in events {
                let negated = event.amount.checked_neg().ok_or(AmountError::Overflow)?;
                self.add_balance(event.token, event.holder, negated)?;
                self.delete(KeyPrefix::holder_event_key(&event));
                self.delete(KeyPrefix::event_key(&event));
                counts.events += 1;
            }

            let credits: Vec<ImmatureMiningReward> =
                self.state.scan(&KeyPrefix::credit_block_prefix(number))?;
            for credit in credits {
                if let Some(record) = self.round_record(&credit.mining_round) {
                    if !record.accepts_credits() {
                        return Err(LedgerError::ReorgIntoMaturedRound {
                            round: credit.mining_round,
                            block: number,
                            state: record.state,
                        });
                    }
                }
                let negated = credit.mcb_balance.checked_neg().ok_or(AmountError::Overflow)?;
                self.delete(KeyPrefix::credit_key(
                    number,
                    &credit.mining_round,
                    &credit.pool_name,
                    &credit.holder,
                ));
                self.add_summary(credit.mining_round, credit.holder, negated)?;
                counts.credits += 1;
            }

            if self.state.cursor.contains(number) {
                self.delete(KeyPrefix::block_key(number));
                counts.blocks += 1;
            }
        }

        self.truncate_from = Some(from);
        Ok(counts)
    }

    /// Close the staging pass, adding deletes for headers that fall out of
    /// the retained window.
    pub fn finish(mut self) -> StagedChanges {
        if let Some(new_tip) = self.accepted.last().map(|h| h.number) {
            let floor = new_tip.saturating_sub(self.state.cursor.window());
            let kept_below = self.truncate_from.unwrap_or(BlockNumber::MAX);
            let mut stale: Vec<BlockNumber> = self
                .state
                .cursor
                .heights_pruned_at(new_tip)
                .into_iter()
                .filter(|n| *n < kept_below)
                .collect();
            stale.extend(self.accepted.iter().map(|h| h.number).filter(|n| *n < floor));
            for number in stale {
                self.delete(KeyPrefix::block_key(number));
            }
        }

        StagedChanges {
            ops: self.ops,
            balance_delta: self.balance_delta,
            summary_delta: self.summary_delta,
            opened_rounds: self.opened_rounds,
            truncate_from: self.truncate_from,
            accepted: self.accepted,
        }
    }
}
