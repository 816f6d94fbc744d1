//! Reward accrual and maturation.

use super::staging::Staging;
use super::state::LedgerState;
use super::LedgerService;
use crate::domain::entities::{ImmatureMiningRewardSummary, MatureMiningReward, RoundRecord};
use crate::domain::maturation::mature_rows;
use crate::domain::{KeyPrefix, RoundState};
use crate::error::{LedgerError, LedgerResult};
use crate::ports::outbound::{ChainReader, FinalizationPolicy, KeyValueStore, RecordCodec, TimeSource};
use shared_types::{Address, Amount, BlockNumber, PoolName, RoundId};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl<S, R, T, C> LedgerService<S, R, T, C>
where
    S: KeyValueStore,
    R: ChainReader,
    T: TimeSource,
    C: RecordCodec,
{
    /// Record an immature credit against an observed block, in the external
    /// pool.
    pub fn credit(
        &self,
        block_number: BlockNumber,
        round: &RoundId,
        holder: &Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        let mut state = self.state.write();
        if !state.cursor.contains(block_number) {
            return Err(LedgerError::UnknownBlock {
                number: block_number,
            });
        }

        let changes = {
            let mut staging = Staging::new(&state, &self.config);
            staging.stage_credit(block_number, round.clone(), PoolName::external(), *holder, amount)?;
            staging.finish()
        };
        state.commit_staged(changes)?;
        debug!(round = %round, block = block_number, %amount, "[ledger] credit recorded");
        Ok(())
    }

    pub fn summary_of(&self, round: &RoundId, holder: &Address) -> Amount {
        self.state.read().accrual.summary_of(round, holder)
    }

    pub fn immature_summaries(&self, round: &RoundId) -> Vec<ImmatureMiningRewardSummary> {
        self.state.read().accrual.summaries(round)
    }

    pub fn round(&self, round: &RoundId) -> Option<RoundRecord> {
        self.state.read().rounds.get(round).cloned()
    }

    pub fn rounds(&self) -> Vec<RoundRecord> {
        self.state.read().rounds.values().cloned().collect()
    }

    pub fn round_state(&self, round: &RoundId) -> Option<RoundState> {
        self.state.read().rounds.get(round).map(|r| r.state)
    }

    /// Mature a round from its immature summaries.
    ///
    /// Finalizing an already matured round returns the stored rows and
    /// writes nothing.
    pub fn finalize(&self, round: &RoundId) -> LedgerResult<Vec<MatureMiningReward>> {
        let mut state = self.state.write();
        Self::finalize_locked(&mut state, round)
    }

    /// Finalize every open round the policy approves, in round order.
    pub fn finalize_ready(&self, policy: &dyn FinalizationPolicy) -> LedgerResult<Vec<RoundId>> {
        let mut state = self.state.write();
        let tip = state.tip_number();
        let ready: Vec<RoundId> = state
            .rounds
            .values()
            .filter(|r| !r.is_matured() && policy.should_finalize(r, tip))
            .map(|r| r.mining_round.clone())
            .collect();

        for round in &ready {
            Self::finalize_locked(&mut state, round)?;
        }
        Ok(ready)
    }

    pub fn mature_reward_of(&self, round: &RoundId, holder: &Address) -> Amount {
        self.state.read().mature_of(round, holder)
    }

    pub fn mature_rewards(&self, round: &RoundId) -> Vec<MatureMiningReward> {
        self.state.read().mature_rows(round)
    }

    /// Two commits: the `Finalizing` marker, then every mature row together
    /// with the `Matured` record.
    pub(super) fn finalize_locked(
        state: &mut LedgerState<S, C>,
        round: &RoundId,
    ) -> LedgerResult<Vec<MatureMiningReward>> {
        let record = state
            .rounds
            .get(round)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownRound {
                round: round.clone(),
            })?;

        if record.is_matured() {
            return Ok(state.mature_rows(round));
        }

        let finalizing = if record.state == RoundState::Open {
            let finalizing = record.begin_finalizing()?;
            let op = state.put(KeyPrefix::round_key(round), &finalizing)?;
            state.store.atomic_batch_write(vec![op])?;
            state.rounds.insert(round.clone(), finalizing.clone());
            finalizing
        } else {
            record
        };

        let rows = mature_rows(round, &state.accrual.round(round));
        let matured = finalizing.complete(state.tip_number())?;

        let mut ops = Vec::with_capacity(rows.len() + 1);
        for row in &rows {
            ops.push(state.put(KeyPrefix::mature_key(round, &row.holder), row)?);
        }
        ops.push(state.put(KeyPrefix::round_key(round), &matured)?);
        state.store.atomic_batch_write(ops)?;

        let holders: BTreeMap<Address, Amount> =
            rows.iter().map(|r| (r.holder, r.mcb_balance)).collect();
        state.mature.insert(round.clone(), holders);
        state.rounds.insert(round.clone(), matured);
        state.accrual.remove_round(round);

        info!(
            round = %round,
            holders = rows.len(),
            tip = state.tip_number(),
            "[ledger] ✅ round matured"
        );
        Ok(rows)
    }
}
