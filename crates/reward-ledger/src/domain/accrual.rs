//! Reward accrual
//!
//! Per-round immature summaries derived from `ImmatureMiningReward` rows.
//! A round leaves this book once it matures.

use super::entities::ImmatureMiningRewardSummary;
use crate::error::{LedgerError, LedgerResult};
use shared_types::{Address, Amount, AmountError, RoundId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AccrualBook {
    summaries: HashMap<RoundId, HashMap<Address, Amount>>,
}

impl AccrualBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary_of(&self, round: &RoundId, holder: &Address) -> Amount {
        self.summaries
            .get(round)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn apply_delta(
        &mut self,
        round: &RoundId,
        holder: &Address,
        delta: Amount,
    ) -> Result<Amount, AmountError> {
        let next = self
            .summary_of(round, holder)
            .checked_add(delta)
            .ok_or(AmountError::Overflow)?;

        let holders = self.summaries.entry(round.clone()).or_default();
        if next.is_zero() {
            holders.remove(holder);
        } else {
            holders.insert(*holder, next);
        }
        Ok(next)
    }

    /// Summaries of one round as a holder map.
    pub fn round(&self, round: &RoundId) -> HashMap<Address, Amount> {
        self.summaries.get(round).cloned().unwrap_or_default()
    }

    /// Summaries of one round, ordered by holder.
    pub fn summaries(&self, round: &RoundId) -> Vec<ImmatureMiningRewardSummary> {
        let mut rows: Vec<ImmatureMiningRewardSummary> = self
            .summaries
            .get(round)
            .map(|holders| {
                holders
                    .iter()
                    .map(|(holder, amount)| ImmatureMiningRewardSummary {
                        mining_round: round.clone(),
                        holder: *holder,
                        mcb_balance: *amount,
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.holder.cmp(&b.holder));
        rows
    }

    /// Drop a matured round.
    pub fn remove_round(&mut self, round: &RoundId) {
        self.summaries.remove(round);
    }
}

/// Credits must be strictly positive.
pub fn validate_credit(amount: Amount) -> LedgerResult<()> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount {
            reason: format!("reward credit must be positive, got {amount}"),
        });
    }
    Ok(())
}
