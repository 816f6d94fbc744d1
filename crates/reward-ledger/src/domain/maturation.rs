//! Reward maturation state machine
//!
//! State progression: Open → Finalizing → Matured. `Finalizing` is persisted
//! before any mature row is written, so a restart that finds it knows the
//! maturation must be completed.

use super::entities::{MatureMiningReward, RoundRecord};
use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, BlockNumber, RoundId};
use std::collections::HashMap;
use std::fmt;

/// Mining round lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub enum RoundState {
    /// Accepting immature credits
    #[default]
    Open,
    /// Maturation started, mature rows not yet committed
    Finalizing,
    /// Mature rows committed; immutable
    Matured,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundState::Open => "open",
            RoundState::Finalizing => "finalizing",
            RoundState::Matured => "matured",
        };
        f.write_str(label)
    }
}

impl RoundRecord {
    /// Record opened by the first credit of a round.
    pub fn open(mining_round: RoundId, block_number: BlockNumber) -> Self {
        Self {
            mining_round,
            state: RoundState::Open,
            opened_at_block: block_number,
            matured_at_block: None,
        }
    }

    pub fn accepts_credits(&self) -> bool {
        self.state == RoundState::Open
    }

    pub fn is_matured(&self) -> bool {
        self.state == RoundState::Matured
    }

    /// Open → Finalizing. Idempotent for a round already finalizing.
    pub fn begin_finalizing(&self) -> LedgerResult<RoundRecord> {
        match self.state {
            RoundState::Open | RoundState::Finalizing => Ok(RoundRecord {
                state: RoundState::Finalizing,
                ..self.clone()
            }),
            RoundState::Matured => Err(LedgerError::RoundAlreadyMatured {
                round: self.mining_round.clone(),
                state: self.state,
            }),
        }
    }

    /// Finalizing → Matured.
    pub fn complete(&self, tip: Option<BlockNumber>) -> LedgerResult<RoundRecord> {
        if self.state != RoundState::Finalizing {
            return Err(LedgerError::InconsistentState {
                reason: format!(
                    "round {} cannot mature from state {}",
                    self.mining_round, self.state
                ),
            });
        }
        Ok(RoundRecord {
            state: RoundState::Matured,
            matured_at_block: tip,
            ..self.clone()
        })
    }
}

/// Mature rows for a round: one per holder with a non-zero immature summary,
/// ordered by holder.
pub fn mature_rows(
    round: &RoundId,
    summaries: &HashMap<Address, Amount>,
) -> Vec<MatureMiningReward> {
    let mut rows: Vec<MatureMiningReward> = summaries
        .iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(holder, amount)| MatureMiningReward {
            mining_round: round.clone(),
            holder: *holder,
            mcb_balance: *amount,
        })
        .collect();
    rows.sort_by(|a, b| a.holder.cmp(&b.holder));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> RoundId {
        RoundId::new("round-1").unwrap()
    }

    #[test]
    fn test_state_ordering() {
        assert!(RoundState::Open < RoundState::Finalizing);
        assert!(RoundState::Finalizing < RoundState::Matured);
    }

    #[test]
    fn test_transitions() {
        let open = RoundRecord::open(round(), 10);
        assert!(open.accepts_credits());

        let finalizing = open.begin_finalizing().unwrap();
        assert_eq!(finalizing.state, RoundState::Finalizing);
        assert!(!finalizing.accepts_credits());

        // Re-entering finalizing is how recovery resumes
        assert!(finalizing.begin_finalizing().is_ok());

        let matured = finalizing.complete(Some(42)).unwrap();
        assert!(matured.is_matured());
        assert_eq!(matured.matured_at_block, Some(42));
        assert_eq!(matured.opened_at_block, 10);
    }

    #[test]
    fn test_matured_round_cannot_restart() {
        let matured = RoundRecord::open(round(), 1)
            .begin_finalizing()
            .and_then(|r| r.complete(None))
            .unwrap();
        assert!(matches!(
            matured.begin_finalizing(),
            Err(LedgerError::RoundAlreadyMatured { .. })
        ));
    }

    #[test]
    fn test_open_round_cannot_skip_finalizing() {
        let open = RoundRecord::open(round(), 1);
        assert!(matches!(
            open.complete(None),
            Err(LedgerError::InconsistentState { .. })
        ));
    }

    #[test]
    fn test_mature_rows_skip_zero_and_sort() {
        let mut summaries = HashMap::new();
        summaries.insert([3u8; 20], Amount::from_whole(5));
        summaries.insert([1u8; 20], Amount::from_whole(7));
        summaries.insert([2u8; 20], Amount::ZERO);

        let rows = mature_rows(&round(), &summaries);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].holder, [1u8; 20]);
        assert_eq!(rows[0].mcb_balance, Amount::from_whole(7));
        assert_eq!(rows[1].holder, [3u8; 20]);
    }
}
