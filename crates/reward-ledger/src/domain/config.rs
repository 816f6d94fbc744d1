//! # Ledger Configuration
//!
//! Mining round boundaries and reward schedules are inputs to the ledger, not
//! properties of it; everything here comes from the host.

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use shared_types::{hex_bytes, Address, Amount, BlockNumber, PoolName, RoundId};
use std::collections::HashSet;

/// Configuration for the ledger engine.
///
/// All configuration values have sensible defaults.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Deepest reorganization that may be rolled back (default: 128 blocks).
    ///
    /// The cursor retains this many headers plus one.
    pub max_reorg_depth: u64,

    /// First nonce handed out when the ledger assigns nonces (default: 0).
    pub initial_nonce: u64,

    /// Rounds whose credits are derived from token balances, one schedule
    /// per (round, pool).
    pub share_mining: Vec<ShareMiningSchedule>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_reorg_depth: 128,
            initial_nonce: 0,
            share_mining: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum reorganization depth.
    pub fn with_max_reorg_depth(mut self, depth: u64) -> Self {
        self.max_reorg_depth = depth;
        self
    }

    /// Set the first nonce assigned by the ledger.
    pub fn with_initial_nonce(mut self, nonce: u64) -> Self {
        self.initial_nonce = nonce;
        self
    }

    /// Add a share mining schedule.
    pub fn with_share_mining(mut self, schedule: ShareMiningSchedule) -> Self {
        self.share_mining.push(schedule);
        self
    }

    /// Every (round, pool) has at most one schedule, and schedules never use
    /// the pool reserved for feed credits.
    pub fn validate(&self) -> LedgerResult<()> {
        let mut seen = HashSet::new();
        for schedule in &self.share_mining {
            if schedule.pool.is_external() {
                return Err(invalid(format!(
                    "share mining schedule of round {} uses the reserved pool {}",
                    schedule.round,
                    PoolName::EXTERNAL
                )));
            }
            if !seen.insert((&schedule.round, &schedule.pool)) {
                return Err(invalid(format!(
                    "round {} has more than one schedule for pool {}",
                    schedule.round, schedule.pool
                )));
            }
            if schedule.begin_block > schedule.end_block {
                return Err(invalid(format!(
                    "share mining schedule of round {} begins after it ends",
                    schedule.round
                )));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> LedgerError {
    LedgerError::InvalidConfig { reason }
}

/// Share mining: every block in `[begin_block, end_block]` distributes
/// `reward_per_block` to the holders of `token` pro rata to their balances.
///
/// A round paying several pools has one schedule per pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMiningSchedule {
    pub round: RoundId,
    pub pool: PoolName,
    #[serde(with = "hex_bytes")]
    pub token: Address,
    pub begin_block: BlockNumber,
    pub end_block: BlockNumber,
    pub reward_per_block: Amount,
}

impl ShareMiningSchedule {
    pub fn covers(&self, number: BlockNumber) -> bool {
        (self.begin_block..=self.end_block).contains(&number)
    }
}
