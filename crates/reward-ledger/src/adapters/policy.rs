//! Finalization policies.

use crate::domain::entities::RoundRecord;
use crate::ports::outbound::FinalizationPolicy;
use parking_lot::RwLock;
use shared_types::{BlockNumber, RoundId};
use std::collections::{HashMap, HashSet};

/// Finalize a round once its last crediting block is buried under
/// `confirmations` blocks.
///
/// Only rounds with a registered end block are considered; round boundaries
/// are configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationDepthPolicy {
    windows: HashMap<RoundId, (BlockNumber, u64)>,
}

impl ConfirmationDepthPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a round ending at `end_block` that needs `confirmations`
    /// blocks on top before maturing.
    pub fn with_round(mut self, round: RoundId, end_block: BlockNumber, confirmations: u64) -> Self {
        self.windows.insert(round, (end_block, confirmations));
        self
    }
}

impl FinalizationPolicy for ConfirmationDepthPolicy {
    fn should_finalize(&self, round: &RoundRecord, tip: Option<BlockNumber>) -> bool {
        let (Some(&(end_block, confirmations)), Some(tip)) =
            (self.windows.get(&round.mining_round), tip)
        else {
            return false;
        };
        tip >= end_block.saturating_add(confirmations)
    }
}

/// Operator-driven finalization: only explicitly approved rounds mature.
#[derive(Debug, Default)]
pub struct ManualFinalization {
    approved: RwLock<HashSet<RoundId>>,
}

impl ManualFinalization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approve(&self, round: RoundId) {
        self.approved.write().insert(round);
    }
}

impl FinalizationPolicy for ManualFinalization {
    fn should_finalize(&self, round: &RoundRecord, _tip: Option<BlockNumber>) -> bool {
        self.approved.read().contains(&round.mining_round)
    }
}
