//! # Ingestion Coordinator
//!
//! The single task that applies blocks. It feeds each block to the ledger
//! and resolves the cursor's reorganization signal:
//!
//! - The block sits at the first diverging height: roll back and apply it
//!   in one atomic reorg.
//! - The divergence starts below the block: roll back to the ancestor and
//!   wait for the feed to deliver the replacement blocks from there.
//!
//! Rejected blocks are logged and skipped. Storage and codec failures stop
//! the coordinator.

use crate::feed::BlockFeed;
use reward_ledger::{LedgerError, LedgerResult, ObserveOutcome, RewardLedgerApi};
use shared_types::{hash_hex, ChainBlock};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Counters over the lifetime of a coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub accepted: u64,
    pub out_of_order: u64,
    /// Reorgs resolved by applying the diverging block.
    pub reorgs: u64,
    /// Rollbacks waiting for replacement blocks.
    pub rollbacks: u64,
    /// Blocks the ledger refused (duplicate rows, bad amounts, matured rounds).
    pub rejected: u64,
    /// Feed lines that did not decode.
    pub malformed: u64,
}

pub struct IngestionCoordinator<L> {
    ledger: Arc<L>,
    stats: IngestionStats,
}

impl<L: RewardLedgerApi> IngestionCoordinator<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            stats: IngestionStats::default(),
        }
    }

    pub fn stats(&self) -> IngestionStats {
        self.stats
    }

    /// Drain `feed` until it ends or a fatal error occurs.
    pub async fn run(&mut self, mut feed: BlockFeed) -> LedgerResult<IngestionStats> {
        info!("[runtime] 📥 Ingestion coordinator started");

        while let Some(next) = feed.next_block().await {
            match next {
                Ok(block) => {
                    if let Err(e) = self.handle_block(block) {
                        if is_fatal(&e) {
                            error!("[runtime] ❌ Ingestion stopped: {}", e);
                            return Err(e);
                        }
                        self.stats.rejected += 1;
                    }
                }
                Err(e) => {
                    warn!("[runtime] ⚠️ Skipping feed line: {}", e);
                    self.stats.malformed += 1;
                }
            }
        }

        info!(
            "[runtime] 📭 Block feed ended after {} lines ({} accepted, {} reorgs)",
            feed.lines_read(),
            self.stats.accepted,
            self.stats.reorgs
        );
        Ok(self.stats)
    }

    /// Apply one block, resolving a reorg signal if the ledger raises one.
    pub fn handle_block(&mut self, block: ChainBlock) -> LedgerResult<ObserveOutcome> {
        let number = block.number;
        let hash = block.hash;

        let outcome = match self.ledger.ingest_block(block.clone()) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(block = number, "[runtime] ❌ Block {} rejected: {}", hash_hex(&hash), e);
                return Err(e);
            }
        };

        match outcome {
            ObserveOutcome::Accepted => self.stats.accepted += 1,
            ObserveOutcome::OutOfOrder { .. } => self.stats.out_of_order += 1,
            ObserveOutcome::ReorgDetected {
                diverging_at,
                last_observed,
            } if diverging_at == number => {
                let report = self.ledger.apply_reorg(diverging_at, vec![block]).map_err(|e| {
                    error!(block = number, "[runtime] ❌ Reorg at {} failed: {}", diverging_at, e);
                    e
                })?;
                info!(
                    block = number,
                    "[runtime] 🔀 Replaced blocks {}..={} ({} events, {} credits removed)",
                    diverging_at,
                    last_observed,
                    report.removed_events,
                    report.removed_credits
                );
                self.stats.reorgs += 1;
            }
            ObserveOutcome::ReorgDetected { diverging_at, .. } => {
                self.ledger.rollback_to(diverging_at).map_err(|e| {
                    error!(block = number, "[runtime] ❌ Rollback to {} failed: {}", diverging_at, e);
                    e
                })?;
                warn!(
                    block = number,
                    "[runtime] ⏪ Rolled back to {}; waiting for replacement blocks from there",
                    diverging_at
                );
                self.stats.rollbacks += 1;
            }
        }

        Ok(outcome)
    }
}

fn is_fatal(err: &LedgerError) -> bool {
    matches!(
        err,
        LedgerError::Storage(_) | LedgerError::Serialization(_) | LedgerError::InconsistentState { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_ledger::test_utils::*;
    use reward_ledger::{InMemoryLedger, LedgerConfig};
    use std::io::Cursor;

    fn make_coordinator() -> (Arc<InMemoryLedger>, IngestionCoordinator<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::in_memory(LedgerConfig::default()).unwrap());
        (ledger.clone(), IngestionCoordinator::new(ledger))
    }

    fn feed_of(blocks: &[ChainBlock]) -> BlockFeed {
        let mut text = String::new();
        for block in blocks {
            text.push_str(&serde_json::to_string(block).unwrap());
            text.push('\n');
        }
        BlockFeed::from_reader(Cursor::new(text.into_bytes()))
    }

    #[test]
    fn test_replacement_at_tip_is_applied_as_reorg() {
        let (ledger, mut coordinator) = make_coordinator();
        coordinator
            .handle_block(block(1).with_events(vec![transfer(1, 0, ALICE, whole(10))]))
            .unwrap();
        coordinator
            .handle_block(block(2).with_events(vec![transfer(2, 0, ALICE, whole(5))]))
            .unwrap();

        let outcome = coordinator
            .handle_block(fork_block(2, 1, 0).with_events(vec![transfer(20, 0, ALICE, whole(1))]))
            .unwrap();

        assert!(matches!(outcome, ObserveOutcome::ReorgDetected { diverging_at: 2, .. }));
        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), whole(11));
        assert_eq!(ledger.last_observed().unwrap().hash, block_hash(2, 1));
        assert_eq!(coordinator.stats().reorgs, 1);
    }

    #[test]
    fn test_deeper_divergence_rolls_back_and_waits() {
        let (ledger, mut coordinator) = make_coordinator();
        for n in 1..=3 {
            coordinator
                .handle_block(block(n).with_events(vec![transfer(n as u8, 0, BOB, whole(1))]))
                .unwrap();
        }

        // Block 3 of a fork that already diverged at 2.
        coordinator.handle_block(fork_block(3, 1, 1)).unwrap();
        assert_eq!(ledger.last_observed().unwrap().number, 1);
        assert_eq!(ledger.balance_of(&TOKEN, &BOB), whole(1));
        assert_eq!(coordinator.stats().rollbacks, 1);

        coordinator.handle_block(fork_block(2, 1, 0)).unwrap();
        coordinator.handle_block(fork_block(3, 1, 1)).unwrap();
        assert_eq!(ledger.last_observed().unwrap().hash, block_hash(3, 1));
        assert_eq!(coordinator.stats().accepted, 5);
    }

    #[tokio::test]
    async fn test_run_skips_rejected_and_malformed_input() {
        let (ledger, mut coordinator) = make_coordinator();
        let duplicate = transfer(2, 0, ALICE, whole(3));
        let blocks = vec![
            block(1).with_events(vec![transfer(1, 0, ALICE, whole(10))]),
            block(2).with_events(vec![duplicate.clone(), duplicate]),
            block(2).with_events(vec![transfer(2, 1, ALICE, whole(2))]),
        ];
        let mut text = String::from("garbage\n");
        for block in &blocks {
            text.push_str(&serde_json::to_string(block).unwrap());
            text.push('\n');
        }

        let stats = coordinator
            .run(BlockFeed::from_reader(Cursor::new(text.into_bytes())))
            .await
            .unwrap();

        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.accepted, 2);
        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), whole(12));
    }

    #[tokio::test]
    async fn test_run_counts_redelivery_as_out_of_order() {
        let (_, mut coordinator) = make_coordinator();
        let stats = coordinator
            .run(feed_of(&[block(1), block(2), block(2), block(4)]))
            .await
            .unwrap();

        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.out_of_order, 2);
    }
}
