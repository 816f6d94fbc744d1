//! Block ingestion, reorganization and balance queries.

use super::staging::Staging;
use super::LedgerService;
use crate::domain::cursor::{BlockCursor, ObserveOutcome};
use crate::domain::entities::{ReorgReport, TokenEvent};
use crate::domain::KeyPrefix;
use crate::error::{LedgerError, LedgerResult};
use crate::ports::outbound::{ChainReader, KeyValueStore, RecordCodec, TimeSource};
use shared_types::{hash_hex, Address, Amount, BlockHeader, BlockNumber, ChainBlock};
use tracing::{debug, info, warn};

impl<S, R, T, C> LedgerService<S, R, T, C>
where
    S: KeyValueStore,
    R: ChainReader,
    T: TimeSource,
    C: RecordCodec,
{
    /// Classify a header; record it when accepted.
    pub fn observe_block(&self, header: BlockHeader) -> LedgerResult<ObserveOutcome> {
        self.ingest_block(ChainBlock::empty(header.number, header.hash, header.parent_hash))
    }

    /// Classify a block and, when accepted, commit it with all of its events
    /// and credits as one batch. Any failure rejects the whole block.
    pub fn ingest_block(&self, block: ChainBlock) -> LedgerResult<ObserveOutcome> {
        let mut state = self.state.write();

        let outcome = state
            .cursor
            .observe(&block.header(), |n| self.chain.canonical_hash(n));
        match outcome {
            ObserveOutcome::Accepted => {}
            ObserveOutcome::OutOfOrder { number, expected } => {
                warn!(number, expected, "[ledger] ⚠️ block out of order, ignored");
                return Ok(outcome);
            }
            ObserveOutcome::ReorgDetected {
                diverging_at,
                last_observed,
            } => {
                warn!(
                    number = block.number,
                    hash = %hash_hex(&block.hash),
                    diverging_at,
                    last_observed,
                    "[ledger] 🔀 reorganization detected"
                );
                return Ok(outcome);
            }
        }

        let changes = {
            let mut staging = Staging::new(&state, &self.config);
            staging.stage_block(&block)?;
            staging.finish()
        };
        state.commit_staged(changes)?;

        debug!(
            number = block.number,
            events = block.events.len(),
            credits = block.credits.len(),
            "[ledger] 📦 block applied"
        );
        Ok(ObserveOutcome::Accepted)
    }

    /// Roll back `[diverging_at, tip]` and apply `replacements` in one batch.
    ///
    /// Replacements must start at `diverging_at`, be consecutive, and link to
    /// the retained block below `diverging_at`.
    pub fn apply_reorg(
        &self,
        diverging_at: BlockNumber,
        replacements: Vec<ChainBlock>,
    ) -> LedgerResult<ReorgReport> {
        let mut state = self.state.write();

        let tip = state
            .cursor
            .tip()
            .map(|t| t.number)
            .filter(|tip| diverging_at <= *tip)
            .ok_or(LedgerError::UnknownBlock {
                number: diverging_at,
            })?;

        let depth = tip - diverging_at + 1;
        if depth > self.config.max_reorg_depth || !state.cursor.contains(diverging_at) {
            warn!(depth, max = self.config.max_reorg_depth, "[ledger] reorg too deep");
            return Err(LedgerError::ReorgTooDeep {
                depth,
                max: self.config.max_reorg_depth,
            });
        }
        // The cursor must keep an anchor to order later blocks against
        let keeps_parent = diverging_at.checked_sub(1).is_some_and(|n| state.cursor.contains(n));
        if !keeps_parent && replacements.is_empty() {
            let lowest_retained = state.cursor.lowest_retained().unwrap_or(diverging_at);
            warn!(diverging_at, lowest_retained, "[ledger] rollback would empty the block cursor");
            return Err(LedgerError::ReorgBeyondHistory {
                diverging_at,
                lowest_retained,
            });
        }
        check_replacements(&state.cursor, diverging_at, &replacements)?;

        let (changes, removed) = {
            let mut staging = Staging::new(&state, &self.config);
            let removed = staging.stage_rollback(diverging_at, tip)?;
            for block in &replacements {
                staging.stage_block(block)?;
            }
            (staging.finish(), removed)
        };
        state.commit_staged(changes)?;

        let report = ReorgReport {
            diverging_at,
            removed_blocks: removed.blocks,
            removed_events: removed.events,
            removed_credits: removed.credits,
            applied_blocks: replacements.len(),
            new_tip: state.tip_number(),
        };
        info!(
            diverging_at,
            removed_blocks = report.removed_blocks,
            applied_blocks = report.applied_blocks,
            new_tip = report.new_tip,
            "[ledger] 🔀 reorganization applied"
        );
        Ok(report)
    }

    /// Roll back `[diverging_at, tip]` without replacements.
    ///
    /// The block below `diverging_at` must still be retained.
    pub fn rollback_to(&self, diverging_at: BlockNumber) -> LedgerResult<ReorgReport> {
        self.apply_reorg(diverging_at, Vec::new())
    }

    pub fn last_observed(&self) -> Option<BlockHeader> {
        self.state.read().cursor.tip().copied()
    }

    /// Append a single event to an observed block.
    pub fn append_event(&self, event: TokenEvent) -> LedgerResult<()> {
        let mut state = self.state.write();
        if !state.cursor.contains(event.block_number) {
            return Err(LedgerError::UnknownBlock {
                number: event.block_number,
            });
        }

        let changes = {
            let mut staging = Staging::new(&state, &self.config);
            staging.stage_event(event)?;
            staging.finish()
        };
        state.commit_staged(changes)
    }

    pub fn balance_of(&self, token: &Address, holder: &Address) -> Amount {
        self.state.read().balances.balance_of(token, holder)
    }

    /// Re-sum the balance from stored events.
    pub fn recompute_balance(&self, token: &Address, holder: &Address) -> LedgerResult<Amount> {
        let state = self.state.read();
        let amounts: Vec<Amount> = state.scan(&KeyPrefix::holder_event_prefix(token, holder))?;
        Ok(Amount::checked_sum(amounts)?)
    }

    pub fn holders_of(&self, token: &Address) -> Vec<(Address, Amount)> {
        self.state.read().balances.holders(token)
    }

    pub fn total_supply(&self, token: &Address) -> LedgerResult<Amount> {
        Ok(self.state.read().balances.total_supply(token)?)
    }
}

fn check_replacements(
    cursor: &BlockCursor,
    diverging_at: BlockNumber,
    replacements: &[ChainBlock],
) -> LedgerResult<()> {
    let mut expected = diverging_at;
    let mut parent = diverging_at.checked_sub(1).and_then(|n| cursor.hash_at(n));

    for block in replacements {
        if block.number != expected {
            return Err(LedgerError::ReorgMismatch {
                reason: format!("expected block {expected}, got {}", block.number),
            });
        }
        if let Some(parent_hash) = parent {
            if block.parent_hash != parent_hash {
                return Err(LedgerError::ReorgMismatch {
                    reason: format!(
                        "block {} does not link to {}; roll back deeper",
                        block.number,
                        hash_hex(&parent_hash)
                    ),
                });
            }
        }
        parent = Some(block.hash);
        expected += 1;
    }
    Ok(())
}
