//! Block cursor
//!
//! Tracks the retained tail of the observed chain and classifies each
//! incoming header as the next block, a reorganization, or out of order.
//!
//! The cursor retains `window + 1` headers: enough to check the parent of the
//! deepest permitted replacement.

use shared_types::{BlockHeader, BlockNumber, Hash};
use std::collections::BTreeMap;

/// Classification of an incoming block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Extends the observed chain.
    Accepted,
    /// The chain diverged; `[diverging_at, last_observed]` must be rolled back.
    ReorgDetected {
        diverging_at: BlockNumber,
        last_observed: BlockNumber,
    },
    /// Gap, re-delivery, or a height below the retained history. Nothing changed.
    OutOfOrder {
        number: BlockNumber,
        expected: BlockNumber,
    },
}

#[derive(Debug, Clone)]
pub struct BlockCursor {
    window: u64,
    blocks: BTreeMap<BlockNumber, BlockHeader>,
}

impl BlockCursor {
    pub fn new(window: u64) -> Self {
        Self {
            window,
            blocks: BTreeMap::new(),
        }
    }

    /// Rebuild from stored headers, keeping only the retained window.
    pub fn from_headers(window: u64, headers: impl IntoIterator<Item = BlockHeader>) -> Self {
        let mut cursor = Self::new(window);
        for header in headers {
            cursor.blocks.insert(header.number, header);
        }
        cursor.prune();
        cursor
    }

    pub fn tip(&self) -> Option<&BlockHeader> {
        self.blocks.values().next_back()
    }

    pub fn lowest_retained(&self) -> Option<BlockNumber> {
        self.blocks.keys().next().copied()
    }

    pub fn hash_at(&self, number: BlockNumber) -> Option<Hash> {
        self.blocks.get(&number).map(|h| h.hash)
    }

    pub fn contains(&self, number: BlockNumber) -> bool {
        self.blocks.contains_key(&number)
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Classify `header` against the retained chain.
    ///
    /// `canonical` answers the canonical hash at a height below the incoming
    /// block; the block's own parent hash answers the height directly below it.
    /// The walk toward the common ancestor stops at the first height the
    /// lookup cannot answer, reporting the lowest height proven to diverge.
    pub fn observe<F>(&self, header: &BlockHeader, canonical: F) -> ObserveOutcome
    where
        F: Fn(BlockNumber) -> Option<Hash>,
    {
        let Some(tip) = self.tip() else {
            return ObserveOutcome::Accepted;
        };
        let expected = tip.number + 1;
        let out_of_order = ObserveOutcome::OutOfOrder {
            number: header.number,
            expected,
        };

        if header.number > expected {
            return out_of_order;
        }
        if self.lowest_retained().is_some_and(|low| header.number < low) {
            return out_of_order;
        }
        if header.number == expected && header.parent_hash == tip.hash {
            return ObserveOutcome::Accepted;
        }
        if self.hash_at(header.number) == Some(header.hash) {
            return out_of_order;
        }

        // Height known to differ from what we stored.
        let mut diverging_at = header.number.min(tip.number);
        let lowest = self.lowest_retained().unwrap_or(diverging_at);

        while diverging_at > lowest {
            let below = diverging_at - 1;
            let canonical_hash = if below + 1 == header.number {
                Some(header.parent_hash)
            } else {
                canonical(below)
            };
            match (canonical_hash, self.hash_at(below)) {
                (Some(theirs), Some(ours)) if theirs == ours => break,
                (Some(_), Some(_)) => diverging_at = below,
                _ => break,
            }
        }

        ObserveOutcome::ReorgDetected {
            diverging_at,
            last_observed: tip.number,
        }
    }

    /// Append a header that `observe` accepted. Returns the pruned heights.
    pub fn accept(&mut self, header: BlockHeader) -> Vec<BlockNumber> {
        self.blocks.insert(header.number, header);
        self.prune()
    }

    /// Remove every header at or above `number`.
    pub fn truncate_from(&mut self, number: BlockNumber) -> Vec<BlockHeader> {
        let removed = self.blocks.split_off(&number);
        removed.into_values().collect()
    }

    /// Heights that fall out of the window once `new_tip` is the tip.
    pub fn heights_pruned_at(&self, new_tip: BlockNumber) -> Vec<BlockNumber> {
        let floor = new_tip.saturating_sub(self.window);
        self.blocks.range(..floor).map(|(n, _)| *n).collect()
    }

    fn prune(&mut self) -> Vec<BlockNumber> {
        let Some(tip) = self.tip().map(|t| t.number) else {
            return Vec::new();
        };
        let pruned = self.heights_pruned_at(tip);
        for number in &pruned {
            self.blocks.remove(number);
        }
        pruned
    }
}
