//! # Runtime Flows
//!
//! The runtime as an operator runs it: configuration, a block feed on disk,
//! the ingestion coordinator, the finalization pass and the payout cycle.
//!
//! ## Flow Tested:
//!
//! ```text
//! feed.jsonl ──→ IngestionCoordinator ──→ share mining credits
//!                                              │
//!                 finalize_tick ←── tip ≥ end_block + confirmations
//!                       │
//!                 payout_tick ──→ DryRunBroadcaster ──→ record_broadcast
//!                       │
//!                 next payout_tick ──→ receipt ──→ settle_payment
//! ```

#[cfg(test)]
mod tests {
    use ledger_runtime::{
        DryRunBroadcaster, LedgerRuntime, MiningRoundConfig, PoolConfig, RuntimeConfig,
        ShareMiningConfig, StorageBackend,
    };
    use reward_ledger::test_utils::*;
    use reward_ledger::{PaymentOrder, PaymentStatus};
    use shared_types::{Amount, ChainBlock, PoolName};
    use std::path::Path;
    use std::str::FromStr;
    use tempfile::TempDir;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn write_feed(path: &Path, blocks: &[ChainBlock]) {
        let mut text = String::new();
        for block in blocks {
            text.push_str(&serde_json::to_string(block).unwrap());
            text.push('\n');
        }
        std::fs::write(path, text).unwrap();
    }

    /// Round `share` pays 10 tokens per block over blocks 1..=2 and matures
    /// one block later.
    fn runtime_config(dir: &TempDir) -> RuntimeConfig {
        RuntimeConfig {
            data_dir: dir.path().join("data"),
            storage_backend: StorageBackend::File,
            feed_path: dir.path().join("feed.jsonl").display().to_string(),
            rounds: vec![MiningRoundConfig {
                round: round("share"),
                begin_block: 1,
                end_block: 2,
                confirmations: 1,
                share_mining: Some(ShareMiningConfig {
                    reward_per_block: whole(10),
                    pools: vec![PoolConfig {
                        name: PoolName::new("amm").unwrap(),
                        token: TOKEN,
                        weight: 1,
                    }],
                }),
            }],
            ..RuntimeConfig::default()
        }
    }

    fn amount(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    // =============================================================================
    // INTEGRATION TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_feed_to_payout() {
        let dir = TempDir::new().unwrap();
        let config = runtime_config(&dir);
        write_feed(
            Path::new(&config.feed_path),
            &[
                block(1).with_events(vec![transfer(1, 0, ALICE, whole(30)), transfer(1, 1, BOB, whole(10))]),
                block(2),
            ],
        );

        let runtime = LedgerRuntime::open(config).unwrap();
        let stats = runtime.ingest_feed().await.unwrap();
        assert_eq!(stats.accepted, 2);

        // Tip 2 < end_block + confirmations
        assert!(runtime.finalize_tick().unwrap().is_empty());
        let report = runtime.payout_tick().await.unwrap();
        assert_eq!(report.settled, 1);
        assert_eq!(report.authorized, 0);

        let ledger = runtime.ledger();
        assert_eq!(ledger.summary_of(&round("share"), &ALICE), whole(15));
        assert_eq!(ledger.summary_of(&round("share"), &BOB), amount("5"));

        ledger.ingest_block(block(3)).unwrap();
        assert_eq!(runtime.finalize_tick().unwrap(), vec![round("share")]);

        let report = runtime.payout_tick().await.unwrap();
        assert_eq!(report.authorized, 2);
        assert_eq!(report.broadcast, 2);
        assert_eq!(report.failed, 0);

        let alice = ledger.payments_of(&ALICE);
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].amount, whole(15));
        let expected = DryRunBroadcaster::transaction_hash(&PaymentOrder {
            payment_id: alice[0].id,
            holder: ALICE,
            amount: alice[0].amount,
            nonce: alice[0].nonce,
        });
        assert_eq!(alice[0].transaction_hash, Some(expected));
        assert_eq!(alice[0].status, PaymentStatus::Broadcast);

        // Nothing left to pay; the receipts settle both payments
        let again = runtime.payout_tick().await.unwrap();
        assert_eq!(again.settled, 2);
        assert_eq!(again.authorized, 0);
        assert_eq!(again.retried, 0);
        assert_eq!(ledger.payments_of(&ALICE)[0].status, PaymentStatus::Settled);
        assert!(ledger.unpaid_rewards(&round("share")).is_empty());
    }

    #[tokio::test]
    async fn test_restart_resumes_without_double_payment() {
        let dir = TempDir::new().unwrap();
        let config = runtime_config(&dir);
        write_feed(
            Path::new(&config.feed_path),
            &[
                block(1).with_events(vec![transfer(1, 0, CAROL, whole(50))]),
                block(2),
                block(3),
            ],
        );

        {
            let runtime = LedgerRuntime::open(config.clone()).unwrap();
            runtime.ingest_feed().await.unwrap();
            runtime.finalize_tick().unwrap();
            let report = runtime.payout_tick().await.unwrap();
            assert_eq!(report.authorized, 1);
        }

        // The second process replays the same feed from the start
        let runtime = LedgerRuntime::open(config).unwrap();
        let stats = runtime.ingest_feed().await.unwrap();
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.out_of_order, 3);

        let report = runtime.payout_tick().await.unwrap();
        assert_eq!(report.authorized, 0);

        let ledger = runtime.ledger();
        let summary = ledger.payment_summary(&CAROL).unwrap();
        assert_eq!(summary.total_paid, whole(20));
        assert_eq!(summary.payment_count, 1);
        assert_eq!(summary.unbroadcast_count, 0);
        assert_eq!(summary.unconfirmed_count, 0);
    }
}
