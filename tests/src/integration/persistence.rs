//! # Persistence Flows
//!
//! The ledger over `FileBackedKVStore`, closed and reopened between steps the
//! way a process restart would.
//!
//! ## Flows Tested:
//!
//! 1. **Full lifecycle across restarts**: events, credits, maturation and
//!    payments survive a reopen
//! 2. **Reorg after restart**: the cursor's retained headers come back, so a
//!    fork is still detected and rolled back
//! 3. **Crash during maturation**: a round left `Finalizing` on disk is
//!    matured on the next open
//! 4. **Failed payment**: its released entitlement and used nonce survive a
//!    reopen

#[cfg(test)]
mod tests {
    use reward_ledger::adapters::FixedTimeSource;
    use reward_ledger::domain::KeyPrefix;
    use reward_ledger::test_utils::*;
    use reward_ledger::{
        BincodeCodec, FileBackedKVStore, KeyValueStore, LedgerConfig, LedgerDependencies,
        LedgerService, NoCanonicalChain, ObserveOutcome, RecordCodec, RoundState,
    };
    use shared_types::Amount;
    use std::path::Path;
    use tempfile::TempDir;

    type FileLedger = LedgerService<FileBackedKVStore, NoCanonicalChain, FixedTimeSource, BincodeCodec>;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn ledger_path(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("ledger.db")
    }

    fn open_ledger(path: &Path) -> FileLedger {
        let deps = LedgerDependencies {
            store: FileBackedKVStore::open(path).unwrap(),
            chain: NoCanonicalChain,
            clock: FixedTimeSource::new(1_700_000_000),
            codec: BincodeCodec,
        };
        LedgerService::open(deps, LedgerConfig::default().with_max_reorg_depth(8)).unwrap()
    }

    // =============================================================================
    // INTEGRATION TESTS
    // =============================================================================

    #[test]
    fn test_lifecycle_survives_restarts() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);

        {
            let ledger = open_ledger(&path);
            ledger
                .ingest_block(
                    block(1)
                        .with_events(vec![transfer(1, 0, ALICE, whole(100)), transfer(1, 1, BOB, whole(20))])
                        .with_credits(vec![reward("r1", ALICE, whole(40)), reward("r1", BOB, whole(8))]),
                )
                .unwrap();
        }

        {
            let ledger = open_ledger(&path);
            assert_eq!(ledger.last_observed().unwrap().number, 1);
            assert_eq!(ledger.summary_of(&round("r1"), &ALICE), whole(40));
            ledger
                .ingest_block(block(2).with_events(vec![transfer(2, 0, ALICE, whole(-30))]))
                .unwrap();
            ledger.finalize(&round("r1")).unwrap();
            ledger.authorize(&round("r1"), &ALICE, whole(25)).unwrap();
        }

        let ledger = open_ledger(&path);
        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), whole(70));
        assert_eq!(ledger.recompute_balance(&TOKEN, &ALICE).unwrap(), whole(70));
        assert_eq!(ledger.round_state(&round("r1")), Some(RoundState::Matured));
        assert_eq!(ledger.mature_reward_of(&round("r1"), &BOB), whole(8));

        let pending = ledger.pending_broadcasts();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pay_time, 1_700_000_000);
        assert_eq!(ledger.entitlement(&round("r1"), &ALICE).unpaid, whole(15));

        // Ids and nonces continue where the previous process stopped
        let second = ledger.authorize(&round("r1"), &BOB, whole(8)).unwrap();
        assert_eq!(second.id, pending[0].id + 1);
        assert_eq!(second.nonce, pending[0].nonce + 1);
    }

    #[test]
    fn test_failed_payment_stays_released_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);

        let failed = {
            let ledger = open_ledger(&path);
            ledger
                .ingest_block(block(1).with_credits(vec![reward("r1", ALICE, whole(10))]))
                .unwrap();
            ledger.finalize(&round("r1")).unwrap();
            let payment = ledger.authorize(&round("r1"), &ALICE, whole(10)).unwrap();
            ledger.record_broadcast(payment.id, [4u8; 32]).unwrap();
            ledger.fail_payment(payment.id).unwrap()
        };

        let ledger = open_ledger(&path);
        assert_eq!(ledger.payment(failed.id), Some(failed.clone()));
        assert_eq!(ledger.entitlement(&round("r1"), &ALICE).unpaid, whole(10));
        assert!(ledger.unconfirmed_payments().is_empty());

        // The nonce of the failed payment is not reused
        let reissued = ledger.authorize(&round("r1"), &ALICE, whole(10)).unwrap();
        assert_eq!(reissued.nonce, failed.nonce + 1);
    }

    #[test]
    fn test_fork_detected_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);

        {
            let ledger = open_ledger(&path);
            for n in 1..=3 {
                ledger
                    .ingest_block(block(n).with_events(vec![transfer(n as u8, 0, CAROL, whole(2))]))
                    .unwrap();
            }
        }

        let ledger = open_ledger(&path);
        let outcome = ledger.ingest_block(fork_block(3, 1, 0)).unwrap();
        assert_eq!(
            outcome,
            ObserveOutcome::ReorgDetected {
                diverging_at: 3,
                last_observed: 3
            }
        );

        let report = ledger.apply_reorg(3, vec![fork_block(3, 1, 0)]).unwrap();
        assert_eq!(report.removed_events, 1);
        assert_eq!(ledger.balance_of(&TOKEN, &CAROL), whole(4));
        drop(ledger);

        let ledger = open_ledger(&path);
        assert_eq!(ledger.last_observed().unwrap().hash, block_hash(3, 1));
        assert_eq!(ledger.recompute_balance(&TOKEN, &CAROL).unwrap(), whole(4));
    }

    #[test]
    fn test_finalizing_round_matures_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);

        let finalizing = {
            let ledger = open_ledger(&path);
            ledger
                .ingest_block(block(1).with_credits(vec![reward("r9", BOB, whole(3))]))
                .unwrap();
            ledger.round(&round("r9")).unwrap().begin_finalizing().unwrap()
        };

        // Crash between the two maturation writes
        {
            let mut store = FileBackedKVStore::open(&path).unwrap();
            store
                .put(
                    &KeyPrefix::round_key(&round("r9")),
                    &BincodeCodec.encode(&finalizing).unwrap(),
                )
                .unwrap();
        }

        let ledger = open_ledger(&path);
        assert_eq!(ledger.round_state(&round("r9")), Some(RoundState::Matured));
        assert_eq!(ledger.mature_reward_of(&round("r9"), &BOB), whole(3));
        assert_eq!(ledger.summary_of(&round("r9"), &BOB), Amount::ZERO);
    }
}
