//! # Reward Ledger Benchmarks
//!
//! | Operation | Expectation |
//! |-----------|-------------|
//! | Block ingestion | One batch write per block, linear in rows |
//! | Share mining | Linear in holders of the scheduled token |
//! | Balance recomputation | Linear in the holder's stored events |
//! | Reorg | Rollback plus reapply in one batch |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use reward_ledger::test_utils::*;
use reward_ledger::{InMemoryLedger, LedgerConfig, ShareMiningSchedule};
use shared_types::{Address, Amount, ChainBlock, PoolName, TransferDelta};
use std::time::Duration;

fn holder(i: u32) -> Address {
    let mut address = [0u8; 20];
    address[16..].copy_from_slice(&i.to_be_bytes());
    address
}

/// `events` random deltas spread over `holders` holders.
fn random_block(number: u64, events: u32, holders: u32) -> ChainBlock {
    let mut rng = rand::thread_rng();
    let deltas = (0..events)
        .map(|i| {
            let mut transaction_hash = [0u8; 32];
            transaction_hash[..8].copy_from_slice(&number.to_be_bytes());
            transaction_hash[8..12].copy_from_slice(&i.to_be_bytes());
            TransferDelta {
                transaction_hash,
                event_index: i,
                token: TOKEN,
                holder: holder(rng.gen_range(0..holders)),
                amount: Amount::from_whole(rng.gen_range(1..1_000)),
            }
        })
        .collect();
    block(number).with_events(deltas)
}

fn fresh_ledger(config: LedgerConfig) -> InMemoryLedger {
    InMemoryLedger::in_memory(config).expect("in-memory ledger")
}

// ============================================================================
// Ingestion
// ============================================================================

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.measurement_time(Duration::from_secs(5));

    for events in [10u32, 100, 1_000] {
        group.throughput(Throughput::Elements(u64::from(events)));
        group.bench_with_input(BenchmarkId::new("block_events", events), &events, |b, &events| {
            b.iter_batched(
                || (fresh_ledger(LedgerConfig::default()), random_block(1, events, 64)),
                |(ledger, block)| black_box(ledger.ingest_block(block).unwrap()),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_share_mining(c: &mut Criterion) {
    let mut group = c.benchmark_group("share_mining");

    for holders in [10u32, 100, 1_000] {
        let schedule = ShareMiningSchedule {
            round: round("bench"),
            pool: PoolName::new("bench").unwrap(),
            token: TOKEN,
            begin_block: 2,
            end_block: u64::MAX,
            reward_per_block: whole(10),
        };
        group.throughput(Throughput::Elements(u64::from(holders)));
        group.bench_with_input(BenchmarkId::new("holders", holders), &holders, |b, &holders| {
            b.iter_batched(
                || {
                    let ledger = fresh_ledger(LedgerConfig::default().with_share_mining(schedule.clone()));
                    ledger.ingest_block(random_block(1, holders * 2, holders)).unwrap();
                    ledger
                },
                |ledger| black_box(ledger.ingest_block(block(2)).unwrap()),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Queries and reorgs
// ============================================================================

fn bench_recompute_balance(c: &mut Criterion) {
    let ledger = fresh_ledger(LedgerConfig::default());
    for n in 1..=100 {
        ledger.ingest_block(random_block(n, 50, 4)).unwrap();
    }

    c.bench_function("recompute_balance", |b| {
        b.iter(|| black_box(ledger.recompute_balance(&TOKEN, &holder(0)).unwrap()))
    });
}

fn bench_reorg(c: &mut Criterion) {
    let mut group = c.benchmark_group("reorg");

    for depth in [1u64, 8, 32] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            b.iter_batched(
                || {
                    let ledger = fresh_ledger(LedgerConfig::default());
                    for n in 1..=64 {
                        ledger.ingest_block(random_block(n, 20, 16)).unwrap();
                    }
                    ledger
                },
                |ledger| black_box(ledger.rollback_to(65 - depth).unwrap()),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingest, bench_share_mining, bench_recompute_balance, bench_reorg);
criterion_main!(benches);
