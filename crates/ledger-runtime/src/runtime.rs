//! # Ledger Runtime
//!
//! Wires the ledger to its storage backend and runs three tasks:
//!
//! 1. Ingestion: the coordinator drains the block feed
//! 2. Finalization: every `finalize_interval_secs`, matures the rounds the
//!    confirmation policy approves
//! 3. Payout (optional): every `payout.interval_secs`, runs one payout cycle
//!
//! All three stop on the shutdown signal.

use crate::adapters::{DryRunBroadcaster, RuntimeStore};
use crate::config::{RuntimeConfig, StorageBackend};
use crate::coordinator::{IngestionCoordinator, IngestionStats};
use crate::feed::BlockFeed;
use anyhow::{Context, Result};
use fs2::FileExt;
use reward_ledger::{
    BincodeCodec, ConfirmationDepthPolicy, LedgerDependencies, LedgerService, NoCanonicalChain,
    Payer, PayoutReport, SystemTimeSource,
};
use shared_types::RoundId;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// File in the data directory holding the exclusive process lock.
pub const LOCK_FILE: &str = "LOCK";

pub type RuntimeLedger = LedgerService<RuntimeStore, NoCanonicalChain, SystemTimeSource, BincodeCodec>;

pub struct LedgerRuntime {
    config: RuntimeConfig,
    ledger: Arc<RuntimeLedger>,
    policy: Arc<ConfirmationDepthPolicy>,
    rounds: Arc<Vec<RoundId>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
    /// Held for the lifetime of the runtime.
    _lock: Option<File>,
}

impl LedgerRuntime {
    /// Lock the data directory, open the store and the ledger.
    pub fn open(config: RuntimeConfig) -> Result<Self> {
        let lock = if config.storage_backend == StorageBackend::Memory {
            None
        } else {
            Some(lock_data_dir(&config)?)
        };

        let store = RuntimeStore::open(config.storage_backend, &config.data_dir)
            .with_context(|| format!("Failed to open {} store", config.storage_backend))?;
        let deps = LedgerDependencies {
            store,
            chain: NoCanonicalChain,
            clock: SystemTimeSource,
            codec: BincodeCodec,
        };
        let ledger_config = config.ledger_config().context("Invalid share mining configuration")?;
        let ledger = LedgerService::open(deps, ledger_config).context("Failed to open reward ledger")?;

        if let Some(tip) = ledger.last_observed() {
            info!("[runtime] 🔗 Resuming after block #{}", tip.number);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            policy: Arc::new(config.finalization_policy()),
            rounds: Arc::new(config.round_ids()),
            config,
            ledger: Arc::new(ledger),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
            _lock: lock,
        })
    }

    pub fn ledger(&self) -> Arc<RuntimeLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Drain the configured feed on the current task.
    pub async fn ingest_feed(&self) -> Result<IngestionStats> {
        let feed = BlockFeed::open(&self.config.feed_path).await?;
        let mut coordinator = IngestionCoordinator::new(self.ledger());
        Ok(coordinator.run(feed).await?)
    }

    /// One finalization pass.
    pub fn finalize_tick(&self) -> Result<Vec<RoundId>> {
        finalize_ready(&self.ledger, &self.policy)
    }

    /// One payout cycle over the configured rounds.
    pub async fn payout_tick(&self) -> Result<PayoutReport> {
        let payer = Payer::new(self.ledger(), DryRunBroadcaster);
        Ok(payer.run_once(&self.rounds).await?)
    }

    /// Spawn the ingestion, finalization and payout tasks.
    pub async fn start(&mut self) -> Result<()> {
        info!("===========================================");
        info!("  Reward Ledger Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("  Storage: {}", self.config.storage_backend);
        info!("  Data Dir: {}", self.config.data_dir.display());
        info!("  Rounds: {}", self.rounds.len());
        info!("===========================================");

        // Open now so a bad path fails startup.
        let feed = BlockFeed::open(&self.config.feed_path).await?;
        let ledger = self.ledger();
        let mut shutdown = self.shutdown_rx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut coordinator = IngestionCoordinator::new(ledger);
            tokio::select! {
                result = coordinator.run(feed) => {
                    if let Err(e) = result {
                        error!("[runtime] ❌ Ingestion task failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("[runtime] Ingestion shutdown signal received");
                }
            }
        }));

        let ledger = self.ledger();
        let policy = Arc::clone(&self.policy);
        let period = Duration::from_secs(self.config.finalize_interval_secs);
        let mut shutdown = self.shutdown_rx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = finalize_ready(&ledger, &policy) {
                            error!("[runtime] ❌ Finalization pass failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("[runtime] Finalization shutdown signal received");
                        break;
                    }
                }
            }
        }));

        if self.config.payout.enabled {
            let payer = Payer::new(self.ledger(), DryRunBroadcaster);
            let rounds = Arc::clone(&self.rounds);
            let period = Duration::from_secs(self.config.payout.interval_secs);
            let mut shutdown = self.shutdown_rx.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match payer.run_once(&rounds).await {
                                Ok(report) if report.failed > 0 || report.reverted > 0 => warn!(
                                    "[runtime] ⚠️ Payout cycle {}: {} sends failed, {} transactions reverted",
                                    report.cycle_id, report.failed, report.reverted
                                ),
                                Ok(_) => {}
                                Err(e) => error!("[runtime] ❌ Payout cycle failed: {}", e),
                            }
                        }
                        _ = shutdown.changed() => {
                            info!("[runtime] Payout shutdown signal received");
                            break;
                        }
                    }
                }
            }));
        } else {
            info!("[runtime] Payout cycle disabled");
        }

        info!("[runtime] ✅ Runtime started");
        Ok(())
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(&mut self) {
        info!("[runtime] Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("[runtime] Failed to send shutdown signal: {}", e);
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = tokio::time::timeout(Duration::from_secs(5), task).await {
                warn!("[runtime] Task did not stop in time: {}", e);
            }
        }

        info!("[runtime] Shutdown complete");
    }
}

fn finalize_ready(ledger: &RuntimeLedger, policy: &ConfirmationDepthPolicy) -> Result<Vec<RoundId>> {
    let matured = ledger
        .finalize_ready(policy)
        .context("Finalization pass failed")?;
    for round in &matured {
        info!("[runtime] 🏁 Round {} matured", round);
    }
    Ok(matured)
}

fn lock_data_dir(config: &RuntimeConfig) -> Result<File> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.data_dir.display())
    })?;
    let path = config.data_dir.join(LOCK_FILE);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create lock file {}", path.display()))?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "Data directory {} is in use by another process",
            config.data_dir.display()
        )
    })?;
    Ok(file)
}
