//! # Reward Ledger Runtime
//!
//! Entry point. Configuration comes from the JSON file named by `RL_CONFIG`
//! and `RL_*` environment overrides; blocks arrive on `RL_FEED_PATH`
//! (stdin by default).
//!
//! ## Startup Sequence
//!
//! 1. Load and validate configuration
//! 2. Install logging
//! 3. Lock the data directory and open the ledger (completing any
//!    interrupted maturation)
//! 4. Start ingestion, finalization and payout tasks
//! 5. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use ledger_runtime::{LedgerRuntime, RuntimeConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = RuntimeConfig::load().context("Invalid runtime configuration")?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut runtime = LedgerRuntime::open(config)?;
    runtime.start().await?;

    info!("Ledger is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    Ok(())
}
