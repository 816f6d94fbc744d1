//! # Reward Ledger Runtime
//!
//! Hosts the reward ledger as a long-running process.
//!
//! ## Modules
//!
//! - `config` - `RuntimeConfig` from a JSON file and `RL_*` environment
//! - `adapters` - Storage backend selection and the dry-run broadcaster
//! - `feed` - Newline-delimited JSON block feed
//! - `coordinator` - The single task that applies blocks
//! - `runtime` - Startup, schedulers and graceful shutdown
//!
//! ## Flow
//!
//! ```text
//! BlockFeed ──ChainBlock──→ IngestionCoordinator ──→ LedgerService
//!                                                       ↑      ↑
//!                      finalization ticker ─────────────┘      │
//!                      payout ticker ──→ Payer ──→ Broadcaster ┘
//! ```

pub mod adapters;
pub mod config;
pub mod coordinator;
pub mod feed;
pub mod runtime;

pub use adapters::{DryRunBroadcaster, RuntimeStore};
pub use config::{
    ConfigError, MiningRoundConfig, PayoutConfig, PoolConfig, RuntimeConfig, ShareMiningConfig,
    StorageBackend,
};
pub use coordinator::{IngestionCoordinator, IngestionStats};
pub use feed::{BlockFeed, FeedError};
pub use runtime::{LedgerRuntime, RuntimeLedger};
