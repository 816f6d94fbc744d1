//! # Reward Ledger Test Suite
//!
//! Cross-crate flows that unit tests inside each crate cannot cover.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── persistence.rs    # File-backed store across restarts
//!     └── runtime_flows.rs  # Feed → coordinator → finalization → payout
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rl-tests
//! cargo test -p rl-tests integration::runtime_flows
//!
//! # Benchmarks
//! cargo bench -p rl-tests
//! ```

pub mod integration;
