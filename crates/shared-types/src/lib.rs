//! # Shared Types Crate
//!
//! Value types used across the reward ledger workspace.
//!
//! ## Design Principles
//!
//! - **Exact arithmetic**: every token quantity is an [`Amount`], a signed
//!   fixed-point decimal with exactly 18 fractional digits. No floating point
//!   ever touches a balance or a reward.
//! - **Single wire format**: the block feed consumed by the runtime and the
//!   types accepted by the engine are the same structs ([`ChainBlock`]).
//! - **Validated identifiers**: a [`RoundId`] or [`PoolName`] cannot be
//!   constructed empty.

pub mod amount;
pub mod entities;
pub mod errors;

pub use amount::{Amount, DECIMALS};
pub use entities::*;
pub use errors::*;
