//! Pure domain logic: no storage, no clocks, no I/O.

pub mod accrual;
pub mod balances;
pub mod config;
pub mod cursor;
pub mod entities;
pub mod keys;
pub mod maturation;
pub mod settlement;
pub mod share_mining;

pub use accrual::AccrualBook;
pub use balances::BalanceBook;
pub use config::{LedgerConfig, ShareMiningSchedule};
pub use cursor::{BlockCursor, ObserveOutcome};
pub use entities::*;
pub use keys::KeyPrefix;
pub use maturation::RoundState;
pub use settlement::SettlementBook;
