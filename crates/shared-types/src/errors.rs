//! # Error Types
//!
//! Parse and validation errors for the shared value types.

use thiserror::Error;

/// Errors produced while parsing or combining [`crate::Amount`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Input string is empty or contains something other than a decimal number.
    #[error("Malformed amount: {input:?}")]
    Malformed { input: String },

    /// More fractional digits than the ledger can represent.
    #[error("Amount {input:?} has {digits} fractional digits, at most 18 are allowed")]
    TooManyDecimals { input: String, digits: usize },

    /// Value exceeds the fixed-point range.
    #[error("Amount overflow")]
    Overflow,

    /// Division by a zero amount.
    #[error("Division by zero amount")]
    DivisionByZero,
}

/// Errors produced while validating a [`crate::RoundId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundIdError {
    /// Round identifiers may not be empty.
    #[error("Mining round identifier is empty")]
    Empty,

    /// Round identifiers are length-prefixed in storage keys.
    #[error("Mining round identifier is {len} bytes, at most {max} are allowed")]
    TooLong { len: usize, max: usize },
}

/// Errors produced while validating a [`crate::PoolName`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolNameError {
    #[error("Reward pool name is empty")]
    Empty,

    #[error("Reward pool name is {len} bytes, at most {max} are allowed")]
    TooLong { len: usize, max: usize },
}
