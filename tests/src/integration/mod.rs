//! # Integration Tests

pub mod persistence;
pub mod runtime_flows;
