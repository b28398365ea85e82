//! # stealthmax-types
//!
//! Shared types, errors, and configuration for **StealthMax**.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`RollupAddress`], [`TxHash`], [`CycleId`]
//! - **Amounts**: [`NativeAmount`] (wei) with decimal and rollup-unit conversion
//! - **Name model**: [`NameRecord`], [`Description`], [`MatchedTransfer`]
//! - **Settlement model**: [`SettlementStep`], [`StepPolicy`], [`StepRecord`],
//!   [`SettlementResult`], [`SettlementOutcome`]
//! - **Configuration**: [`ServiceConfig`], [`Secrets`]
//! - **Errors**: [`StealthError`] with `SM_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod amount;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod record;
pub mod settlement;

// Re-export all primary types at crate root for ergonomic imports:
//   use stealthmax_types::{Address, NameRecord, StealthError, ...};

pub use amount::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use record::*;
pub use settlement::*;

// Constants are accessed via `stealthmax_types::constants::FOO`
// (not re-exported to avoid name collisions).
