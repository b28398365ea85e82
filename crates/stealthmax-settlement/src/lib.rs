//! # stealthmax-settlement
//!
//! Moves received funds onto the rollup and rotates the receiving address.
//!
//! ## Components
//!
//! - [`RollupClient`] / [`RollupConnector`]: ports to the settlement
//!   network. [`GatewayConnector`] talks to an HTTP sidecar;
//!   [`SimulatedRollup`] is a shared in-memory ledger for tests and
//!   `--simulate` runs.
//! - [`SettlementOrchestrator`]: the eight-step cycle, manual deposits,
//!   and read-only account queries.

pub mod gateway;
pub mod orchestrator;
pub mod rollup;
pub mod simulated;

pub use gateway::GatewayConnector;
pub use orchestrator::{AccountView, ClientFuture, SettlementOrchestrator};
pub use rollup::{
    DepositParams, DepositReceipt, DepositRecord, DepositStatus, RollupClient, RollupConnector,
    RollupToken, TokenBalance, TransferFee, TransferReceipt, TransferRecord, TransferRequest,
    TransferStatus, balance_of, native_token,
};
pub use simulated::{Call, Operation, SimulatedRollup};
