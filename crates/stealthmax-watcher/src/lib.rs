//! # stealthmax-watcher
//!
//! Observes the base chain for native transfers to monitored addresses.
//!
//! - [`ChainSource`]: head number and full blocks ([`JsonRpcChainSource`]
//!   over Ethereum JSON-RPC, [`ScriptedChain`] in memory).
//! - [`AddressBook`]: owner of the atomically swapped [`AddressSnapshot`];
//!   [`spawn_refresher`] reloads it from the directory on a timer.
//! - [`BlockWatcher`]: block-sequential scan, one transfer at a time, into
//!   a [`TransferSink`] (the settlement orchestrator in production).
//!   [`SeenTransactions`] stops a re-scanned block settling twice.
//! - [`Supervisor`]: fixed back-off restart with an optional limit.

pub mod chain;
pub mod refresher;
pub mod replay;
pub mod sink;
pub mod snapshot;
pub mod supervisor;
pub mod watcher;

pub use chain::{ChainBlock, ChainSource, ChainTransaction, JsonRpcChainSource, ScriptedChain};
pub use refresher::spawn_refresher;
pub use replay::{Claim, SeenTransactions};
pub use sink::TransferSink;
pub use snapshot::{AddressBook, AddressSnapshot, match_transfers};
pub use supervisor::{Supervisor, SupervisorExit};
pub use watcher::{BlockWatcher, WatchStats};
