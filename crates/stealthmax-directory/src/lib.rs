//! # stealthmax-directory
//!
//! The name directory: who owns which receiving address, and where their
//! funds live on the rollup.
//!
//! ## Layers
//!
//! - [`NameRegistry`]: raw access to the external ENS subname registry
//!   (entries with free-form text records). [`NamestoneClient`] talks to the
//!   hosted registry; [`InMemoryRegistry`] backs tests and local runs.
//! - [`NameDirectory`]: the record-level contract the settlement core uses,
//!   including compare-and-swap on the rotation counter.
//!   [`RegistryDirectory`] maps it onto a registry; [`InMemoryDirectory`]
//!   is a self-contained implementation.
//! - [`RegistrationService`]: registration, derivation and listing on top
//!   of a registry-backed directory.

pub mod directory;
pub mod memory;
pub mod namestone;
pub mod registration;
pub mod registry;

pub use directory::{CasOutcome, NameDirectory, RegistryDirectory, record_from_entry};
pub use memory::InMemoryDirectory;
pub use namestone::NamestoneClient;
pub use registration::{MonitoredDetail, MonitoredName, NamePair, Registration, RegistrationService};
pub use registry::{InMemoryRegistry, InjectedFailure, NameRegistry, RegistryEntry};
