//! # stealthmax-keys
//!
//! **Pure deterministic key derivation**: no side effects, no I/O.
//!
//! Every one-time receiving address StealthMax hands out is a function of
//! three inputs: the root secret, the subname, and the subname's rotation
//! counter. Nothing derived here is ever stored; any component can
//! recompute a keypair on demand.
//!
//! ## Modes
//!
//! - **Legacy** (`counter = None`): `keccak256(secret ‖ utf8(name))`. Used
//!   for registration and for the per-name rollup identity.
//! - **Rotation** (`counter = Some(n)`):
//!   `keccak256(secret ‖ 0xFF ‖ be32(len(name)) ‖ utf8(name) ‖ be64(n))`.
//!
//! `0xFF` can never appear in UTF-8 text, so the two modes never share a
//! preimage, and the length prefix makes rotation preimages injective over
//! `(name, counter)`.

pub mod derivation;
pub mod secret;

pub use derivation::{DerivedKeypair, KeyDeriver, address_from_private_key, derive, preimage};
pub use secret::MasterSecret;
