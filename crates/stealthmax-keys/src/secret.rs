//! The root secret.
//!
//! Wrapper that zeroizes the 32 secret bytes on drop and never prints them.

use std::fmt;

use stealthmax_types::{Result, StealthError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The 32-byte root secret every key is derived from.
///
/// Doubles as the master identity's private key on the rollup.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    inner: [u8; 32],
}

impl MasterSecret {
    #[must_use]
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { inner: bytes }
    }

    /// Parse a hex secret, with or without a `0x` prefix.
    ///
    /// # Errors
    /// `Configuration` if the input is not exactly 32 bytes of hex. The
    /// error message never echoes the input.
    pub fn from_hex(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 64 {
            return Err(StealthError::Configuration(format!(
                "secret must be 32 bytes of hex, got {} hex digits",
                digits.len()
            )));
        }
        let mut inner = [0u8; 32];
        hex::decode_to_slice(digits, &mut inner)
            .map_err(|_| StealthError::Configuration("secret is not valid hex".into()))?;
        Ok(Self { inner })
    }

    /// Load from an optional value, reporting absence as a configuration error.
    pub fn from_optional_hex(input: Option<&str>) -> Result<Self> {
        input
            .ok_or_else(|| StealthError::Configuration("secret is not set".into()))
            .and_then(Self::from_hex)
    }

    /// Raw secret bytes. Use immediately; do not keep copies around.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.inner
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}
