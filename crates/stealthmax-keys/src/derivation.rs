//! Keccak-based one-time key derivation.
//!
//! The derived 32-byte digest is used directly as a secp256k1 private key
//! and the address follows the usual Ethereum rule: the last 20 bytes of
//! Keccak-256 over the uncompressed public key without its `0x04` tag.

use std::fmt;

use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};
use stealthmax_types::{Address, Result, StealthError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::MasterSecret;

/// Separates the secret from the counter-mode payload. Never valid UTF-8.
const COUNTER_MODE_TAG: u8 = 0xFF;

// ---------------------------------------------------------------------------
// DerivedKeypair
// ---------------------------------------------------------------------------

/// A derived one-time keypair. Recomputed on demand, never stored.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeypair {
    private_key: [u8; 32],
    #[zeroize(skip)]
    address: Address,
}

impl DerivedKeypair {
    #[must_use]
    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// `0x`-prefixed private key, the form rollup clients log in with.
    #[must_use]
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.private_key))
    }
}

impl fmt::Debug for DerivedKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeypair")
            .field("private_key", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

impl PartialEq for DerivedKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.private_key == other.private_key
    }
}

impl Eq for DerivedKeypair {}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// The byte string hashed to obtain the key for `(name, counter)`.
///
/// - `None`: `secret ‖ utf8(name)`
/// - `Some(n)`: `secret ‖ 0xFF ‖ be32(len) ‖ utf8(name) ‖ be64(n)`
#[must_use]
pub fn preimage(secret: &MasterSecret, name: &str, counter: Option<u64>) -> Vec<u8> {
    let name = name.as_bytes();
    let mut out = Vec::with_capacity(32 + 1 + 4 + name.len() + 8);
    out.extend_from_slice(secret.as_bytes());
    match counter {
        None => out.extend_from_slice(name),
        Some(counter) => {
            // Names longer than u32::MAX bytes cannot reach us over HTTP or
            // the registry; saturate instead of failing.
            let len = u32::try_from(name.len()).unwrap_or(u32::MAX);
            out.push(COUNTER_MODE_TAG);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(&counter.to_be_bytes());
        }
    }
    out
}

/// Derive the keypair for `(name, counter)`.
///
/// # Errors
/// `KeyDerivation` if the digest is not a valid secp256k1 scalar (zero or
/// above the group order).
pub fn derive(secret: &MasterSecret, name: &str, counter: Option<u64>) -> Result<DerivedKeypair> {
    let mut material = preimage(secret, name, counter);
    let mut private_key: [u8; 32] = Keccak256::digest(&material).into();
    material.zeroize();
    match address_from_private_key(&private_key) {
        Ok(address) => Ok(DerivedKeypair {
            private_key,
            address,
        }),
        Err(err) => {
            private_key.zeroize();
            Err(err)
        }
    }
}

/// Ethereum address controlled by a raw secp256k1 private key.
///
/// # Errors
/// `KeyDerivation` if `private_key` is not a valid scalar.
pub fn address_from_private_key(private_key: &[u8; 32]) -> Result<Address> {
    let signing_key = SigningKey::from_bytes(private_key.into())
        .map_err(|_| StealthError::KeyDerivation("digest is not a valid secp256k1 key".into()))?;
    let point = signing_key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Ok(Address(bytes))
}

// ---------------------------------------------------------------------------
// KeyDeriver
// ---------------------------------------------------------------------------

/// Owns the root secret and hands out derived keys.
///
/// Cheap to clone and safe to share; every method is a pure function of
/// the stored secret and its arguments.
#[derive(Clone)]
pub struct KeyDeriver {
    secret: MasterSecret,
}

impl KeyDeriver {
    #[must_use]
    pub fn new(secret: MasterSecret) -> Self {
        Self { secret }
    }

    /// Build from a hex secret.
    ///
    /// # Errors
    /// `Configuration` if the secret is malformed.
    pub fn from_hex(secret: &str) -> Result<Self> {
        MasterSecret::from_hex(secret).map(Self::new)
    }

    /// Keypair for `name` at `counter` (`None` = legacy mode).
    pub fn derive(&self, name: &str, counter: Option<u64>) -> Result<DerivedKeypair> {
        derive(&self.secret, name, counter)
    }

    /// Legacy-mode keypair: the registration address and the per-name
    /// rollup identity.
    pub fn legacy(&self, name: &str) -> Result<DerivedKeypair> {
        derive(&self.secret, name, None)
    }

    /// Address a name rotates to when its current counter is `counter`.
    pub fn rotation_address(&self, name: &str, counter: u64) -> Result<Address> {
        derive(&self.secret, name, Some(counter)).map(|kp| kp.address())
    }

    /// The master identity: the root secret used directly as a private key.
    pub fn master(&self) -> Result<DerivedKeypair> {
        let private_key = *self.secret.as_bytes();
        let address = address_from_private_key(&private_key)?;
        Ok(DerivedKeypair {
            private_key,
            address,
        })
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver").finish_non_exhaustive()
    }
}
