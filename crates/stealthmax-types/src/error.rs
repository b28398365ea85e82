//! Error types for StealthMax.
//!
//! All errors use the `SM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Configuration errors
//! - 2xx: Key derivation errors
//! - 3xx: Name registry / directory errors
//! - 4xx: Rollup (settlement network) errors
//! - 5xx: Chain transport errors
//! - 9xx: General / internal errors

use thiserror::Error;

/// Central error enum for all StealthMax operations.
#[derive(Debug, Error)]
pub enum StealthError {
    // =================================================================
    // Configuration Errors (1xx)
    // =================================================================
    /// Missing or malformed configuration (secret, API key, URL, ...).
    #[error("SM_ERR_100: Configuration error: {0}")]
    Configuration(String),

    // =================================================================
    // Key Derivation Errors (2xx)
    // =================================================================
    /// The derived digest is not a usable secp256k1 private key.
    #[error("SM_ERR_200: Key derivation failed: {0}")]
    KeyDerivation(String),

    // =================================================================
    // Registry / Directory Errors (3xx)
    // =================================================================
    /// The name registry rejected our credentials.
    #[error("SM_ERR_300: Registry authentication failed: {0}")]
    Authentication(String),

    /// The name registry could not be reached or returned a server error.
    #[error("SM_ERR_301: Registry network error: {0}")]
    Network(String),

    /// The requested subname is already registered.
    #[error("SM_ERR_302: Subdomain is already registered: {0}")]
    NameTaken(String),

    /// A request is missing fields or carries invalid values.
    #[error("SM_ERR_303: Invalid request: {0}")]
    InvalidRequest(String),

    /// No managed record exists for the given name or address.
    #[error("SM_ERR_304: Record not found: {0}")]
    RecordNotFound(String),

    /// Rotation lost the compare-and-swap race on every attempt.
    #[error("SM_ERR_305: Rotation conflict for {name}: expected counter {expected}, found {actual}")]
    RotationConflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// The registry answered with a payload we could not interpret.
    #[error("SM_ERR_306: Unexpected registry response: {0}")]
    Registry(String),

    // =================================================================
    // Rollup Errors (4xx)
    // =================================================================
    /// Login to the settlement network failed.
    #[error("SM_ERR_400: Rollup authentication failed: {0}")]
    RollupAuthentication(String),

    /// A settlement-network call failed.
    #[error("SM_ERR_401: Rollup operation failed: {0}")]
    Rollup(String),

    /// The rollup's token list has no entry for the native asset.
    #[error("SM_ERR_402: Native token not found in rollup token list")]
    NativeTokenMissing,

    /// An amount could not be represented in the requested unit.
    #[error("SM_ERR_403: Amount conversion failed: {0}")]
    AmountConversion(String),

    // =================================================================
    // Chain Transport Errors (5xx)
    // =================================================================
    /// The base-chain RPC endpoint failed or disconnected.
    #[error("SM_ERR_500: Chain transport error: {0}")]
    Transport(String),

    /// The base-chain RPC returned data that does not decode.
    #[error("SM_ERR_501: Malformed chain data: {0}")]
    MalformedChainData(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (disk, network socket).
    #[error("SM_ERR_902: I/O error: {0}")]
    Io(String),

    /// A string could not be parsed as a 20-byte hex address.
    #[error("SM_ERR_903: Invalid address: {0}")]
    InvalidAddress(String),
}

impl StealthError {
    /// Stable short label used as the `error` field of API error bodies.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration error",
            Self::KeyDerivation(_) => "Key derivation failed",
            Self::Authentication(_) | Self::RollupAuthentication(_) => "Authentication failed",
            Self::Network(_) | Self::Transport(_) => "Network error",
            Self::NameTaken(_) => "Subdomain is already registered",
            Self::InvalidRequest(_) | Self::InvalidAddress(_) => "Invalid request",
            Self::RecordNotFound(_) => "Not found",
            Self::RotationConflict { .. } => "Rotation conflict",
            Self::Registry(_) => "Unexpected registry response",
            Self::Rollup(_) | Self::NativeTokenMissing | Self::AmountConversion(_) => {
                "Rollup operation failed"
            }
            Self::MalformedChainData(_) => "Malformed chain data",
            Self::Internal(_) | Self::Serialization(_) | Self::Io(_) => "Internal error",
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, StealthError>;

impl From<std::io::Error> for StealthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StealthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
