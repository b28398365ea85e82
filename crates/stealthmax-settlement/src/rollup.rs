//! Settlement-network (rollup) ports.
//!
//! A [`RollupConnector`] turns a private key into a [`RollupClient`]; the
//! client must [`login`](RollupClient::login) before any other call and
//! should [`logout`](RollupClient::logout) when done. Amounts on these
//! interfaces are in the token's smallest unit unless stated otherwise.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stealthmax_keys::DerivedKeypair;
use stealthmax_types::{NativeAmount, Result, RollupAddress, StealthError, constants};

/// Serde helper: `u128` as a decimal string, accepting numbers too.
pub mod units {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.trim().parse().map_err(D::Error::custom),
            Raw::Number(n) => Ok(u128::from(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A token known to the rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupToken {
    pub token_index: u32,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: Option<u32>,
    pub contract_address: String,
}

impl RollupToken {
    /// The native asset entry (contract address zero, 18 decimals).
    #[must_use]
    pub fn native(token_index: u32) -> Self {
        Self {
            token_index,
            symbol: "ETH".into(),
            decimals: Some(constants::NATIVE_DECIMALS),
            contract_address: constants::NATIVE_TOKEN_CONTRACT.into(),
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.contract_address
            .eq_ignore_ascii_case(constants::NATIVE_TOKEN_CONTRACT)
    }

    /// Declared decimals, defaulting to the native asset's 18.
    #[must_use]
    pub fn decimals(&self) -> u32 {
        self.decimals.unwrap_or(constants::NATIVE_DECIMALS)
    }
}

/// Pick the native asset out of a token list.
///
/// # Errors
/// `NativeTokenMissing` if no entry has the zero contract address.
pub fn native_token(tokens: &[RollupToken]) -> Result<RollupToken> {
    tokens
        .iter()
        .find(|t| t.is_native())
        .cloned()
        .ok_or(StealthError::NativeTokenMissing)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token_index: u32,
    #[serde(with = "units")]
    pub amount: u128,
}

/// Balance of `token` in `balances`, zero if absent.
#[must_use]
pub fn balance_of(balances: &[TokenBalance], token: &RollupToken) -> u128 {
    balances
        .iter()
        .find(|b| b.token_index == token.token_index)
        .map_or(0, |b| b.amount)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFee {
    pub token_index: u32,
    #[serde(with = "units")]
    pub amount: u128,
}

/// One recipient of a rollup transfer. `amount` is in native units (ether).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: NativeAmount,
    pub token: RollupToken,
    pub address: RollupAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Deposit from the client's base-chain key into a rollup account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositParams {
    /// Smallest token units.
    #[serde(with = "units")]
    pub amount: u128,
    pub token: RollupToken,
    pub address: RollupAddress,
    pub is_mining: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub tx_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    ReadyToClaim,
    Processing,
    Completed,
    Rejected,
    NeedToClaim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub token_index: u32,
    #[serde(with = "units")]
    pub amount: u128,
    pub status: DepositStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub token_index: u32,
    #[serde(with = "units")]
    pub amount: u128,
    pub recipient: RollupAddress,
    pub status: TransferStatus,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// A session with the rollup on behalf of one private key.
#[async_trait]
pub trait RollupClient: Send + Sync {
    /// Authenticate and return the account's rollup address.
    async fn login(&self) -> Result<RollupAddress>;

    async fn logout(&self) -> Result<()>;

    async fn tokens(&self) -> Result<Vec<RollupToken>>;

    async fn token_balances(&self) -> Result<Vec<TokenBalance>>;

    /// Current transfer fee, if the rollup charges one.
    async fn transfer_fee(&self) -> Result<Option<TransferFee>>;

    async fn broadcast_transaction(&self, transfers: &[TransferRequest])
    -> Result<TransferReceipt>;

    async fn deposit(&self, params: &DepositParams) -> Result<DepositReceipt>;

    async fn deposits(&self) -> Result<Vec<DepositRecord>>;

    async fn transfers(&self) -> Result<Vec<TransferRecord>>;
}

/// Factory for [`RollupClient`] sessions.
#[async_trait]
pub trait RollupConnector: Send + Sync {
    /// Create a client for `keypair`. The client is not yet logged in.
    async fn connect(&self, keypair: &DerivedKeypair) -> Result<Box<dyn RollupClient>>;
}
