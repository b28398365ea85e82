//! Base-chain access.
//!
//! [`ChainSource`] is the port; [`JsonRpcChainSource`] polls an Ethereum
//! JSON-RPC endpoint and [`ScriptedChain`] serves blocks from memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stealthmax_types::{Address, NativeAmount, Result, StealthError, TxHash};

/// A transaction as far as native transfers are concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: NativeAmount,
}

/// A block with its transactions in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub transactions: Vec<ChainTransaction>,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current head block number.
    async fn latest_block(&self) -> Result<u64>;

    /// Block `number` with full transactions, `None` if the node does not
    /// have it (yet).
    async fn block(&self, number: u64) -> Result<Option<ChainBlock>>;
}

// =============================================================================
// JSON-RPC
// =============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: String,
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
}

impl RpcBlock {
    fn decode(self) -> Result<ChainBlock> {
        let number = parse_hex_u64(&self.number)?;
        let transactions = self
            .transactions
            .into_iter()
            .map(RpcTransaction::decode)
            .collect::<Result<Vec<_>>>()?;
        Ok(ChainBlock {
            number,
            transactions,
        })
    }
}

impl RpcTransaction {
    fn decode(self) -> Result<ChainTransaction> {
        let malformed = |e: StealthError| StealthError::MalformedChainData(format!("tx {}: {e}", self.hash));
        Ok(ChainTransaction {
            hash: self.hash.parse()?,
            from: self.from.parse().map_err(malformed)?,
            to: self
                .to
                .as_deref()
                .map(str::parse::<Address>)
                .transpose()
                .map_err(malformed)?,
            value: NativeAmount::from_wei(parse_hex_u128(&self.value)?),
        })
    }
}

/// Parse a `0x`-prefixed quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| StealthError::MalformedChainData(format!("quantity {s}: {e}")))
}

/// Parse a `0x`-prefixed quantity that may exceed 64 bits (wei values).
pub fn parse_hex_u128(s: &str) -> Result<u128> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| StealthError::MalformedChainData(format!("quantity {s}: {e}")))
}

/// Polls an Ethereum JSON-RPC endpoint over HTTP.
pub struct JsonRpcChainSource {
    http: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl JsonRpcChainSource {
    /// # Errors
    /// `Configuration` if the HTTP client cannot be built.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StealthError::Configuration(format!("rpc http client: {e}")))?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<R>> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| StealthError::Transport(format!("{method}: {e}")))?;
        if !response.status().is_success() {
            return Err(StealthError::Transport(format!(
                "{method}: HTTP {}",
                response.status()
            )));
        }

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| StealthError::MalformedChainData(format!("{method}: {e}")))?;
        if let Some(error) = rpc_response.error {
            return Err(StealthError::Transport(format!(
                "{method}: RPC error {}: {}",
                error.code, error.message
            )));
        }
        Ok(rpc_response.result)
    }
}

#[async_trait]
impl ChainSource for JsonRpcChainSource {
    async fn latest_block(&self) -> Result<u64> {
        let result: String = self
            .call("eth_blockNumber", Vec::<()>::new())
            .await?
            .ok_or_else(|| StealthError::MalformedChainData("eth_blockNumber: missing result".into()))?;
        parse_hex_u64(&result)
    }

    async fn block(&self, number: u64) -> Result<Option<ChainBlock>> {
        let params = (format!("0x{number:x}"), true);
        let block: Option<RpcBlock> = self.call("eth_getBlockByNumber", params).await?;
        block.map(RpcBlock::decode).transpose()
    }
}

// =============================================================================
// Scripted
// =============================================================================

/// In-memory chain: blocks are pushed by the caller, failures injected on demand.
#[derive(Default)]
pub struct ScriptedChain {
    blocks: Mutex<BTreeMap<u64, ChainBlock>>,
    failures: Mutex<u32>,
    block_requests: AtomicU64,
}

impl ScriptedChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `block`; the head becomes its number if that is higher.
    pub fn push(&self, block: ChainBlock) {
        self.blocks.lock().insert(block.number, block);
    }

    /// Make the next `count` calls fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock() = count;
    }

    /// Number of `block` requests served or failed.
    #[must_use]
    pub fn block_requests(&self) -> u64 {
        self.block_requests.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(StealthError::Transport("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for ScriptedChain {
    async fn latest_block(&self) -> Result<u64> {
        self.check()?;
        Ok(self.blocks.lock().keys().next_back().copied().unwrap_or(0))
    }

    async fn block(&self, number: u64) -> Result<Option<ChainBlock>> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.blocks.lock().get(&number).cloned())
    }
}
