//! HTTP adapter for a rollup gateway sidecar.
//!
//! The sidecar wraps the rollup's client SDK and exposes it as JSON:
//!
//! | Call | Request |
//! |---|---|
//! | login | `POST /v1/session {eth_private_key}` → `{session, address}` |
//! | logout | `DELETE /v1/session` |
//! | tokens | `GET /v1/tokens` |
//! | balances | `GET /v1/balances` → `{balances}` |
//! | fee | `GET /v1/transfer-fee` → `{fee}` |
//! | broadcast | `POST /v1/transactions {transfers}` |
//! | deposit | `POST /v1/deposits` |
//! | history | `GET /v1/deposits`, `GET /v1/transfers` |
//!
//! Every call after login carries `Authorization: Bearer <session>`.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stealthmax_keys::DerivedKeypair;
use stealthmax_types::{Result, RollupAddress, StealthError};

use crate::rollup::{
    DepositParams, DepositReceipt, DepositRecord, RollupClient, RollupConnector, RollupToken,
    TokenBalance, TransferFee, TransferReceipt, TransferRecord, TransferRequest,
};

/// Creates [`RollupClient`]s that talk to one gateway.
#[derive(Clone)]
pub struct GatewayConnector {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayConnector {
    /// # Errors
    /// `Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StealthError::Configuration(format!("rollup http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RollupConnector for GatewayConnector {
    async fn connect(&self, keypair: &DerivedKeypair) -> Result<Box<dyn RollupClient>> {
        Ok(Box::new(GatewayClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            keypair: keypair.clone(),
            session: Mutex::new(None),
        }))
    }
}

#[derive(Serialize)]
struct LoginRequest {
    eth_private_key: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    session: String,
    address: String,
}

#[derive(Deserialize)]
struct BalancesResponse {
    balances: Vec<TokenBalance>,
}

#[derive(Deserialize)]
struct FeeResponse {
    #[serde(default)]
    fee: Option<TransferFee>,
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    transfers: &'a [TransferRequest],
}

struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    keypair: DerivedKeypair,
    session: Mutex<Option<String>>,
}

impl GatewayClient {
    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let session = self
            .session
            .lock()
            .clone()
            .ok_or_else(|| StealthError::Rollup("not logged in".into()))?;
        Ok(builder.bearer_auth(session))
    }

    async fn send(builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| StealthError::Rollup(format!("gateway unreachable: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StealthError::RollupAuthentication(format!("{status}: {body}"))
            }
            _ => StealthError::Rollup(format!("{status}: {body}")),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = Self::send(self.authed(self.http.get(self.url(path)))?).await?;
        decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = Self::send(self.authed(self.http.post(self.url(path)))?.json(body)).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| StealthError::Rollup(format!("undecodable gateway response: {e}")))
}

#[async_trait]
impl RollupClient for GatewayClient {
    async fn login(&self) -> Result<RollupAddress> {
        let body = LoginRequest {
            eth_private_key: self.keypair.private_key_hex(),
        };
        let response = Self::send(self.http.post(self.url("session")).json(&body))
            .await
            .map_err(|e| match e {
                StealthError::Rollup(m) => StealthError::RollupAuthentication(m),
                other => other,
            })?;
        let login: LoginResponse = decode(response).await?;
        *self.session.lock() = Some(login.session);
        tracing::debug!(account = %self.keypair.address(), rollup = %login.address, "Rollup session opened");
        Ok(RollupAddress::new(login.address))
    }

    async fn logout(&self) -> Result<()> {
        let builder = self.authed(self.http.delete(self.url("session")))?;
        Self::send(builder).await?;
        *self.session.lock() = None;
        Ok(())
    }

    async fn tokens(&self) -> Result<Vec<RollupToken>> {
        self.get("tokens").await
    }

    async fn token_balances(&self) -> Result<Vec<TokenBalance>> {
        let response: BalancesResponse = self.get("balances").await?;
        Ok(response.balances)
    }

    async fn transfer_fee(&self) -> Result<Option<TransferFee>> {
        let response: FeeResponse = self.get("transfer-fee").await?;
        Ok(response.fee)
    }

    async fn broadcast_transaction(
        &self,
        transfers: &[TransferRequest],
    ) -> Result<TransferReceipt> {
        self.post("transactions", &BroadcastRequest { transfers }).await
    }

    async fn deposit(&self, params: &DepositParams) -> Result<DepositReceipt> {
        self.post("deposits", params).await
    }

    async fn deposits(&self) -> Result<Vec<DepositRecord>> {
        self.get("deposits").await
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        self.get("transfers").await
    }
}
