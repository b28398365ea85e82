//! Request handlers. Each one is a thin adapter over the directory, key
//! derivation or the settlement orchestrator.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stealthmax_directory::{MonitoredDetail, MonitoredName, NamePair, NameRegistry};
use stealthmax_settlement::{DepositRecord, TokenBalance, TransferRecord};
use stealthmax_types::{NativeAmount, RollupAddress, SettlementResult, constants};

use crate::error::{ApiError, failed_settlement};
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Success envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        success: true,
        data,
        timestamp: Utc::now(),
    }))
}

// =============================================================================
// Service info
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Greeting {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub server: String,
}

pub async fn greeting() -> Json<Greeting> {
    Json(Greeting {
        message: "StealthMax Substream API - Ready for ETH monitoring and INTMAX deposits!".into(),
        timestamp: Utc::now(),
        server: format!("{} {}", constants::SERVICE_NAME, constants::VERSION),
    })
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since the router was built.
    pub uptime: f64,
    pub service: &'static str,
    pub version: &'static str,
    pub monitored_addresses: usize,
}

pub async fn health<R: NameRegistry>(State(state): State<AppState<R>>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.started_at.elapsed().as_secs_f64(),
        service: constants::SERVICE_NAME,
        version: constants::VERSION,
        monitored_addresses: state.book.snapshot().len(),
    })
}

// =============================================================================
// Registration and derivation
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub subname: String,
    #[serde(default)]
    pub intmax_address: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequestData {
    pub domain: String,
    pub subname: String,
    pub intmax_address: RollupAddress,
    pub derived_address: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub request_data: RegisterRequestData,
}

pub async fn register<R: NameRegistry>(
    State(state): State<AppState<R>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<RegisterResponse> {
    let Json(request) = body?;
    let registration = state
        .registration
        .register(&request.subname, &request.intmax_address)
        .await
        .map_err(ApiError::context("Failed to register"))?;
    state
        .book
        .insert(&registration.subname, registration.derived_address);

    ok(RegisterResponse {
        message: "Registration completed successfully!",
        request_data: RegisterRequestData {
            domain: registration.domain,
            subname: registration.subname,
            intmax_address: registration.intmax_address,
            derived_address: registration.derived_address.to_checksum(),
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct DeriveRequest {
    #[serde(default)]
    pub parameter: String,
}

#[derive(Debug, Serialize)]
pub struct DeriveResponse {
    pub parameter: String,
    pub derived_address: String,
}

pub async fn derive_address<R: NameRegistry>(
    State(state): State<AppState<R>>,
    body: Result<Json<DeriveRequest>, JsonRejection>,
) -> ApiResult<DeriveResponse> {
    let Json(request) = body?;
    let address = state
        .registration
        .derive_address(&request.parameter)
        .map_err(ApiError::context("Failed to derive address"))?;
    ok(DeriveResponse {
        parameter: request.parameter,
        derived_address: address.to_checksum(),
    })
}

// =============================================================================
// Listings
// =============================================================================

#[derive(Debug, Serialize)]
pub struct NamesResponse {
    pub domain: String,
    pub count: usize,
    pub names: Vec<NamePair>,
}

pub async fn names<R: NameRegistry>(State(state): State<AppState<R>>) -> ApiResult<NamesResponse> {
    let names = state
        .registration
        .list_names()
        .await
        .map_err(ApiError::context("Failed to retrieve names"))?;
    ok(NamesResponse {
        domain: state.registration.domain().to_string(),
        count: names.len(),
        names,
    })
}

#[derive(Debug, Serialize)]
pub struct MonitoringResponse<T> {
    pub monitoring: bool,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub addresses_count: usize,
    pub addresses: Vec<T>,
    pub last_updated: String,
}

fn monitoring<T>(
    state: &AppState<impl NameRegistry>,
    domain: bool,
    addresses: Vec<T>,
) -> MonitoringResponse<T> {
    MonitoringResponse {
        monitoring: true,
        network: state.config.network_name.clone(),
        domain: domain.then(|| state.registration.domain().to_string()),
        addresses_count: addresses.len(),
        addresses,
        last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

pub async fn monitoring_status<R: NameRegistry>(
    State(state): State<AppState<R>>,
) -> ApiResult<MonitoringResponse<MonitoredName>> {
    let addresses = state
        .registration
        .monitoring_status()
        .await
        .map_err(ApiError::context("Failed to get monitoring status"))?;
    ok(monitoring(&state, false, addresses))
}

pub async fn monitoring_details<R: NameRegistry>(
    State(state): State<AppState<R>>,
) -> ApiResult<MonitoringResponse<MonitoredDetail>> {
    let addresses = state
        .registration
        .monitoring_details()
        .await
        .map_err(ApiError::context("Failed to get monitoring details"))?;
    ok(monitoring(&state, true, addresses))
}

// =============================================================================
// Rollup
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    #[serde(default)]
    pub parameter: String,
    /// Ether, as a decimal string or a JSON number.
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub intmax_address: Option<String>,
}

impl DepositRequest {
    fn amount(&self) -> Result<Option<NativeAmount>, ApiError> {
        let text = match &self.amount {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return Ok(None),
        };
        let amount = NativeAmount::from_ether_str(&text)
            .map_err(|e| ApiError::invalid(format!("Invalid amount {text}: {e}")))?;
        Ok((!amount.is_zero()).then_some(amount))
    }
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub result: SettlementResult,
}

pub async fn deposit<R: NameRegistry>(
    State(state): State<AppState<R>>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let amount = match request.amount()? {
        Some(amount) if !request.parameter.trim().is_empty() => amount,
        _ => return Err(ApiError::invalid("Parameter and amount are required")),
    };
    let target = request
        .intmax_address
        .filter(|a| !a.trim().is_empty())
        .map(RollupAddress::new);

    let result = state
        .orchestrator
        .settle_manual(request.parameter.trim(), amount, target)
        .await
        .map_err(ApiError::context("Failed to deposit to INTMAX"))?;

    if !result.success {
        return Ok(failed_settlement(result.error));
    }
    Ok(ok(DepositResponse {
        message: "INTMAX deposit successful",
        result,
    })?
    .into_response())
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub parameter: String,
    pub rollup_address: RollupAddress,
    pub balances: Vec<TokenBalance>,
}

pub async fn balances<R: NameRegistry>(
    State(state): State<AppState<R>>,
    Path(parameter): Path<String>,
) -> ApiResult<BalancesResponse> {
    let view = state
        .orchestrator
        .balances(&parameter)
        .await
        .map_err(ApiError::context("Failed to get INTMAX balances"))?;
    ok(BalancesResponse {
        parameter,
        rollup_address: view.rollup_address,
        balances: view.data,
    })
}

#[derive(Debug, Serialize)]
pub struct DepositsResponse {
    pub parameter: String,
    pub rollup_address: RollupAddress,
    pub deposits: Vec<DepositRecord>,
}

pub async fn deposits<R: NameRegistry>(
    State(state): State<AppState<R>>,
    Path(parameter): Path<String>,
) -> ApiResult<DepositsResponse> {
    let view = state
        .orchestrator
        .deposits(&parameter)
        .await
        .map_err(ApiError::context("Failed to get INTMAX deposits"))?;
    ok(DepositsResponse {
        parameter,
        rollup_address: view.rollup_address,
        deposits: view.data,
    })
}

#[derive(Debug, Serialize)]
pub struct TransfersResponse {
    pub parameter: String,
    pub rollup_address: RollupAddress,
    pub transfers: Vec<TransferRecord>,
}

pub async fn transfers<R: NameRegistry>(
    State(state): State<AppState<R>>,
    Path(parameter): Path<String>,
) -> ApiResult<TransfersResponse> {
    let view = state
        .orchestrator
        .transfers(&parameter)
        .await
        .map_err(ApiError::context("Failed to get INTMAX transfers"))?;
    ok(TransfersResponse {
        parameter,
        rollup_address: view.rollup_address,
        transfers: view.data,
    })
}

#[derive(Debug, Serialize)]
pub struct MasterAccountResponse {
    pub rollup_address: RollupAddress,
    pub balances: Vec<TokenBalance>,
}

pub async fn master_account<R: NameRegistry>(
    State(state): State<AppState<R>>,
) -> ApiResult<MasterAccountResponse> {
    let view = state
        .orchestrator
        .master_account()
        .await
        .map_err(ApiError::context("Failed to get master account"))?;
    ok(MasterAccountResponse {
        rollup_address: view.rollup_address,
        balances: view.data,
    })
}
