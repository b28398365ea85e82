//! Namestone REST adapter for [`NameRegistry`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use stealthmax_types::{Result, StealthError};

use crate::registry::{NameRegistry, RegistryEntry};

/// HTTP client for the hosted Namestone registry.
///
/// The API key is sent verbatim in the `Authorization` header.
pub struct NamestoneClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SetNameBody<'a> {
    domain: &'a str,
    name: &'a str,
    address: &'a str,
    text_records: &'a std::collections::BTreeMap<String, String>,
}

impl NamestoneClient {
    /// Create a client for `base_url` (e.g. `https://namestone.com/api/public_v1`).
    ///
    /// # Errors
    /// `Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StealthError::Configuration(format!("registry http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StealthError::Registry(format!("undecodable response: {e}")))
    }
}

/// Map transport failures and HTTP status codes onto the error taxonomy.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> StealthError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StealthError::Authentication(detail),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StealthError::Network(detail)
        }
        _ => StealthError::Registry(detail),
    }
}

fn transport_error(err: &reqwest::Error) -> StealthError {
    StealthError::Network(err.to_string())
}

#[async_trait]
impl NameRegistry for NamestoneClient {
    async fn get_names(&self, domain: &str) -> Result<Vec<RegistryEntry>> {
        let response = self
            .http
            .get(self.url("get-names"))
            .header("Authorization", &self.api_key)
            .query(&[("domain", domain), ("text_records", "1")])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let mut entries: Vec<RegistryEntry> = Self::read_json(response).await?;
        for entry in &mut entries {
            if entry.domain.is_empty() {
                entry.domain = domain.to_string();
            }
        }
        tracing::debug!(domain, count = entries.len(), "Fetched registry names");
        Ok(entries)
    }

    async fn search_names(
        &self,
        domain: &str,
        name: &str,
        exact: bool,
    ) -> Result<Vec<RegistryEntry>> {
        let response = self
            .http
            .get(self.url("search-names"))
            .header("Authorization", &self.api_key)
            .query(&[
                ("domain", domain),
                ("name", name),
                ("exact_match", if exact { "1" } else { "0" }),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let mut entries: Vec<RegistryEntry> = Self::read_json(response).await?;
        for entry in &mut entries {
            if entry.domain.is_empty() {
                entry.domain = domain.to_string();
            }
        }
        Ok(entries)
    }

    async fn set_name(&self, entry: &RegistryEntry) -> Result<()> {
        let body = SetNameBody {
            domain: &entry.domain,
            name: &entry.name,
            address: &entry.address,
            text_records: &entry.text_records,
        };
        let response = self
            .http
            .post(self.url("set-name"))
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        check_status(response).await?;
        tracing::info!(name = %entry.name, domain = %entry.domain, address = %entry.address, "Registry entry written");
        Ok(())
    }
}
