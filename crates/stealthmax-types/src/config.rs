//! Configuration types for a StealthMax node.

use std::{fmt, net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, StealthError, constants};

/// Environment variable holding the root secret (hex, 32 bytes).
pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
/// Environment variable holding the name-registry API key.
pub const REGISTRY_API_KEY_VAR: &str = "NAMESTONE_API_KEY";
/// Environment variable holding the base-chain RPC provider key.
pub const RPC_API_KEY_VAR: &str = "ALCHEMY_KEY";

/// Configuration for a single StealthMax node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Parent ENS domain for managed subnames.
    pub domain: String,
    /// Address to listen on for the HTTP API.
    pub listen_addr: SocketAddr,
    /// Base-chain JSON-RPC endpoint. `None` means "derive from the provider key".
    pub rpc_url: Option<String>,
    /// Name-registry REST endpoint.
    pub registry_url: String,
    /// Rollup gateway endpoint.
    pub rollup_gateway_url: String,
    /// Block explorer root used in monitoring output.
    pub explorer_url: String,
    /// Human label of the base-chain network.
    pub network_name: String,
    /// Upper bound on any single outbound HTTP request.
    pub request_timeout: Duration,
    /// Block watcher configuration.
    pub watcher: WatcherConfig,
    /// Settlement orchestrator configuration.
    pub settlement: SettlementConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            domain: constants::DEFAULT_DOMAIN.to_string(),
            listen_addr: constants::DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3000))),
            rpc_url: None,
            registry_url: constants::DEFAULT_REGISTRY_URL.to_string(),
            rollup_gateway_url: constants::DEFAULT_ROLLUP_GATEWAY_URL.to_string(),
            explorer_url: constants::DEFAULT_EXPLORER_URL.to_string(),
            network_name: constants::DEFAULT_NETWORK_NAME.to_string(),
            request_timeout: Duration::from_secs(constants::DEFAULT_REQUEST_TIMEOUT_SECS),
            watcher: WatcherConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// `Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(StealthError::Configuration("domain must not be empty".into()));
        }
        if self.watcher.poll_interval.is_zero() {
            return Err(StealthError::Configuration(
                "watcher.poll_interval must be > 0".into(),
            ));
        }
        if self.watcher.refresh_interval.is_zero() {
            return Err(StealthError::Configuration(
                "watcher.refresh_interval must be > 0".into(),
            ));
        }
        if self.watcher.replay_cache_size == 0 {
            return Err(StealthError::Configuration(
                "watcher.replay_cache_size must be > 0".into(),
            ));
        }
        if self.settlement.rotation_max_attempts == 0 {
            return Err(StealthError::Configuration(
                "settlement.rotation_max_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// The JSON-RPC URL to use, falling back to the default provider URL
    /// built from `rpc_api_key`.
    ///
    /// # Errors
    /// `Configuration` if neither an explicit URL nor a provider key exists.
    pub fn resolve_rpc_url(&self, secrets: &Secrets) -> Result<String> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.clone());
        }
        secrets
            .rpc_api_key
            .as_deref()
            .map(|key| format!("{}{key}", constants::DEFAULT_RPC_URL_PREFIX))
            .ok_or_else(|| {
                StealthError::Configuration(format!("{RPC_API_KEY_VAR} environment variable is required"))
            })
    }

    /// Explorer link for an address.
    #[must_use]
    pub fn explorer_address_url(&self, address: &str) -> String {
        format!("{}/address/{address}", self.explorer_url.trim_end_matches('/'))
    }
}

/// Block watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How often the chain head is polled.
    pub poll_interval: Duration,
    /// How often the monitored address set is reloaded from the directory.
    pub refresh_interval: Duration,
    /// Back-off before restarting the watcher after a transport error.
    pub restart_delay: Duration,
    /// Stop restarting after this many consecutive failures. `None` = never stop.
    pub max_restarts: Option<u32>,
    /// Upper bound on blocks scanned in one catch-up pass.
    pub max_catch_up_blocks: u64,
    /// Number of transaction hashes remembered to avoid double settlement.
    pub replay_cache_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(constants::DEFAULT_POLL_INTERVAL_SECS),
            refresh_interval: Duration::from_secs(constants::DEFAULT_REFRESH_INTERVAL_SECS),
            restart_delay: Duration::from_secs(constants::DEFAULT_RESTART_DELAY_SECS),
            max_restarts: None,
            max_catch_up_blocks: constants::DEFAULT_MAX_CATCH_UP_BLOCKS,
            replay_cache_size: constants::DEFAULT_REPLAY_CACHE_SIZE,
        }
    }
}

/// Settlement orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Compare-and-swap attempts for one rotation before giving up.
    pub rotation_max_attempts: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            rotation_max_attempts: constants::DEFAULT_ROTATION_MAX_ATTEMPTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Credentials loaded from the environment. `Debug` never prints values.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Root secret, hex encoded.
    pub private_key: Option<String>,
    /// Name-registry API key.
    pub registry_api_key: Option<String>,
    /// Base-chain RPC provider key.
    pub rpc_api_key: Option<String>,
}

impl Secrets {
    /// Load secrets through `lookup` (normally `std::env::var(..).ok()`).
    /// Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        Self {
            private_key: get(PRIVATE_KEY_VAR),
            registry_api_key: get(REGISTRY_API_KEY_VAR),
            rpc_api_key: get(RPC_API_KEY_VAR),
        }
    }

    /// The root secret, or a `Configuration` error.
    pub fn require_private_key(&self) -> Result<&str> {
        self.private_key.as_deref().ok_or_else(|| {
            StealthError::Configuration(format!("{PRIVATE_KEY_VAR} environment variable is required"))
        })
    }

    /// The registry API key, or a `Configuration` error.
    pub fn require_registry_api_key(&self) -> Result<&str> {
        self.registry_api_key.as_deref().ok_or_else(|| {
            StealthError::Configuration(format!(
                "{REGISTRY_API_KEY_VAR} environment variable is required"
            ))
        })
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("private_key", &mark(&self.private_key))
            .field("registry_api_key", &mark(&self.registry_api_key))
            .field("rpc_api_key", &mark(&self.rpc_api_key))
            .finish()
    }
}
