use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use stealthmax_types::{ServiceConfig, SettlementConfig, WatcherConfig, constants};

/// Command line arguments. Every flag can also be set from the environment.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    /// Parent ENS domain for managed subnames
    #[arg(long, env = "STEALTHMAX_DOMAIN", default_value = constants::DEFAULT_DOMAIN)]
    pub domain: String,

    /// HTTP listen address
    #[arg(long, env = "STEALTHMAX_LISTEN", default_value = constants::DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Base-chain JSON-RPC endpoint; built from ALCHEMY_KEY when absent
    #[arg(long, env = "STEALTHMAX_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Name-registry REST endpoint
    #[arg(long, env = "STEALTHMAX_REGISTRY_URL", default_value = constants::DEFAULT_REGISTRY_URL)]
    pub registry_url: String,

    /// Rollup gateway endpoint
    #[arg(long, env = "STEALTHMAX_ROLLUP_GATEWAY_URL", default_value = constants::DEFAULT_ROLLUP_GATEWAY_URL)]
    pub rollup_gateway_url: String,

    /// Block explorer root used in monitoring output
    #[arg(long, env = "STEALTHMAX_EXPLORER_URL", default_value = constants::DEFAULT_EXPLORER_URL)]
    pub explorer_url: String,

    /// Network label reported by the monitoring endpoints
    #[arg(long, env = "STEALTHMAX_NETWORK", default_value = constants::DEFAULT_NETWORK_NAME)]
    pub network: String,

    /// Seconds between chain head polls
    #[arg(long, env = "STEALTHMAX_POLL_INTERVAL_SECS", default_value_t = constants::DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Seconds between monitored-address refreshes
    #[arg(long, env = "STEALTHMAX_REFRESH_INTERVAL_SECS", default_value_t = constants::DEFAULT_REFRESH_INTERVAL_SECS)]
    pub refresh_interval_secs: u64,

    /// Seconds to wait before restarting a failed watcher
    #[arg(long, env = "STEALTHMAX_RESTART_DELAY_SECS", default_value_t = constants::DEFAULT_RESTART_DELAY_SECS)]
    pub restart_delay_secs: u64,

    /// Give up after this many consecutive watcher failures (unlimited when unset)
    #[arg(long, env = "STEALTHMAX_MAX_RESTARTS")]
    pub max_restarts: Option<u32>,

    /// Most blocks scanned in one catch-up pass
    #[arg(long, env = "STEALTHMAX_MAX_CATCH_UP_BLOCKS", default_value_t = constants::DEFAULT_MAX_CATCH_UP_BLOCKS)]
    pub max_catch_up_blocks: u64,

    /// Transaction hashes remembered to avoid settling one transfer twice
    #[arg(long, env = "STEALTHMAX_REPLAY_CACHE_SIZE", default_value_t = constants::DEFAULT_REPLAY_CACHE_SIZE)]
    pub replay_cache_size: usize,

    /// Compare-and-swap attempts for one rotation
    #[arg(long, env = "STEALTHMAX_ROTATION_MAX_ATTEMPTS", default_value_t = constants::DEFAULT_ROTATION_MAX_ATTEMPTS)]
    pub rotation_max_attempts: u32,

    /// Timeout for any single outbound HTTP request, in seconds
    #[arg(long, env = "STEALTHMAX_REQUEST_TIMEOUT_SECS", default_value_t = constants::DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "STEALTHMAX_LOG_JSON")]
    pub log_json: bool,

    /// Run against an in-memory registry, rollup and chain
    #[arg(long)]
    pub simulate: bool,
}

impl Args {
    pub(crate) fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            domain: self.domain.clone(),
            listen_addr: self.listen,
            rpc_url: self.rpc_url.clone(),
            registry_url: self.registry_url.clone(),
            rollup_gateway_url: self.rollup_gateway_url.clone(),
            explorer_url: self.explorer_url.clone(),
            network_name: self.network.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            watcher: WatcherConfig {
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                refresh_interval: Duration::from_secs(self.refresh_interval_secs),
                restart_delay: Duration::from_secs(self.restart_delay_secs),
                max_restarts: self.max_restarts,
                max_catch_up_blocks: self.max_catch_up_blocks,
                replay_cache_size: self.replay_cache_size,
            },
            settlement: SettlementConfig {
                rotation_max_attempts: self.rotation_max_attempts,
            },
        }
    }
}
