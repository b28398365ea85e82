//! System-wide constants for StealthMax.

/// Parent ENS domain under which every managed subname lives.
pub const DEFAULT_DOMAIN: &str = "stealthmax.eth";

/// Decimal places of the base chain's native asset (ETH → wei).
pub const NATIVE_DECIMALS: u32 = 18;

/// Contract address the rollup uses to denote the native asset.
pub const NATIVE_TOKEN_CONTRACT: &str = "0x0000000000000000000000000000000000000000";

/// Default API listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Default base-chain JSON-RPC endpoint prefix (the API key is appended).
pub const DEFAULT_RPC_URL_PREFIX: &str = "https://eth-sepolia.g.alchemy.com/v2/";

/// Default name-registry REST endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://namestone.com/api/public_v1";

/// Default rollup gateway endpoint.
pub const DEFAULT_ROLLUP_GATEWAY_URL: &str = "http://127.0.0.1:8545";

/// Default block explorer root used in monitoring output.
pub const DEFAULT_EXPLORER_URL: &str = "https://sepolia.etherscan.io";

/// Default network label.
pub const DEFAULT_NETWORK_NAME: &str = "sepolia";

/// Monitored-address refresh interval in seconds (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Block polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 4;

/// Delay before the block watcher is restarted after a transport error.
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 10;

/// Upper bound on blocks scanned in one catch-up pass.
pub const DEFAULT_MAX_CATCH_UP_BLOCKS: u64 = 64;

/// Compare-and-swap attempts for a single address rotation.
pub const DEFAULT_ROTATION_MAX_ATTEMPTS: u32 = 3;

/// Number of base-chain transaction hashes the watcher remembers as handled.
pub const DEFAULT_REPLAY_CACHE_SIZE: usize = 100_000;

/// Per-request timeout for outbound HTTP adapters, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Text-record key holding the `{ intmax_address, nonce }` payload.
pub const DESCRIPTION_RECORD_KEY: &str = "description";

/// Static text records written on every registration.
pub const DEFAULT_TEXT_RECORDS: &[(&str, &str)] = &[
    ("com.twitter", "substream"),
    ("com.github", "substream"),
    ("url", "https://www.substream.xyz"),
    (
        "avatar",
        "https://imagedelivery.net/UJ5oN2ajUBrk2SVxlns2Aw/e52988ee-9840-48a2-d8d9-8a92594ab200/public",
    ),
];

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "stealthmax-substream";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
