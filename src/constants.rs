//! Constants for the token price poller
//!
//! Defaults for every tunable live here. `PollerConfig::default()` is built
//! from these values and `PollerConfig::from_env()` only overrides the
//! credential and the API base URL.

/// Minimum spacing between two granted fetch cycles (in milliseconds)
pub const MIN_REQUEST_INTERVAL_MS: u64 = 5000;

/// Delay after a cycle completes before the next scheduled cycle (in seconds)
pub const POLL_INTERVAL_SECS: u64 = 5;

/// Minimum spacing between two manual refreshes of one poller (in seconds)
pub const MANUAL_REFRESH_INTERVAL_SECS: u64 = 5;

/// Delay between sequential per-asset requests in primary mode (in seconds)
pub const INTER_REQUEST_DELAY_SECS: u64 = 2;

/// HTTP request timeout when fetching prices (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Consecutive 429 responses after which the fallback endpoint is used
pub const RATE_LIMIT_THRESHOLD: u32 = 1;

/// HTTP status returned by the upstream when rate limiting
pub const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Birdeye API base URL
pub const BIRDEYE_API_URL: &str = "https://public-api.birdeye.so";

/// Authenticated price endpoint
pub const PRIMARY_PRICE_ENDPOINT: &str = "/defi/price";

/// Unauthenticated public price endpoint
pub const FALLBACK_PRICE_ENDPOINT: &str = "/public/price";

/// Header carrying the API key on the primary endpoint
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Header selecting the chain on the primary endpoint
pub const CHAIN_HEADER: &str = "x-chain";

/// Chain queried by the primary endpoint
pub const CHAIN_NAME: &str = "solana";

/// Environment variable holding the API key
pub const API_KEY_ENV_VAR: &str = "BIRDEYE_API_KEY";

/// Environment variable overriding the API base URL
pub const API_URL_ENV_VAR: &str = "BIRDEYE_API_URL";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "token-price-poller/0.1.0";

/// Advisory surfaced to consumers while serving fallback prices
pub const FALLBACK_ADVISORY: &str = "Using public endpoint due to rate limiting";

/// Wrapped SOL mint
pub const SOL_SYMBOL: &str = "SOL";
pub const SOL_ADDRESS: &str = "So11111111111111111111111111111111111111112";

/// BONK mint
pub const BONK_SYMBOL: &str = "BONK";
pub const BONK_ADDRESS: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
