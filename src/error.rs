//! Error types for the token price poller

use crate::constants::HTTP_TOO_MANY_REQUESTS;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when requesting one price from an upstream endpoint
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Upstream answered 429
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Upstream answered with another non-success status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Authenticated endpoint requested without an API key
    #[error("API key not configured")]
    MissingCredential,
}

impl ProviderError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimitExceeded => Some(HTTP_TOO_MANY_REQUESTS),
            ProviderError::HttpStatus { status, .. } => Some(*status),
            ProviderError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Why the coordinator refused to start a fetch cycle
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Another cycle is currently executing
    #[error("a price request is already in flight")]
    AlreadyInFlight,

    /// The minimum spacing since the last granted cycle has not elapsed
    #[error("too soon, retry in {}ms", .wait.as_millis())]
    TooSoon { wait: Duration },
}

/// Outcome taxonomy of a fetch cycle
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("Global request already in progress")]
    AlreadyInFlight,

    #[error("Rate limiting: retry in {}ms", .wait.as_millis())]
    TooSoon { wait: Duration },

    #[error("Birdeye API key not configured")]
    MissingCredential,

    #[error("API rate limit reached ({count}/{threshold}). Switching to public endpoint.")]
    RateLimited { count: u32, threshold: u32 },

    #[error("Upstream error: {}", describe_upstream(.status, .message))]
    UpstreamError { status: Option<u16>, message: String },

    #[error("Price data not found in API response: {0}")]
    MalformedResponse(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),
}

fn describe_upstream(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(status) if message.is_empty() => format!("HTTP {}", status),
        Some(status) => format!("HTTP {} {}", status, message),
        None => message.to_string(),
    }
}

impl FetchError {
    /// True for the two denial variants, which never touch consumer state
    pub fn is_denial(&self) -> bool {
        matches!(self, FetchError::AlreadyInFlight | FetchError::TooSoon { .. })
    }

    /// True when the previous snapshot must be preserved rather than cleared
    pub fn preserves_snapshot(&self) -> bool {
        self.is_denial() || matches!(self, FetchError::RateLimited { .. })
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::UpstreamError {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        FetchError::MalformedResponse(msg.into())
    }
}

impl From<DenyReason> for FetchError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::AlreadyInFlight => FetchError::AlreadyInFlight,
            DenyReason::TooSoon { wait } => FetchError::TooSoon { wait },
        }
    }
}

/// Maps request-level errors onto the cycle taxonomy.
///
/// `RateLimitExceeded` maps to a plain upstream error here; the engine turns
/// primary-mode 429s into `RateLimited` itself since that needs coordinator state.
impl From<ProviderError> for FetchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NetworkError(e) if e.is_timeout() => {
                FetchError::upstream(None, "request timed out")
            }
            ProviderError::NetworkError(e) if e.is_decode() => FetchError::malformed(e.to_string()),
            ProviderError::NetworkError(e) => FetchError::NetworkFailure(e.to_string()),
            ProviderError::RateLimitExceeded => {
                FetchError::upstream(Some(HTTP_TOO_MANY_REQUESTS), "Too Many Requests")
            }
            ProviderError::HttpStatus { status, body } => FetchError::upstream(Some(status), body),
            ProviderError::InvalidResponse(msg) => FetchError::MalformedResponse(msg),
            ProviderError::Timeout => FetchError::upstream(None, "request timed out"),
            ProviderError::MissingCredential => FetchError::MissingCredential,
        }
    }
}

/// Errors raised while building or validating a `PollerConfig`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No tracked assets configured")]
    NoAssets,

    #[error("Duplicate asset symbol: {0}")]
    DuplicateSymbol(String),

    #[error("Invalid token address for {symbol}: {address}")]
    InvalidAddress { symbol: String, address: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors surfaced by the wallet adapter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WalletError {
    #[error("Wallet not found. Please install a wallet extension.")]
    NotFound,

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Failed to disconnect wallet: {0}")]
    DisconnectFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message_mentions_rate_limit() {
        let err = FetchError::RateLimited {
            count: 1,
            threshold: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("rate limit"));
        assert!(msg.contains("(1/1)"));
        assert!(err.preserves_snapshot());
    }

    #[test]
    fn test_provider_error_mapping() {
        assert_eq!(
            FetchError::from(ProviderError::MissingCredential),
            FetchError::MissingCredential
        );
        assert_eq!(
            FetchError::from(ProviderError::Timeout),
            FetchError::upstream(None, "request timed out")
        );

        let mapped = FetchError::from(ProviderError::HttpStatus {
            status: 500,
            body: "Internal Server Error".to_string(),
        });
        assert_eq!(mapped.to_string(), "Upstream error: HTTP 500 Internal Server Error");
        assert!(!mapped.preserves_snapshot());
    }

    #[test]
    fn test_denials_are_not_failures() {
        let err = FetchError::from(DenyReason::TooSoon {
            wait: Duration::from_millis(1200),
        });
        assert!(err.is_denial());
        assert!(err.to_string().contains("1200ms"));
        assert!(!FetchError::MissingCredential.is_denial());
    }
}
