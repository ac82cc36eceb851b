//! Poller configuration
//!
//! Every field defaults to the value in `constants`. Only the API key and the
//! base URL are read from the environment; a missing key is not an error here,
//! it surfaces later as `FetchError::MissingCredential` on primary-mode cycles.

use crate::{
    constants::{
        API_KEY_ENV_VAR, API_URL_ENV_VAR, BIRDEYE_API_URL, INTER_REQUEST_DELAY_SECS,
        MANUAL_REFRESH_INTERVAL_SECS, MIN_REQUEST_INTERVAL_MS, POLL_INTERVAL_SECS,
        RATE_LIMIT_THRESHOLD, REQUEST_TIMEOUT_SECS,
    },
    error::ConfigError,
    types::TrackedAsset,
};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub api_base_url: String,

    /// API key for the authenticated endpoint (never serialized)
    #[serde(skip)]
    pub api_key: Option<String>,

    pub assets: Vec<TrackedAsset>,
    pub poll_interval: Duration,
    pub min_request_interval: Duration,
    pub manual_refresh_interval: Duration,
    pub inter_request_delay: Duration,
    pub request_timeout: Duration,
    pub rate_limit_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            api_base_url: BIRDEYE_API_URL.to_string(),
            api_key: None,
            assets: TrackedAsset::defaults(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            min_request_interval: Duration::from_millis(MIN_REQUEST_INTERVAL_MS),
            manual_refresh_interval: Duration::from_secs(MANUAL_REFRESH_INTERVAL_SECS),
            inter_request_delay: Duration::from_secs(INTER_REQUEST_DELAY_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            rate_limit_threshold: RATE_LIMIT_THRESHOLD,
        }
    }
}

impl PollerConfig {
    /// Defaults plus the credential and base URL from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(
            std::env::var(API_KEY_ENV_VAR).ok(),
            std::env::var(API_URL_ENV_VAR).ok(),
        )
    }

    /// Defaults plus an optional credential and base URL override.
    ///
    /// A blank key means no credential. The URL is trimmed of whitespace and
    /// trailing slashes; a blank URL keeps the default.
    pub fn from_values(
        api_key: Option<String>,
        api_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        if let Some(url) = api_url {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.api_base_url = url.to_string();
            }
        }

        info!(
            api_key_present = config.api_key.is_some(),
            api_base_url = %config.api_base_url,
            "Loaded poller configuration"
        );

        config.validate()?;
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_assets(mut self, assets: Vec<TrackedAsset>) -> Self {
        self.assets = assets;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::NoAssets);
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if !seen.insert(asset.symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(asset.symbol.clone()));
            }
            if Pubkey::from_str(&asset.address).is_err() {
                return Err(ConfigError::InvalidAddress {
                    symbol: asset.symbol.clone(),
                    address: asset.address.clone(),
                });
            }
        }

        if self.api_base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api_base_url must not be empty".to_string(),
            ));
        }
        if self.min_request_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll and request intervals must be non-zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request_timeout must be non-zero".to_string(),
            ));
        }
        if self.rate_limit_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit_threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PollerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.assets.len(), 2);
        assert_eq!(config.min_request_interval, Duration::from_millis(5000));
        assert_eq!(config.inter_request_delay, Duration::from_secs(2));
        assert_eq!(config.rate_limit_threshold, 1);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_rejects_bad_assets() {
        let config = PollerConfig::default().with_assets(vec![]);
        assert_eq!(config.validate(), Err(ConfigError::NoAssets));

        let config =
            PollerConfig::default().with_assets(vec![TrackedAsset::sol(), TrackedAsset::sol()]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateSymbol("SOL".to_string()))
        );

        let config = PollerConfig::default()
            .with_assets(vec![TrackedAsset::new("BAD", "not-a-base58-key!")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let mut config = PollerConfig::default();
        config.rate_limit_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_absent_or_blank_key_means_no_credential() {
        let config = PollerConfig::from_values(None, None).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.api_base_url, BIRDEYE_API_URL);

        let config = PollerConfig::from_values(Some("   ".to_string()), None).unwrap();
        assert!(config.api_key.is_none());

        let config = PollerConfig::from_values(Some(" key-123\n".to_string()), None).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("key-123"));
    }

    #[test]
    fn test_base_url_trailing_slashes_trimmed() {
        let config =
            PollerConfig::from_values(None, Some("http://localhost:8080/ ".to_string())).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8080");

        let config = PollerConfig::from_values(None, Some("//".to_string())).unwrap();
        assert_eq!(config.api_base_url, BIRDEYE_API_URL);
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = PollerConfig::default().with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
