//! Source abstraction for single-asset price requests

use crate::{
    error::ProviderError,
    types::{EndpointMode, TrackedAsset},
};
use async_trait::async_trait;

/// One upstream price request for one asset against one endpoint
///
/// Implementations report HTTP-level results only. Whether a cycle succeeds,
/// how 429s feed the coordinator and what consumers see is decided by the
/// fetch engine.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches the current price of `asset` from the endpoint for `mode`
    ///
    /// # Returns
    /// `Ok(Some(price))` for a numeric price, `Ok(None)` when the body parsed
    /// but carried no numeric `data.value`, or an error for transport,
    /// status and parse failures.
    async fn fetch_price(
        &self,
        mode: EndpointMode,
        asset: &TrackedAsset,
    ) -> Result<Option<f64>, ProviderError>;

    /// True when the authenticated endpoint can be used
    fn has_credential(&self) -> bool;

    /// Returns the name of this source
    fn source_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scripted reply for one (mode, symbol) pair
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Price(f64),
        MissingValue,
        Status(u16),
        Malformed,
        Timeout,
    }

    /// Mock source for testing
    pub struct MockSource {
        replies: Arc<Mutex<HashMap<(EndpointMode, String), MockReply>>>,
        calls: Arc<Mutex<Vec<(EndpointMode, String)>>>,
        latency: Duration,
        has_credential: bool,
    }

    impl Default for MockSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockSource {
        pub fn new() -> Self {
            Self {
                replies: Arc::new(Mutex::new(HashMap::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
                latency: Duration::ZERO,
                has_credential: true,
            }
        }

        pub fn without_credential(mut self) -> Self {
            self.has_credential = false;
            self
        }

        /// Simulated per-request latency
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn set_reply(&self, mode: EndpointMode, symbol: &str, reply: MockReply) {
            self.replies
                .lock()
                .unwrap()
                .insert((mode, symbol.to_string()), reply);
        }

        pub fn set_price(&self, mode: EndpointMode, symbol: &str, price: f64) {
            self.set_reply(mode, symbol, MockReply::Price(price));
        }

        pub fn calls(&self) -> Vec<(EndpointMode, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PriceSource for MockSource {
        async fn fetch_price(
            &self,
            mode: EndpointMode,
            asset: &TrackedAsset,
        ) -> Result<Option<f64>, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((mode, asset.symbol.clone()));

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(&(mode, asset.symbol.clone()))
                .cloned();

            match reply {
                Some(MockReply::Price(price)) => Ok(Some(price)),
                Some(MockReply::MissingValue) => Ok(None),
                Some(MockReply::Status(429)) => Err(ProviderError::RateLimitExceeded),
                Some(MockReply::Status(status)) => Err(ProviderError::HttpStatus {
                    status,
                    body: String::new(),
                }),
                Some(MockReply::Malformed) => Err(ProviderError::InvalidResponse(
                    "expected value at line 1 column 1".to_string(),
                )),
                Some(MockReply::Timeout) => Err(ProviderError::Timeout),
                None => Err(ProviderError::HttpStatus {
                    status: 404,
                    body: format!("no reply scripted for {}", asset.symbol),
                }),
            }
        }

        fn has_credential(&self) -> bool {
            self.has_credential
        }

        fn source_name(&self) -> &'static str {
            "mock"
        }
    }
}
