//! Birdeye price source implementation

use crate::{
    config::PollerConfig,
    constants::{
        API_KEY_HEADER, CHAIN_HEADER, CHAIN_NAME, HTTP_TOO_MANY_REQUESTS, REQUEST_TIMEOUT_SECS,
        USER_AGENT,
    },
    error::ProviderError,
    provider::PriceSource,
    types::{EndpointMode, TrackedAsset},
};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Birdeye price response: `{ "data": { "value": number } }`
#[derive(Debug, Deserialize)]
struct BirdeyePriceResponse {
    #[serde(default)]
    data: Option<BirdeyePriceData>,
}

#[derive(Debug, Deserialize)]
struct BirdeyePriceData {
    #[serde(default)]
    value: Option<serde_json::Value>,
}

/// Birdeye price source
///
/// Primary mode hits `/defi/price` with the API key and chain headers,
/// fallback mode hits `/public/price` without credentials.
pub struct BirdeyeSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BirdeyeSource {
    /// Creates a new Birdeye source
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &PollerConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )
    }

    fn price_url(&self, mode: EndpointMode) -> String {
        format!("{}{}", self.base_url, mode.path())
    }

    fn build_request(
        &self,
        mode: EndpointMode,
        asset: &TrackedAsset,
    ) -> Result<RequestBuilder, ProviderError> {
        let request = self
            .client
            .get(self.price_url(mode))
            .query(&[("address", asset.address.as_str())]);

        match mode {
            EndpointMode::Primary => {
                let api_key = self
                    .api_key
                    .as_deref()
                    .ok_or(ProviderError::MissingCredential)?;
                Ok(request
                    .header(API_KEY_HEADER, api_key)
                    .header(ACCEPT, "application/json")
                    .header(CHAIN_HEADER, CHAIN_NAME))
            }
            EndpointMode::Fallback => Ok(request),
        }
    }

    /// Extracts `data.value` as a number; anything else is `None`
    fn parse_response(body: &str) -> Result<Option<f64>, ProviderError> {
        let response: BirdeyePriceResponse = serde_json::from_str(body).map_err(|e| {
            ProviderError::InvalidResponse(format!(
                "Failed to parse Birdeye response: {}. Response: {}",
                e, body
            ))
        })?;

        Ok(response
            .data
            .and_then(|data| data.value)
            .and_then(|value| value.as_f64()))
    }
}

impl Default for BirdeyeSource {
    fn default() -> Self {
        let config = PollerConfig::default();
        Self::new(
            config.api_base_url,
            None,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
        .expect("Failed to create Birdeye source")
    }
}

#[async_trait]
impl PriceSource for BirdeyeSource {
    async fn fetch_price(
        &self,
        mode: EndpointMode,
        asset: &TrackedAsset,
    ) -> Result<Option<f64>, ProviderError> {
        let request = self.build_request(mode, asset)?;
        debug!(endpoint = %mode, asset = %asset.symbol, "Fetching price from Birdeye");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::NetworkError(e)
            }
        })?;

        let status = response.status();
        debug!(
            endpoint = %mode,
            asset = %asset.symbol,
            status = status.as_u16(),
            "Birdeye response status"
        );

        if status.as_u16() == HTTP_TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimitExceeded);
        }

        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::NetworkError(e)
            }
        })?;

        Self::parse_response(&body)
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn source_name(&self) -> &'static str {
        "birdeye"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response per connection and records request heads
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                recorded
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf).to_string());

                let reply = format!(
                    "HTTP/1.1 {} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), requests)
    }

    fn source(base_url: &str, api_key: Option<&str>) -> BirdeyeSource {
        BirdeyeSource::new(
            base_url,
            api_key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(
            BirdeyeSource::parse_response(r#"{"data":{"value":182.30}}"#).unwrap(),
            Some(182.30)
        );
        assert_eq!(
            BirdeyeSource::parse_response(r#"{"data":{"value":"182.30"}}"#).unwrap(),
            None
        );
        assert_eq!(
            BirdeyeSource::parse_response(r#"{"success":false}"#).unwrap(),
            None
        );
        assert_eq!(
            BirdeyeSource::parse_response(r#"{"data":null}"#).unwrap(),
            None
        );
        assert!(matches!(
            BirdeyeSource::parse_response("<html>"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_primary_request_sends_credentials() {
        let (url, requests) = serve(vec![(200, r#"{"data":{"value":182.3}}"#)]).await;
        let source = source(&url, Some("test-key"));

        let price = source
            .fetch_price(EndpointMode::Primary, &TrackedAsset::sol())
            .await
            .unwrap();
        assert_eq!(price, Some(182.3));

        let head = requests.lock().unwrap()[0].to_lowercase();
        assert!(head.starts_with(
            "get /defi/price?address=so11111111111111111111111111111111111111112 "
        ));
        assert!(head.contains("x-api-key: test-key"));
        assert!(head.contains("x-chain: solana"));
        assert!(head.contains("accept: application/json"));
    }

    #[tokio::test]
    async fn test_fallback_request_is_unauthenticated() {
        let (url, requests) = serve(vec![(200, r#"{"data":{"value":0.00001712}}"#)]).await;
        let source = source(&url, Some("test-key"));

        let price = source
            .fetch_price(EndpointMode::Fallback, &TrackedAsset::bonk())
            .await
            .unwrap();
        assert_eq!(price, Some(0.00001712));

        let head = requests.lock().unwrap()[0].to_lowercase();
        assert!(head.starts_with("get /public/price?address="));
        assert!(!head.contains("x-api-key"));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (url, _) = serve(vec![
            (429, r#"{"message":"Too many requests"}"#),
            (500, "oops"),
        ])
        .await;
        let source = source(&url, Some("test-key"));
        let sol = TrackedAsset::sol();

        assert!(matches!(
            source.fetch_price(EndpointMode::Primary, &sol).await,
            Err(ProviderError::RateLimitExceeded)
        ));
        match source.fetch_price(EndpointMode::Primary, &sol).await {
            Err(ProviderError::HttpStatus { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "oops");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_primary_without_key_never_connects() {
        let (url, requests) = serve(vec![]).await;
        let source = source(&url, None);

        assert!(!source.has_credential());
        assert!(matches!(
            source
                .fetch_price(EndpointMode::Primary, &TrackedAsset::sol())
                .await,
            Err(ProviderError::MissingCredential)
        ));
        assert!(requests.lock().unwrap().is_empty());
    }
}
