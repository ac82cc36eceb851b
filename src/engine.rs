//! Price fetch engine
//!
//! Runs one fetch cycle for the full set of tracked assets under a
//! coordinator permit. A cycle is all-or-nothing: it either yields a
//! complete snapshot or a single `FetchError`.
//!
//! - Primary mode: requires a credential, queries assets one at a time with
//!   `inter_request_delay` between requests, aborts on the first 429.
//! - Fallback mode: queries every asset concurrently on the public endpoint.

use crate::{
    config::PollerConfig,
    constants::HTTP_TOO_MANY_REQUESTS,
    coordinator::RequestCoordinator,
    error::{DenyReason, FetchError, ProviderError},
    metrics::CycleKind,
    provider::PriceSource,
    types::{EndpointMode, PriceSnapshot, TrackedAsset},
};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Result of one call into the engine
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The coordinator refused; no I/O happened
    Skipped(DenyReason),
    /// Every asset yielded a usable price
    Completed {
        snapshot: PriceSnapshot,
        mode: EndpointMode,
    },
    /// The cycle ran and failed
    Failed { error: FetchError, mode: EndpointMode },
}

impl CycleOutcome {
    /// Metrics category of this outcome
    pub fn kind(&self) -> CycleKind {
        match self {
            CycleOutcome::Skipped(_) => CycleKind::Skipped,
            CycleOutcome::Completed { mode, .. } => CycleKind::Completed(*mode),
            CycleOutcome::Failed {
                error: FetchError::RateLimited { .. },
                ..
            } => CycleKind::RateLimited,
            CycleOutcome::Failed { .. } => CycleKind::Failed,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped(_))
    }

    /// The outcome in the cycle error taxonomy; denials map to
    /// `FetchError::AlreadyInFlight` / `FetchError::TooSoon`
    pub fn error(&self) -> Option<FetchError> {
        match self {
            CycleOutcome::Skipped(reason) => Some(FetchError::from(*reason)),
            CycleOutcome::Completed { .. } => None,
            CycleOutcome::Failed { error, .. } => Some(error.clone()),
        }
    }
}

/// Runs fetch cycles for a fixed asset list against one price source
pub struct PriceFetchEngine {
    coordinator: Arc<RequestCoordinator>,
    source: Arc<dyn PriceSource>,
    assets: Vec<TrackedAsset>,
    inter_request_delay: Duration,
}

impl PriceFetchEngine {
    /// Creates a new engine
    pub fn new(
        coordinator: Arc<RequestCoordinator>,
        source: Arc<dyn PriceSource>,
        assets: Vec<TrackedAsset>,
        inter_request_delay: Duration,
    ) -> Self {
        Self {
            coordinator,
            source,
            assets,
            inter_request_delay,
        }
    }

    /// Creates a new engine with the assets and delay from `config`
    pub fn from_config(
        coordinator: Arc<RequestCoordinator>,
        source: Arc<dyn PriceSource>,
        config: &PollerConfig,
    ) -> Self {
        Self::new(
            coordinator,
            source,
            config.assets.clone(),
            config.inter_request_delay,
        )
    }

    /// Coordinator gating this engine's cycles
    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        &self.coordinator
    }

    /// Assets fetched on every cycle, in request order
    pub fn assets(&self) -> &[TrackedAsset] {
        &self.assets
    }

    pub fn source_name(&self) -> &'static str {
        self.source.source_name()
    }

    /// Runs one fetch cycle.
    ///
    /// Never panics or returns early without releasing the coordinator: the
    /// permit is held for the whole cycle and released when it drops.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let permit = match self.coordinator.try_acquire(Instant::now()) {
            Ok(permit) => permit,
            Err(reason) => return CycleOutcome::Skipped(reason),
        };

        let mode = permit.endpoint_mode();
        let start = Instant::now();
        let result = match mode {
            EndpointMode::Primary => self.fetch_primary().await,
            EndpointMode::Fallback => self.fetch_fallback().await,
        };
        permit.release();

        let latency_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(snapshot) => {
                info!(
                    endpoint = %mode,
                    source = self.source.source_name(),
                    count = snapshot.len(),
                    latency_ms,
                    "All prices fetched"
                );
                CycleOutcome::Completed { snapshot, mode }
            }
            Err(error) => {
                warn!(endpoint = %mode, latency_ms, error = %error, "Price fetch failed");
                CycleOutcome::Failed { error, mode }
            }
        }
    }

    async fn fetch_primary(&self) -> Result<PriceSnapshot, FetchError> {
        if !self.source.has_credential() {
            return Err(FetchError::MissingCredential);
        }

        let mut prices = Vec::with_capacity(self.assets.len());
        for (index, asset) in self.assets.iter().enumerate() {
            if index > 0 && !self.inter_request_delay.is_zero() {
                debug!(
                    delay_ms = self.inter_request_delay.as_millis() as u64,
                    asset = %asset.symbol,
                    "Waiting before next primary request"
                );
                sleep(self.inter_request_delay).await;
            }

            match self.source.fetch_price(EndpointMode::Primary, asset).await {
                Ok(price) => prices.push(price),
                Err(ProviderError::RateLimitExceeded) => {
                    let count = self.coordinator.record_failure(HTTP_TOO_MANY_REQUESTS);
                    warn!(
                        asset = %asset.symbol,
                        consecutive_429_count = count,
                        "Rate limited by API, aborting cycle"
                    );
                    return Err(FetchError::RateLimited {
                        count,
                        threshold: self.coordinator.rate_limit_threshold(),
                    });
                }
                Err(e) => {
                    if let Some(status) = e.status() {
                        self.coordinator.record_failure(status);
                    }
                    return Err(e.into());
                }
            }
        }

        let snapshot = self.build_snapshot(&prices)?;
        self.coordinator.record_success(true);
        Ok(snapshot)
    }

    async fn fetch_fallback(&self) -> Result<PriceSnapshot, FetchError> {
        let prices = try_join_all(
            self.assets
                .iter()
                .map(|asset| self.source.fetch_price(EndpointMode::Fallback, asset)),
        )
        .await?;

        let snapshot = self.build_snapshot(&prices)?;
        self.coordinator.record_success(false);
        Ok(snapshot)
    }

    fn build_snapshot(&self, prices: &[Option<f64>]) -> Result<PriceSnapshot, FetchError> {
        PriceSnapshot::from_prices(&self.assets, prices).ok_or_else(|| {
            let missing: Vec<&str> = self
                .assets
                .iter()
                .zip(prices)
                .filter(|(_, price)| !matches!(price, Some(p) if p.is_finite() && *p > 0.0))
                .map(|(asset, _)| asset.symbol.as_str())
                .collect();
            FetchError::malformed(format!("no usable price for {}", missing.join(", ")))
        })
    }
}
