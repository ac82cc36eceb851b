//! Poll scheduler
//!
//! Drives the fetch engine on a self-rescheduling timer and exposes the
//! latest feed state to consumers.
//!
//! ## Scheduling
//!
//! ```text
//! activate()
//!     ↓
//! cycle ──(completes)──► wait poll_interval ──► cycle ──► ...
//!     ↑                        │
//!     └─── deactivate() cancels the pending wait only
//! ```
//!
//! The next cycle is scheduled `poll_interval` after the previous one
//! completes, not at a fixed rate. A cycle still in flight when the poller is
//! deactivated runs to completion, releases the coordinator, and its outcome
//! is discarded.

use crate::{
    config::PollerConfig,
    constants::EVENT_CHANNEL_CAPACITY,
    coordinator::RequestCoordinator,
    engine::{CycleOutcome, PriceFetchEngine},
    error::{ConfigError, DenyReason},
    metrics::{CycleKind, CycleMetrics, MetricsCollector},
    provider::PriceSource,
    providers::BirdeyeSource,
    store::{PriceFeedStore, PriceFeedView},
    types::{
        ComponentHealth, EndpointMode, FeedStatus, HealthStatus, PriceFeedEvent, PriceRecord,
        PriceSnapshot,
    },
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// State shared between the poller handle and its background task
struct PollerShared {
    engine: PriceFetchEngine,
    store: PriceFeedStore,
    metrics: MetricsCollector,
    events: broadcast::Sender<PriceFeedEvent>,
}

impl PollerShared {
    /// Runs one engine cycle and records its metrics
    async fn run_cycle(&self) -> (CycleOutcome, EndpointMode) {
        let mode_before = self.engine.coordinator().endpoint_mode();
        let start = Instant::now();
        let outcome = self.engine.run_cycle().await;
        self.metrics
            .record_cycle(outcome.kind(), start.elapsed())
            .await;
        (outcome, mode_before)
    }

    /// Applies an outcome to the feed state and notifies subscribers
    async fn publish(&self, outcome: &CycleOutcome, mode_before: EndpointMode) {
        if let Some(event) = self.store.apply(outcome).await {
            debug!(event = %event, "Publishing price feed event");
            let _ = self.events.send(event);
        }

        let mode_after = self.engine.coordinator().endpoint_mode();
        if !outcome.is_skipped() && mode_after != mode_before {
            info!(from = %mode_before, to = %mode_after, "Endpoint mode changed");
            let _ = self
                .events
                .send(PriceFeedEvent::endpoint_mode_changed(mode_after));
        }
    }
}

struct PollTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Price poller
///
/// Owns one consumer's view of the feed. Pollers built with the same
/// `RequestCoordinator` never overlap upstream requests.
///
/// # Example
/// ```no_run
/// use token_price_poller::{PollerConfig, PricePoller};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let poller = PricePoller::new(PollerConfig::from_env()?)?;
/// poller.activate();
///
/// let view = poller.view().await;
/// for (symbol, record) in view.snapshot.iter() {
///     println!("{}: ${}", symbol, record.price);
/// }
/// # Ok(())
/// # }
/// ```
pub struct PricePoller {
    shared: Arc<PollerShared>,
    poll_interval: Duration,
    manual_refresh_interval: Duration,
    last_manual_refresh: Mutex<Option<Instant>>,
    task: Mutex<Option<PollTask>>,
}

impl PricePoller {
    /// Creates a poller with its own coordinator and a Birdeye source
    pub fn new(config: PollerConfig) -> Result<Self, ConfigError> {
        let coordinator = Arc::new(RequestCoordinator::with_limits(
            config.min_request_interval,
            config.rate_limit_threshold,
        ));
        Self::with_coordinator(config, coordinator)
    }

    /// Creates a poller that shares `coordinator` with other pollers
    pub fn with_coordinator(
        config: PollerConfig,
        coordinator: Arc<RequestCoordinator>,
    ) -> Result<Self, ConfigError> {
        let source = BirdeyeSource::from_config(&config)
            .map_err(|e| ConfigError::ValidationError(format!("HTTP client: {}", e)))?;
        Self::with_source(config, coordinator, Arc::new(source))
    }

    /// Creates a poller with a custom price source
    pub fn with_source(
        config: PollerConfig,
        coordinator: Arc<RequestCoordinator>,
        source: Arc<dyn PriceSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let engine = PriceFetchEngine::from_config(coordinator, source, &config);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(PollerShared {
            engine,
            store: PriceFeedStore::new(),
            metrics: MetricsCollector::new(),
            events,
        });

        Ok(Self {
            shared,
            poll_interval: config.poll_interval,
            manual_refresh_interval: config.manual_refresh_interval,
            last_manual_refresh: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Starts polling: one cycle now, then one `poll_interval` after each
    /// completed cycle. Calling it while already active does nothing.
    pub fn activate(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("Poller already active");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                source = shared.engine.source_name(),
                "Starting price poller"
            );

            loop {
                let (outcome, mode_before) = shared.run_cycle().await;

                let deactivated = *shutdown_rx.borrow();
                if deactivated {
                    debug!("Poller deactivated during cycle, discarding outcome");
                    break;
                }
                shared.publish(&outcome, mode_before).await;

                tokio::select! {
                    _ = sleep(poll_interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Price poller stopped");
        });

        *task = Some(PollTask { shutdown, handle });
    }

    /// Stops scheduling further cycles.
    ///
    /// A cycle already in flight finishes and releases the coordinator but
    /// does not update this poller. Returns the task handle so callers can
    /// wait for that, or `None` if the poller was not active.
    pub fn deactivate(&self) -> Option<JoinHandle<()>> {
        let task = self.task.lock().take()?;
        let _ = task.shutdown.send(true);
        Some(task.handle)
    }

    /// True while the polling task is running
    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Manually triggers a cycle.
    ///
    /// A no-op (returns `Skipped`) if this poller ran a manual cycle less than
    /// `manual_refresh_interval` ago, or if the coordinator denies the request.
    /// Only refreshes the coordinator grants start the manual throttle.
    /// Denials never change the feed state.
    pub async fn refresh(&self) -> CycleOutcome {
        let requested_at = Instant::now();
        if let Some(wait) = self.manual_refresh_wait(requested_at) {
            debug!(
                wait_ms = wait.as_millis() as u64,
                "Manual refresh throttled"
            );
            self.shared
                .metrics
                .record_cycle(CycleKind::Skipped, Duration::ZERO)
                .await;
            return CycleOutcome::Skipped(DenyReason::TooSoon { wait });
        }

        let (outcome, mode_before) = self.shared.run_cycle().await;
        if !outcome.is_skipped() {
            *self.last_manual_refresh.lock() = Some(requested_at);
        }
        self.shared.publish(&outcome, mode_before).await;
        outcome
    }

    /// Remaining wait if the last granted manual refresh was too recent
    fn manual_refresh_wait(&self, now: Instant) -> Option<Duration> {
        let previous = (*self.last_manual_refresh.lock())?;
        let elapsed = now.saturating_duration_since(previous);
        (elapsed < self.manual_refresh_interval).then(|| self.manual_refresh_interval - elapsed)
    }

    /// Subscribes to feed events
    pub fn subscribe(&self) -> broadcast::Receiver<PriceFeedEvent> {
        self.shared.events.subscribe()
    }

    /// Gets a copy of the consumer view
    pub async fn view(&self) -> PriceFeedView {
        self.shared.store.view().await
    }

    pub async fn snapshot(&self) -> PriceSnapshot {
        self.shared.store.snapshot().await
    }

    pub async fn loading(&self) -> bool {
        self.shared.store.loading().await
    }

    pub async fn error(&self) -> Option<String> {
        self.shared.store.error().await
    }

    pub async fn status(&self) -> FeedStatus {
        self.shared.store.status().await
    }

    /// Gets the current record for `symbol`
    pub async fn get_price(&self, symbol: &str) -> Option<PriceRecord> {
        self.shared.store.get_price(symbol).await
    }

    /// Coordinator shared with other pollers, if any
    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        self.shared.engine.coordinator()
    }

    /// Gets the cycle metrics for this poller
    pub async fn metrics(&self) -> CycleMetrics {
        self.shared.metrics.get_metrics().await
    }

    /// Perform a health check on the poller
    pub async fn health_check(&self) -> ComponentHealth {
        let view = self.view().await;
        let coordinator = self.coordinator().state();
        let metrics = self.metrics().await;
        let feed_status = view.status();

        let mut details = HashMap::new();
        details.insert(
            "symbols".to_string(),
            serde_json::json!(view.snapshot.symbols()),
        );
        details.insert(
            "endpoint_mode".to_string(),
            serde_json::json!(coordinator.endpoint_mode()),
        );
        details.insert(
            "request_count".to_string(),
            serde_json::json!(coordinator.request_count),
        );
        details.insert(
            "consecutive_429_count".to_string(),
            serde_json::json!(coordinator.consecutive_429_count),
        );
        details.insert(
            "source".to_string(),
            serde_json::json!(self.shared.engine.source_name()),
        );
        details.insert(
            "success_rate".to_string(),
            serde_json::json!(metrics.success_rate()),
        );
        details.insert("active".to_string(), serde_json::json!(self.is_active()));

        let (status, message) = match feed_status {
            FeedStatus::Live => (
                HealthStatus::Healthy,
                "Price poller is serving fresh primary data".to_string(),
            ),
            FeedStatus::Degraded => (
                HealthStatus::Degraded,
                view.error.clone().unwrap_or_default(),
            ),
            FeedStatus::Loading => (
                HealthStatus::Degraded,
                "Waiting for the first price cycle".to_string(),
            ),
            FeedStatus::Failed => (
                HealthStatus::Unhealthy,
                view.error.clone().unwrap_or_default(),
            ),
        };

        ComponentHealth {
            name: "price_poller".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }
}

impl Drop for PricePoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            let _ = task.shutdown.send(true);
        }
    }
}
