//! Request coordinator
//!
//! Single serialization point for upstream price fetches. Every poller and
//! every manual refresh that share one `RequestCoordinator` see at most one
//! cycle in flight, and granted cycles are spaced at least
//! `min_request_interval` apart.
//!
//! The state is only reachable through `try_acquire`, `record_failure`,
//! `record_success` and the `RequestPermit` returned on a grant, whose drop
//! performs the release.

use crate::{
    constants::{HTTP_TOO_MANY_REQUESTS, MIN_REQUEST_INTERVAL_MS, RATE_LIMIT_THRESHOLD},
    error::DenyReason,
    types::EndpointMode,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Point-in-time copy of the coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorState {
    pub is_requesting: bool,
    pub last_request_time: Option<Instant>,
    pub request_count: u64,
    pub consecutive_429_count: u32,
    pub use_fallback_endpoint: bool,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            is_requesting: false,
            last_request_time: None,
            request_count: 0,
            consecutive_429_count: 0,
            use_fallback_endpoint: false,
        }
    }

    /// Endpoint mode implied by the fallback flag
    pub fn endpoint_mode(&self) -> EndpointMode {
        if self.use_fallback_endpoint {
            EndpointMode::Fallback
        } else {
            EndpointMode::Primary
        }
    }
}

/// Shared gate for upstream price requests
pub struct RequestCoordinator {
    state: Mutex<CoordinatorState>,
    min_interval: Duration,
    rate_limit_threshold: u32,
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCoordinator {
    /// Creates a new coordinator with the default spacing and 429 threshold
    pub fn new() -> Self {
        Self::with_limits(
            Duration::from_millis(MIN_REQUEST_INTERVAL_MS),
            RATE_LIMIT_THRESHOLD,
        )
    }

    /// Creates a new coordinator with custom spacing and 429 threshold (at least 1)
    pub fn with_limits(min_interval: Duration, rate_limit_threshold: u32) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::new()),
            min_interval,
            rate_limit_threshold: rate_limit_threshold.max(1),
        }
    }

    /// Tries to start a fetch cycle at `now`.
    ///
    /// On a grant the coordinator is marked in flight, `last_request_time`
    /// becomes `now` and the request counter is bumped, all under one lock.
    pub fn try_acquire(self: &Arc<Self>, now: Instant) -> Result<RequestPermit, DenyReason> {
        let mut state = self.state.lock();

        if state.is_requesting {
            debug!("Global request already in progress, skipping");
            return Err(DenyReason::AlreadyInFlight);
        }

        if let Some(last) = state.last_request_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    "Rate limiting: waiting before next request"
                );
                return Err(DenyReason::TooSoon { wait });
            }
        }

        let since_last_ms = state
            .last_request_time
            .map(|last| now.saturating_duration_since(last).as_millis() as u64);

        state.is_requesting = true;
        state.last_request_time = Some(now);
        state.request_count += 1;

        info!(
            request_count = state.request_count,
            since_last_ms = ?since_last_ms,
            endpoint = %state.endpoint_mode(),
            "Price request granted"
        );

        Ok(RequestPermit {
            coordinator: Arc::clone(self),
            request_number: state.request_count,
            mode: state.endpoint_mode(),
            released: false,
        })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.is_requesting = false;
    }

    /// Records a failed upstream response.
    ///
    /// Only 429s count; once the consecutive count reaches the threshold the
    /// fallback endpoint is used until a successful primary cycle. Returns
    /// the new consecutive 429 count.
    pub fn record_failure(&self, status: u16) -> u32 {
        let mut state = self.state.lock();
        if status != HTTP_TOO_MANY_REQUESTS {
            return state.consecutive_429_count;
        }

        state.consecutive_429_count += 1;
        if state.consecutive_429_count >= self.rate_limit_threshold && !state.use_fallback_endpoint
        {
            state.use_fallback_endpoint = true;
            warn!(
                consecutive_429_count = state.consecutive_429_count,
                threshold = self.rate_limit_threshold,
                "Switching to public endpoint due to rate limiting"
            );
        }
        state.consecutive_429_count
    }

    /// Records a successful cycle. Only a primary-endpoint success leaves fallback mode.
    pub fn record_success(&self, used_primary_endpoint: bool) {
        let mut state = self.state.lock();
        state.consecutive_429_count = 0;
        if used_primary_endpoint && state.use_fallback_endpoint {
            state.use_fallback_endpoint = false;
            info!("Primary endpoint healthy again, leaving fallback mode");
        }
    }

    /// Gets a copy of the current state
    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    /// Endpoint mode the next granted cycle will use
    pub fn endpoint_mode(&self) -> EndpointMode {
        self.state.lock().endpoint_mode()
    }

    /// Number of cycles granted so far
    pub fn request_count(&self) -> u64 {
        self.state.lock().request_count
    }

    /// Consecutive 429s that switch to the fallback endpoint
    pub fn rate_limit_threshold(&self) -> u32 {
        self.rate_limit_threshold
    }

    /// Minimum spacing between granted cycles
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Grant to run one fetch cycle. Dropping it releases the coordinator.
#[must_use = "dropping the permit immediately releases the coordinator"]
pub struct RequestPermit {
    coordinator: Arc<RequestCoordinator>,
    request_number: u64,
    mode: EndpointMode,
    released: bool,
}

impl RequestPermit {
    /// Sequence number of the granted request
    pub fn request_number(&self) -> u64 {
        self.request_number
    }

    /// Endpoint mode in effect when the permit was granted
    pub fn endpoint_mode(&self) -> EndpointMode {
        self.mode
    }

    /// Ends the cycle now instead of at scope exit
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.coordinator.release();
        }
    }
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for RequestPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPermit")
            .field("request_number", &self.request_number)
            .field("mode", &self.mode)
            .field("released", &self.released)
            .finish()
    }
}
