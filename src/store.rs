//! Consumer-facing price feed state
//!
//! Holds the snapshot, loading flag and error message one poller exposes,
//! and applies cycle outcomes to them:
//!
//! - completed cycle: snapshot replaced, error cleared (or set to the
//!   fallback advisory)
//! - rate-limited cycle: previous snapshot kept, error set
//! - any other failure: snapshot emptied, error set
//! - skipped cycle: nothing changes

use crate::{
    constants::FALLBACK_ADVISORY,
    engine::CycleOutcome,
    error::FetchError,
    types::{EndpointMode, FeedStatus, PriceFeedEvent, PriceRecord, PriceSnapshot},
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Everything a consumer renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceFeedView {
    pub snapshot: PriceSnapshot,
    pub loading: bool,
    pub error: Option<String>,
}

impl PriceFeedView {
    /// Derives the render status from snapshot, loading and error
    pub fn status(&self) -> FeedStatus {
        FeedStatus::derive(&self.snapshot, self.loading, self.error.as_deref())
    }
}

impl Default for PriceFeedView {
    fn default() -> Self {
        Self {
            snapshot: PriceSnapshot::empty(),
            loading: true,
            error: None,
        }
    }
}

/// Feed state for one consumer, updated from cycle outcomes
pub struct PriceFeedStore {
    view: RwLock<PriceFeedView>,
}

impl PriceFeedStore {
    /// Creates an empty store with `loading` set
    pub fn new() -> Self {
        Self {
            view: RwLock::new(PriceFeedView::default()),
        }
    }

    /// Applies a cycle outcome and returns the event describing the change, if any
    pub async fn apply(&self, outcome: &CycleOutcome) -> Option<PriceFeedEvent> {
        match outcome {
            CycleOutcome::Skipped(reason) => {
                debug!(reason = %FetchError::from(*reason), "Cycle skipped, feed state unchanged");
                None
            }
            CycleOutcome::Completed { snapshot, mode } => {
                let advisory = match mode {
                    EndpointMode::Primary => None,
                    EndpointMode::Fallback => Some(FALLBACK_ADVISORY.to_string()),
                };

                let mut view = self.view.write().await;
                view.snapshot = snapshot.clone();
                view.error = advisory.clone();
                view.loading = false;

                Some(PriceFeedEvent::snapshot_updated(*mode, snapshot, advisory))
            }
            CycleOutcome::Failed { error, .. } => {
                let clear = !error.preserves_snapshot();

                let mut view = self.view.write().await;
                if clear {
                    view.snapshot = PriceSnapshot::empty();
                }
                view.error = Some(error.to_string());
                view.loading = false;

                Some(PriceFeedEvent::cycle_failed(error.to_string(), clear))
            }
        }
    }

    /// Gets a copy of the full consumer view
    pub async fn view(&self) -> PriceFeedView {
        self.view.read().await.clone()
    }

    /// Gets the current snapshot
    pub async fn snapshot(&self) -> PriceSnapshot {
        self.view.read().await.snapshot.clone()
    }

    /// True until the first cycle resolves
    pub async fn loading(&self) -> bool {
        self.view.read().await.loading
    }

    /// Gets the user-facing error or advisory, if any
    pub async fn error(&self) -> Option<String> {
        self.view.read().await.error.clone()
    }

    /// Gets the current record for a symbol, if the snapshot has one
    pub async fn get_price(&self, symbol: &str) -> Option<PriceRecord> {
        self.view.read().await.snapshot.get(symbol).cloned()
    }

    pub async fn status(&self) -> FeedStatus {
        self.view.read().await.status()
    }
}

impl Default for PriceFeedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DenyReason, FetchError};
    use crate::types::TrackedAsset;

    fn snapshot(sol: f64, bonk: f64) -> PriceSnapshot {
        PriceSnapshot::from_prices(&TrackedAsset::defaults(), &[Some(sol), Some(bonk)]).unwrap()
    }

    async fn seeded() -> PriceFeedStore {
        let store = PriceFeedStore::new();
        store
            .apply(&CycleOutcome::Completed {
                snapshot: snapshot(182.30, 0.00001712),
                mode: EndpointMode::Primary,
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_starts_loading() {
        let store = PriceFeedStore::new();
        let view = store.view().await;
        assert!(view.loading);
        assert!(view.snapshot.is_empty());
        assert!(view.error.is_none());
        assert_eq!(view.status(), FeedStatus::Loading);
    }

    #[tokio::test]
    async fn test_primary_completion_clears_error() {
        let store = seeded().await;
        let view = store.view().await;
        assert!(!view.loading);
        assert!(view.error.is_none());
        assert_eq!(view.status(), FeedStatus::Live);
        assert_eq!(store.get_price("SOL").await.unwrap().price, 182.30);
    }

    #[tokio::test]
    async fn test_fallback_completion_sets_advisory() {
        let store = PriceFeedStore::new();
        let event = store
            .apply(&CycleOutcome::Completed {
                snapshot: snapshot(182.30, 0.00001712),
                mode: EndpointMode::Fallback,
            })
            .await
            .unwrap();

        assert_eq!(event.event_type(), "SNAPSHOT_UPDATED");
        assert_eq!(store.error().await.as_deref(), Some(FALLBACK_ADVISORY));
        assert_eq!(store.status().await, FeedStatus::Degraded);
    }

    #[tokio::test]
    async fn test_rate_limit_preserves_snapshot() {
        let store = seeded().await;
        let before = store.snapshot().await;

        store
            .apply(&CycleOutcome::Failed {
                error: FetchError::RateLimited {
                    count: 1,
                    threshold: 1,
                },
                mode: EndpointMode::Primary,
            })
            .await;

        assert_eq!(store.snapshot().await, before);
        assert!(store.error().await.unwrap().contains("rate limit"));
    }

    #[tokio::test]
    async fn test_other_failures_clear_snapshot() {
        let store = seeded().await;

        let event = store
            .apply(&CycleOutcome::Failed {
                error: FetchError::NetworkFailure("connection reset".to_string()),
                mode: EndpointMode::Primary,
            })
            .await
            .unwrap();

        match event {
            PriceFeedEvent::CycleFailed {
                snapshot_cleared, ..
            } => assert!(snapshot_cleared),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(store.snapshot().await.is_empty());
        assert_eq!(store.status().await, FeedStatus::Failed);
    }

    #[tokio::test]
    async fn test_skip_changes_nothing() {
        let store = PriceFeedStore::new();
        let event = store
            .apply(&CycleOutcome::Skipped(DenyReason::AlreadyInFlight))
            .await;

        assert!(event.is_none());
        assert!(store.loading().await);
    }
}
