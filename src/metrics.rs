//! Fetch cycle metrics
//!
//! Tracks cycle latency percentiles and per-outcome counters for one poller.

use crate::types::EndpointMode;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for latency calculation
const MAX_SAMPLES: usize = 100;

/// How a cycle ended, as far as metrics are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Completed(EndpointMode),
    RateLimited,
    Failed,
    Skipped,
}

/// Snapshot of cycle metrics
#[derive(Debug, Clone, PartialEq)]
pub struct CycleMetrics {
    /// 50th percentile latency of cycles that ran, in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of cycles that ran, in milliseconds
    pub latency_p99_ms: f64,
    pub primary_successes: u64,
    pub fallback_successes: u64,
    pub rate_limited: u64,
    pub failures: u64,
    /// Cycles denied by the coordinator or the manual refresh throttle
    pub skipped: u64,
}

impl CycleMetrics {
    /// Cycles that reached the network
    pub fn attempted(&self) -> u64 {
        self.primary_successes + self.fallback_successes + self.rate_limited + self.failures
    }

    /// Success rate over attempted cycles (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            return 1.0;
        }
        (self.primary_successes + self.fallback_successes) as f64 / attempted as f64
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Rolling window of latencies in milliseconds
    samples: VecDeque<f64>,
    primary_successes: u64,
    fallback_successes: u64,
    rate_limited: u64,
    failures: u64,
    skipped: u64,
}

/// Collects cycle metrics
#[derive(Debug, Default)]
pub struct MetricsCollector {
    inner: RwLock<MetricsInner>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records how a cycle ended and how long it took
    pub async fn record_cycle(&self, kind: CycleKind, duration: Duration) {
        let mut inner = self.inner.write().await;

        match kind {
            CycleKind::Completed(EndpointMode::Primary) => inner.primary_successes += 1,
            CycleKind::Completed(EndpointMode::Fallback) => inner.fallback_successes += 1,
            CycleKind::RateLimited => inner.rate_limited += 1,
            CycleKind::Failed => inner.failures += 1,
            CycleKind::Skipped => {
                inner.skipped += 1;
                return;
            }
        }

        if inner.samples.len() >= MAX_SAMPLES {
            inner.samples.pop_front();
        }
        inner.samples.push_back(duration.as_secs_f64() * 1000.0);
    }

    pub async fn get_metrics(&self) -> CycleMetrics {
        let inner = self.inner.read().await;

        let mut latencies: Vec<f64> = inner.samples.iter().copied().collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        CycleMetrics {
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            primary_successes: inner.primary_successes,
            fallback_successes: inner.fallback_successes,
            rate_limited: inner.rate_limited,
            failures: inner.failures,
            skipped: inner.skipped,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector
            .record_cycle(
                CycleKind::Completed(EndpointMode::Primary),
                Duration::from_millis(2100),
            )
            .await;
        collector
            .record_cycle(
                CycleKind::Completed(EndpointMode::Fallback),
                Duration::from_millis(300),
            )
            .await;
        collector
            .record_cycle(CycleKind::RateLimited, Duration::from_millis(150))
            .await;
        collector
            .record_cycle(CycleKind::Skipped, Duration::ZERO)
            .await;

        let metrics = collector.get_metrics().await;

        assert_eq!(metrics.primary_successes, 1);
        assert_eq!(metrics.fallback_successes, 1);
        assert_eq!(metrics.rate_limited, 1);
        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.attempted(), 3);
        assert!(metrics.success_rate() > 0.6 && metrics.success_rate() < 0.7);
        assert_eq!(metrics.latency_p50_ms, 300.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        assert_eq!(percentile(&values, 50.0), 5.0);
        assert_eq!(percentile(&values, 99.0), 9.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
