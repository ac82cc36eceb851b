//! Types for the token price poller

use crate::constants::{
    BONK_ADDRESS, BONK_SYMBOL, FALLBACK_PRICE_ENDPOINT, PRIMARY_PRICE_ENDPOINT, SOL_ADDRESS,
    SOL_SYMBOL,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Static descriptor of a token whose price is tracked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedAsset {
    /// Display symbol, also the snapshot key
    pub symbol: String,
    /// Token mint address
    pub address: String,
}

impl TrackedAsset {
    pub fn new(symbol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            address: address.into(),
        }
    }

    /// Wrapped SOL
    pub fn sol() -> Self {
        Self::new(SOL_SYMBOL, SOL_ADDRESS)
    }

    /// BONK
    pub fn bonk() -> Self {
        Self::new(BONK_SYMBOL, BONK_ADDRESS)
    }

    /// The two assets tracked by default
    pub fn defaults() -> Vec<Self> {
        vec![Self::sol(), Self::bonk()]
    }
}

/// Which upstream endpoint a fetch cycle targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMode {
    /// Authenticated endpoint, queried sequentially
    Primary,
    /// Public endpoint, queried concurrently
    Fallback,
}

impl EndpointMode {
    /// Path of the price endpoint for this mode
    pub fn path(&self) -> &'static str {
        match self {
            EndpointMode::Primary => PRIMARY_PRICE_ENDPOINT,
            EndpointMode::Fallback => FALLBACK_PRICE_ENDPOINT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointMode::Primary => "primary",
            EndpointMode::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for EndpointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price of one asset as published to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub address: String,
    pub symbol: String,
    /// Price in USD, always > 0
    pub price: f64,
    pub price_change_24h: f64,
    pub price_change_percentage_24h: f64,
    pub last_updated: DateTime<Utc>,
}

impl PriceRecord {
    /// Builds a record for an endpoint that reports no 24h change
    pub fn without_change(asset: &TrackedAsset, price: f64, last_updated: DateTime<Utc>) -> Self {
        Self {
            address: asset.address.clone(),
            symbol: asset.symbol.clone(),
            price,
            price_change_24h: 0.0,
            price_change_percentage_24h: 0.0,
            last_updated,
        }
    }
}

/// Most recently published consistent set of prices, keyed by symbol
///
/// Either empty or holding one record per tracked asset of the cycle
/// that produced it. Snapshots are replaced wholesale, never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSnapshot(HashMap<String, PriceRecord>);

impl PriceSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from one usable price per asset.
    ///
    /// Returns `None` unless every asset has a finite price above zero.
    pub fn from_prices(assets: &[TrackedAsset], prices: &[Option<f64>]) -> Option<Self> {
        if assets.len() != prices.len() {
            return None;
        }

        let now = Utc::now();
        let mut records = HashMap::with_capacity(assets.len());
        for (asset, &price) in assets.iter().zip(prices) {
            let price = price.filter(|p| p.is_finite() && *p > 0.0)?;
            records.insert(
                asset.symbol.clone(),
                PriceRecord::without_change(asset, price, now),
            );
        }

        Some(Self(records))
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceRecord> {
        self.0.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Symbols present, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.0.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PriceRecord)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> HashMap<String, PriceRecord> {
        self.0
    }
}

/// What a consumer should render, derived from snapshot, loading and error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// No data yet and no error
    Loading,
    /// Fresh data from the primary endpoint
    Live,
    /// Data present together with an advisory (fallback or preserved after a 429)
    Degraded,
    /// No data and an error
    Failed,
}

impl FeedStatus {
    pub fn derive(snapshot: &PriceSnapshot, loading: bool, error: Option<&str>) -> Self {
        match (snapshot.is_empty(), error.is_some()) {
            (false, false) => FeedStatus::Live,
            (false, true) => FeedStatus::Degraded,
            (true, true) if !loading => FeedStatus::Failed,
            _ => FeedStatus::Loading,
        }
    }
}

/// Price feed events for subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceFeedEvent {
    /// A cycle published a new snapshot
    SnapshotUpdated {
        id: Uuid,
        mode: EndpointMode,
        symbols: Vec<String>,
        advisory: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A cycle failed
    CycleFailed {
        id: Uuid,
        error_message: String,
        snapshot_cleared: bool,
        timestamp: DateTime<Utc>,
    },

    /// The coordinator switched endpoint mode
    EndpointModeChanged {
        id: Uuid,
        mode: EndpointMode,
        timestamp: DateTime<Utc>,
    },
}

impl PriceFeedEvent {
    pub fn snapshot_updated(
        mode: EndpointMode,
        snapshot: &PriceSnapshot,
        advisory: Option<String>,
    ) -> Self {
        PriceFeedEvent::SnapshotUpdated {
            id: Uuid::new_v4(),
            mode,
            symbols: snapshot.symbols(),
            advisory,
            timestamp: Utc::now(),
        }
    }

    pub fn cycle_failed(error_message: String, snapshot_cleared: bool) -> Self {
        PriceFeedEvent::CycleFailed {
            id: Uuid::new_v4(),
            error_message,
            snapshot_cleared,
            timestamp: Utc::now(),
        }
    }

    pub fn endpoint_mode_changed(mode: EndpointMode) -> Self {
        PriceFeedEvent::EndpointModeChanged {
            id: Uuid::new_v4(),
            mode,
            timestamp: Utc::now(),
        }
    }

    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            PriceFeedEvent::SnapshotUpdated { id, .. } => *id,
            PriceFeedEvent::CycleFailed { id, .. } => *id,
            PriceFeedEvent::EndpointModeChanged { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            PriceFeedEvent::SnapshotUpdated { .. } => "SNAPSHOT_UPDATED",
            PriceFeedEvent::CycleFailed { .. } => "CYCLE_FAILED",
            PriceFeedEvent::EndpointModeChanged { .. } => "ENDPOINT_MODE_CHANGED",
        }
    }
}

impl std::fmt::Display for PriceFeedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceFeedEvent::SnapshotUpdated { mode, symbols, .. } => {
                write!(f, "Snapshot updated from {} endpoint: {}", mode, symbols.join(", "))
            }
            PriceFeedEvent::CycleFailed { error_message, .. } => {
                write!(f, "Price cycle failed: {}", error_message)
            }
            PriceFeedEvent::EndpointModeChanged { mode, .. } => {
                write!(f, "Endpoint mode changed to {}", mode)
            }
        }
    }
}

/// Overall component health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data from the primary endpoint
    Healthy,
    /// Functional but waiting for data or serving fallback data
    Degraded,
    /// No data and the last cycle failed
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
