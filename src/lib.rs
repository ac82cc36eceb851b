//! # Token Price Poller
//!
//! Polls token prices from the Birdeye API under a strict upstream rate limit
//! and publishes a consistent snapshot to consumers.
//!
//! ## Architecture
//!
//! ```text
//! PricePoller (activate / refresh)
//!     ↓
//! PriceFetchEngine ──► RequestCoordinator (one in-flight cycle, 5s spacing,
//!     ↓                                    429 → fallback endpoint)
//! PriceSource (Birdeye /defi/price or /public/price)
//!     ↓
//! PriceFeedStore (snapshot, loading, error)
//!     ↓
//! Your Code (view, subscribe, health_check)
//! ```
//!
//! Several pollers can share one `RequestCoordinator`; the coordinator is the
//! only place that decides whether an upstream request may start.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use token_price_poller::{PollerConfig, PricePoller, RequestCoordinator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PollerConfig::from_env()?;
//! let coordinator = Arc::new(RequestCoordinator::new());
//!
//! let poller = PricePoller::with_coordinator(config, coordinator)?;
//! poller.activate();
//!
//! if let Some(sol) = poller.get_price("SOL").await {
//!     println!("SOL: ${:.2}", sol.price);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Cycles never fail past the engine boundary. Every outcome lands in the
//! consumer view:
//!
//! ```no_run
//! use token_price_poller::{FeedStatus, PricePoller};
//!
//! # async fn example(poller: PricePoller) {
//! match poller.status().await {
//!     FeedStatus::Loading => println!("waiting for first prices"),
//!     FeedStatus::Live => println!("live"),
//!     FeedStatus::Degraded => println!("degraded: {:?}", poller.error().await),
//!     FeedStatus::Failed => println!("failed: {:?}", poller.error().await),
//! }
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod provider;
pub mod providers;
pub mod store;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use config::PollerConfig;
pub use coordinator::{CoordinatorState, RequestCoordinator, RequestPermit};
pub use engine::{CycleOutcome, PriceFetchEngine};
pub use error::{ConfigError, DenyReason, FetchError, ProviderError, WalletError};
pub use metrics::CycleMetrics;
pub use poller::PricePoller;
pub use provider::PriceSource;
pub use providers::BirdeyeSource;
pub use store::{PriceFeedStore, PriceFeedView};
pub use types::{
    ComponentHealth, EndpointMode, FeedStatus, HealthStatus, PriceFeedEvent, PriceRecord,
    PriceSnapshot, TrackedAsset,
};
pub use wallet::{PubkeyWallet, WalletEvent, WalletInfo, WalletProvider, WalletSession};
