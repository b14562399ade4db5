#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! CryptoStream Gateway - Crypto Market Data Aggregator
//!
//! Serves historical candles and 24h snapshots for a fixed set of crypto
//! assets from either Binance or CoinGecko, relays Binance REST calls, and
//! keeps a live board fed from the Binance combined ticker stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure market data logic
//!   - `symbol`: Tracked assets and symbol normalization
//!   - `market`: Candles, snapshots, intervals and candle queries
//!   - `keys`: Provider API key rotation and quarantine
//!   - `subscription`: Stream subscriber registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market data provider and stream transport interfaces
//!   - `services`: Historical, snapshot and live board services
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `http`: Retrying fetch, strategies and the fallback router
//!   - `binance` / `coingecko`: Provider adapters
//!   - `stream`: Ticker stream connection and registry
//!   - `server`: Relay, market and health endpoints
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐     ┌────────────┐
//! HTTP request ─────►│   Services   │────►│  Fallback  │──► proxy / direct /
//!                    └──────────────┘     │   Router   │    relay / alternates
//!                                         └────────────┘
//! Ticker stream ──► StreamConnection ──► SubscriberRegistry ──► callbacks
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Error taxonomy shared by every layer.
pub mod error;

/// Domain layer - Market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Errors
pub use error::{ErrorKind, MarketDataError, StrategyFailure};

// Domain types
pub use domain::keys::{ApiKey, KeyPoolStats, KeyRotationRegistry};
pub use domain::market::{AssetSnapshot, Candle, CandleQuery, CandleWindow, Interval, PriceUpdate};
pub use domain::subscription::{SubscriberRegistry, Subscription, SubscriptionKey, UpdateCallback};
pub use domain::symbol::Asset;

// Application
pub use application::ports::{MarketDataProvider, StreamTransport};
pub use application::services::{
    HistoricalDataService, HistoricalRequest, LiveMarketBoard, MarketSnapshotService,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig, ProviderKind};

// Server
pub use infrastructure::server::{AppState, GatewayServer, ServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
