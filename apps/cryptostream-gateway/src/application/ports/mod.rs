//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`MarketDataProvider`]: candles and 24h snapshots from one upstream
//!   (exchange or market-data provider), selected by configuration
//! - [`StreamTransport`]: opens one socket session and yields its text frames

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::domain::market::{AssetSnapshot, Candle, CandleQuery};
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;

// =============================================================================
// Market Data Provider Port
// =============================================================================

/// Upstream source of candles and snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short provider name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Fetch candles for a validated query, oldest first.
    async fn fetch_candles(&self, query: CandleQuery) -> Result<Vec<Candle>, MarketDataError>;

    /// Fetch one 24h snapshot per asset, in the order given.
    ///
    /// All-or-nothing: if any asset fails, the whole call fails.
    async fn fetch_snapshot(&self, assets: &[Asset]) -> Result<Vec<AssetSnapshot>, MarketDataError>;
}

// =============================================================================
// Stream Transport Port
// =============================================================================

/// Inbound text frames of one socket session. The stream ends when the
/// remote side closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Socket-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Reading from an open session failed.
    #[error("read failed: {0}")]
    Read(String),
}

/// Opens socket sessions for the stream connection.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Perform the handshake against `url` and return the frame stream.
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError>;
}
