//! Application Services
//!
//! - [`HistoricalDataService`]: validated candle requests
//! - [`MarketSnapshotService`]: 24h snapshots for the tracked assets
//! - [`LiveMarketBoard`]: latest per-asset state fed by the ticker stream

mod historical;
mod live_board;
mod snapshot;

pub use historical::{DEFAULT_SYMBOL, HistoricalDataService, HistoricalRequest};
pub use live_board::{BoardView, LiveMarketBoard};
pub use snapshot::MarketSnapshotService;
