//! Market-Data Provider Adapter
//!
//! Keyed [`MarketDataProvider`](crate::application::ports::MarketDataProvider)
//! over the provider's OHLC, market chart and markets endpoints. Keys come
//! from a [`KeyRotationRegistry`](crate::domain::keys::KeyRotationRegistry);
//! a 401/403 quarantines the key that was used and surfaces `KeyInvalid`.

mod client;
mod wire;

pub use client::{API_KEY_HEADER, CoinGeckoClient, DEFAULT_RETRY_COUNT};
pub use wire::{
    APPROX_HIGH_FACTOR, APPROX_LOW_FACTOR, MarketChart, MarketRow, parse_market_chart,
    parse_markets, parse_ohlc,
};
