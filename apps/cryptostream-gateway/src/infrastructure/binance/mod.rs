//! Exchange REST Adapter
//!
//! [`MarketDataProvider`](crate::application::ports::MarketDataProvider)
//! backed by the exchange's public klines and 24h ticker endpoints. No API
//! key is needed.

mod client;
mod wire;

pub use client::{BinanceClient, DEFAULT_RETRY_COUNT, klines_path};
pub use wire::{Ticker24h, millis_to_datetime, parse_decimal, parse_klines};
