//! Market Data Types
//!
//! Normalized records produced by the REST clients and the ticker stream:
//! OHLCV [`Candle`]s, 24h [`AssetSnapshot`]s and live [`PriceUpdate`]s, plus
//! the query types used to ask for candles.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::symbol::Asset;
use crate::error::MarketDataError;

/// Largest limit the exchange accepts for an explicit candle request.
pub const MAX_EXPLICIT_LIMIT: u32 = 1000;

/// Cap applied to a limit derived from a time range.
pub const MAX_DERIVED_LIMIT: u32 = 365;

/// Limit used when the caller gives neither a limit nor a range.
pub const DEFAULT_LIMIT: u32 = 60;

/// Milliseconds per day.
pub const DAY_MS: i64 = 86_400_000;

// =============================================================================
// Records
// =============================================================================

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, Unix milliseconds.
    pub timestamp: i64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
}

/// 24h market snapshot for one tracked asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSnapshot {
    /// Canonical symbol, e.g. `BTC/USD`.
    pub symbol: String,
    /// Asset name.
    pub name: String,
    /// Last price.
    pub price: f64,
    /// 24h change in percent.
    pub change_24h: f64,
    /// 24h high.
    pub high_24h: f64,
    /// 24h low.
    pub low_24h: f64,
    /// 24h volume in quote currency.
    pub volume_24h: f64,
    /// Time of the last update.
    pub last_update: DateTime<Utc>,
    /// Price before the most recent live update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_price: Option<f64>,
}

impl AssetSnapshot {
    /// Build a snapshot, defaulting a missing high or low to the price.
    #[must_use]
    pub fn new(
        asset: Asset,
        price: f64,
        change_24h: f64,
        high_24h: Option<f64>,
        low_24h: Option<f64>,
        volume_24h: f64,
        last_update: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: asset.display(),
            name: asset.name().to_string(),
            price,
            change_24h,
            high_24h: high_24h.unwrap_or(price),
            low_24h: low_24h.unwrap_or(price),
            volume_24h,
            last_update,
            previous_price: None,
        }
    }

    /// Zeroed snapshot used before any data has arrived.
    #[must_use]
    pub fn empty(asset: Asset, now: DateTime<Utc>) -> Self {
        Self::new(asset, 0.0, 0.0, None, None, 0.0, now)
    }

    /// Apply a live update in place, remembering the prior price.
    pub fn apply(&mut self, update: &PriceUpdate) {
        self.previous_price = Some(self.price);
        self.price = update.price;
        self.change_24h = update.change_24h;
        self.high_24h = update.high_24h;
        self.low_24h = update.low_24h;
        self.volume_24h = update.volume_24h;
        self.last_update = update.event_time;
    }
}

/// Normalized live ticker update dispatched to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Asset the update belongs to.
    pub asset: Asset,
    /// Canonical symbol.
    pub symbol: String,
    /// Last price.
    pub price: f64,
    /// 24h absolute price change.
    pub price_change: f64,
    /// 24h change in percent.
    pub change_24h: f64,
    /// 24h high.
    pub high_24h: f64,
    /// 24h low.
    pub low_24h: f64,
    /// 24h volume in quote currency.
    pub volume_24h: f64,
    /// Upstream event time.
    pub event_time: DateTime<Utc>,
}

// =============================================================================
// Intervals
// =============================================================================

/// Candle interval accepted by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interval {
    /// 1 minute.
    OneMinute,
    /// 3 minutes.
    ThreeMinutes,
    /// 5 minutes.
    #[default]
    FiveMinutes,
    /// 15 minutes.
    FifteenMinutes,
    /// 30 minutes.
    ThirtyMinutes,
    /// 1 hour.
    OneHour,
    /// 2 hours.
    TwoHours,
    /// 4 hours.
    FourHours,
    /// 6 hours.
    SixHours,
    /// 8 hours.
    EightHours,
    /// 12 hours.
    TwelveHours,
    /// 1 day.
    OneDay,
    /// 3 days.
    ThreeDays,
    /// 1 week.
    OneWeek,
    /// 1 month (counted as 30 days).
    OneMonth,
}

impl Interval {
    /// All intervals in ascending order.
    pub const ALL: [Self; 15] = [
        Self::OneMinute,
        Self::ThreeMinutes,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::TwoHours,
        Self::FourHours,
        Self::SixHours,
        Self::EightHours,
        Self::TwelveHours,
        Self::OneDay,
        Self::ThreeDays,
        Self::OneWeek,
        Self::OneMonth,
    ];

    /// Wire form, e.g. `5m`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
            Self::EightHours => "8h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
            Self::ThreeDays => "3d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1M",
        }
    }

    /// Interval length in milliseconds.
    #[must_use]
    pub const fn duration_ms(self) -> i64 {
        const MINUTE: i64 = 60_000;
        const HOUR: i64 = 60 * MINUTE;
        match self {
            Self::OneMinute => MINUTE,
            Self::ThreeMinutes => 3 * MINUTE,
            Self::FiveMinutes => 5 * MINUTE,
            Self::FifteenMinutes => 15 * MINUTE,
            Self::ThirtyMinutes => 30 * MINUTE,
            Self::OneHour => HOUR,
            Self::TwoHours => 2 * HOUR,
            Self::FourHours => 4 * HOUR,
            Self::SixHours => 6 * HOUR,
            Self::EightHours => 8 * HOUR,
            Self::TwelveHours => 12 * HOUR,
            Self::OneDay => DAY_MS,
            Self::ThreeDays => 3 * DAY_MS,
            Self::OneWeek => 7 * DAY_MS,
            Self::OneMonth => 30 * DAY_MS,
        }
    }
}

impl FromStr for Interval {
    type Err = MarketDataError;

    // Case-sensitive: `1m` is a minute and `1M` is a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|i| i.as_str()).collect();
                MarketDataError::bad_request(format!(
                    "invalid interval '{s}', expected one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Candle Queries
// =============================================================================

/// Window of candles to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleWindow {
    /// Interval-based request (exchange shape).
    Range {
        /// Candle interval.
        interval: Interval,
        /// Number of candles.
        limit: u32,
        /// Range start, Unix ms.
        start_time: Option<i64>,
        /// Range end, Unix ms.
        end_time: Option<i64>,
    },
    /// Day-count request (provider shape).
    Days(u32),
}

/// A validated candle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleQuery {
    /// Asset to fetch.
    pub asset: Asset,
    /// Window to fetch.
    pub window: CandleWindow,
}

/// Number of candles covering `[start_ms, end_ms]` at `interval`.
///
/// Rounds up, never returns less than 1, and clamps to [`MAX_DERIVED_LIMIT`].
#[must_use]
pub fn derive_limit(start_ms: i64, end_ms: i64, interval: Interval) -> u32 {
    let span = end_ms.saturating_sub(start_ms).max(0);
    let step = interval.duration_ms();
    let count = span / step + i64::from(span % step != 0);
    u32::try_from(count.clamp(1, i64::from(MAX_DERIVED_LIMIT))).unwrap_or(MAX_DERIVED_LIMIT)
}

/// Number of whole days covering `span_ms`, at least 1.
#[must_use]
pub fn days_covering(span_ms: i64) -> u32 {
    let span = span_ms.max(0);
    let days = (span / DAY_MS + i64::from(span % DAY_MS != 0)).max(1);
    u32::try_from(days).unwrap_or(u32::MAX)
}

// =============================================================================
// Tests
// =============================================================================
