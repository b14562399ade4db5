//! Historical candle use case.
//!
//! Validates raw request parameters into a [`CandleQuery`] and asks the
//! configured provider for candles.

use std::sync::Arc;

use serde::Deserialize;

use crate::application::ports::MarketDataProvider;
use crate::domain::market::{
    Candle, CandleQuery, CandleWindow, DEFAULT_LIMIT, Interval, MAX_EXPLICIT_LIMIT, derive_limit,
};
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;

/// Symbol used when the request names none.
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// Raw parameters of a historical request, as received over HTTP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRequest {
    /// Any supported symbol spelling.
    pub symbol: Option<String>,
    /// Interval wire form (`5m`, `1h`, ...).
    pub interval: Option<String>,
    /// Explicit candle count.
    pub limit: Option<u32>,
    /// Range start, Unix ms.
    pub start_time: Option<i64>,
    /// Range end, Unix ms.
    pub end_time: Option<i64>,
    /// Day count (provider-shaped request).
    pub days: Option<u32>,
}

impl HistoricalRequest {
    /// Validate into a [`CandleQuery`].
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError::BadRequest`] for an unknown interval, a limit
    /// outside `1..=1000`, a zero day count, or a range whose start is after
    /// its end.
    pub fn to_query(&self) -> Result<CandleQuery, MarketDataError> {
        let asset = Asset::resolve_or_default(self.symbol.as_deref().unwrap_or(DEFAULT_SYMBOL));

        if let Some(days) = self.days {
            if days == 0 {
                return Err(MarketDataError::bad_request("days must be at least 1"));
            }
            return Ok(CandleQuery {
                asset,
                window: CandleWindow::Days(days),
            });
        }

        let interval = match self.interval.as_deref() {
            Some(raw) => raw.parse::<Interval>()?,
            None => Interval::default(),
        };

        if let (Some(start), Some(end)) = (self.start_time, self.end_time)
            && start > end
        {
            return Err(MarketDataError::bad_request(format!(
                "startTime {start} is after endTime {end}"
            )));
        }

        let limit = match (self.limit, self.start_time, self.end_time) {
            (Some(limit), _, _) => {
                if !(1..=MAX_EXPLICIT_LIMIT).contains(&limit) {
                    return Err(MarketDataError::bad_request(format!(
                        "limit must be between 1 and {MAX_EXPLICIT_LIMIT}"
                    )));
                }
                limit
            }
            (None, Some(start), Some(end)) => derive_limit(start, end, interval),
            _ => DEFAULT_LIMIT,
        };

        Ok(CandleQuery {
            asset,
            window: CandleWindow::Range {
                interval,
                limit,
                start_time: self.start_time,
                end_time: self.end_time,
            },
        })
    }
}

/// Fetches normalized candle sequences.
#[derive(Clone)]
pub struct HistoricalDataService {
    provider: Arc<dyn MarketDataProvider>,
}

impl HistoricalDataService {
    /// Create a service backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }

    /// Provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Validate `request` and fetch its candles, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates validation errors and provider errors unchanged.
    #[tracing::instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn candles(&self, request: &HistoricalRequest) -> Result<Vec<Candle>, MarketDataError> {
        let query = request.to_query()?;
        let mut candles = self.provider.fetch_candles(query).await?;

        // Upstreams return ascending data; keep the ordering guarantee regardless.
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!(asset = %query.asset, count = candles.len(), "Fetched candles");
        Ok(candles)
    }
}

impl std::fmt::Debug for HistoricalDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalDataService")
            .field("provider", &self.provider.name())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
