//! Provider REST payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::market::{AssetSnapshot, Candle};
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;

/// Upper band of the approximated daily range.
pub const APPROX_HIGH_FACTOR: f64 = 1.02;

/// Lower band of the approximated daily range.
pub const APPROX_LOW_FACTOR: f64 = 0.98;

/// `[timestamp, open, high, low, close]` row of `/coins/{id}/ohlc`.
pub type OhlcRow = (i64, f64, f64, f64, f64);

/// `/coins/{id}/market_chart` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketChart {
    /// `[timestamp, price]` points.
    pub prices: Vec<(i64, f64)>,
    /// `[timestamp, volume]` points.
    #[serde(default)]
    pub total_volumes: Vec<(i64, f64)>,
}

/// One row of `/coins/markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRow {
    /// Coin id.
    pub id: String,
    /// Lowercase ticker.
    #[serde(default)]
    pub symbol: String,
    /// Current price in USD.
    pub current_price: Option<f64>,
    /// 24h volume.
    pub total_volume: Option<f64>,
    /// 24h change in percent.
    pub price_change_percentage_24h: Option<f64>,
    /// 24h high.
    pub high_24h: Option<f64>,
    /// 24h low.
    pub low_24h: Option<f64>,
    /// Provider's last update time.
    pub last_updated: Option<DateTime<Utc>>,
}

impl MarketRow {
    /// Convert into a snapshot for `asset`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` when the row has no price.
    pub fn into_snapshot(self, asset: Asset) -> Result<AssetSnapshot, MarketDataError> {
        let price = self
            .current_price
            .ok_or_else(|| MarketDataError::malformed(format!("{} has no current_price", self.id)))?;
        Ok(AssetSnapshot::new(
            asset,
            price,
            self.price_change_percentage_24h.unwrap_or(0.0),
            self.high_24h,
            self.low_24h,
            self.total_volume.unwrap_or(0.0),
            self.last_updated.unwrap_or_else(Utc::now),
        ))
    }
}

/// Parse an OHLC body into candles. The endpoint reports no volume.
///
/// # Errors
///
/// Returns `MalformedResponse` if the body is not an array of 5-number rows.
pub fn parse_ohlc(body: &str) -> Result<Vec<Candle>, MarketDataError> {
    let rows: Vec<OhlcRow> = serde_json::from_str(body)
        .map_err(|e| MarketDataError::malformed(format!("ohlc: {e}")))?;
    Ok(rows
        .into_iter()
        .map(|(timestamp, open, high, low, close)| Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        })
        .collect())
}

/// Parse a market chart body into approximate daily candles.
///
/// Only the price is known per point: open and close are the price, and
/// high/low are the price scaled by [`APPROX_HIGH_FACTOR`] and
/// [`APPROX_LOW_FACTOR`]. This is a known precision loss.
///
/// # Errors
///
/// Returns `MalformedResponse` if the body lacks a `prices` array.
pub fn parse_market_chart(body: &str) -> Result<Vec<Candle>, MarketDataError> {
    let chart: MarketChart = serde_json::from_str(body)
        .map_err(|e| MarketDataError::malformed(format!("market_chart: {e}")))?;

    Ok(chart
        .prices
        .iter()
        .enumerate()
        .map(|(i, &(timestamp, price))| Candle {
            timestamp,
            open: price,
            high: price * APPROX_HIGH_FACTOR,
            low: price * APPROX_LOW_FACTOR,
            close: price,
            volume: chart.total_volumes.get(i).map_or(0.0, |&(_, v)| v),
        })
        .collect())
}

/// Parse a markets body.
///
/// # Errors
///
/// Returns `MalformedResponse` if the body is not an array of rows.
pub fn parse_markets(body: &str) -> Result<Vec<MarketRow>, MarketDataError> {
    serde_json::from_str(body).map_err(|e| MarketDataError::malformed(format!("markets: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ohlc_rows_become_candles() {
        let candles = parse_ohlc("[[1700000000000, 1.0, 2.0, 0.5, 1.5]]").unwrap();
        assert_eq!(
            candles,
            vec![Candle {
                timestamp: 1_700_000_000_000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 0.0
            }]
        );
    }

    #[test]
    fn market_chart_approximates_range() {
        let candles = parse_market_chart(
            r#"{"prices":[[1,100.0],[2,200.0]],"market_caps":[],"total_volumes":[[1,5.0],[2,6.0]]}"#,
        )
        .unwrap();
        assert_eq!(candles.len(), 2);
        assert!((candles[0].high - 102.0).abs() < 1e-9);
        assert!((candles[0].low - 98.0).abs() < 1e-9);
        assert_eq!(candles[1].close, 200.0);
        assert_eq!(candles[1].volume, 6.0);
    }

    #[test]
    fn market_chart_without_prices_is_malformed() {
        assert!(matches!(
            parse_market_chart(r#"{"error":"coin not found"}"#),
            Err(MarketDataError::MalformedResponse(_))
        ));
    }

    #[test]
    fn market_row_defaults() {
        let rows = parse_markets(
            r#"[{"id":"bitcoin","symbol":"btc","name":"Bitcoin","current_price":50000.0,
                 "total_volume":null,"price_change_percentage_24h":2.5,
                 "high_24h":null,"low_24h":49000.0,"last_updated":"2024-01-01T00:00:00.000Z"}]"#,
        )
        .unwrap();
        let snapshot = rows[0].clone().into_snapshot(Asset::Bitcoin).unwrap();
        assert_eq!(snapshot.high_24h, 50000.0);
        assert_eq!(snapshot.low_24h, 49000.0);
        assert_eq!(snapshot.volume_24h, 0.0);
        assert_eq!(snapshot.change_24h, 2.5);
    }

    #[test]
    fn market_row_without_price_is_malformed() {
        let rows = parse_markets(r#"[{"id":"tron","current_price":null}]"#).unwrap();
        assert!(rows[0].clone().into_snapshot(Asset::Tron).is_err());
    }
}
