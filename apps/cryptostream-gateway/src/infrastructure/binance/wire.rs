//! Exchange REST payloads.
//!
//! Prices and volumes arrive as decimal strings; they are parsed to `f64`
//! here and nowhere else.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::market::{AssetSnapshot, Candle};
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;

/// `GET /api/v3/ticker/24hr` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    /// Exchange ticker.
    pub symbol: String,
    /// Last trade price.
    pub last_price: String,
    /// 24h change in percent.
    pub price_change_percent: String,
    /// 24h high.
    pub high_price: Option<String>,
    /// 24h low.
    pub low_price: Option<String>,
    /// 24h quote-asset volume.
    pub quote_volume: String,
    /// Window close time, Unix ms.
    pub close_time: Option<i64>,
}

impl Ticker24h {
    /// Convert into a snapshot for `asset`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if a numeric field does not parse.
    pub fn into_snapshot(self, asset: Asset) -> Result<AssetSnapshot, MarketDataError> {
        let price = parse_decimal(&self.last_price, "lastPrice")?;
        let change = parse_decimal(&self.price_change_percent, "priceChangePercent")?;
        let high = self
            .high_price
            .as_deref()
            .map(|v| parse_decimal(v, "highPrice"))
            .transpose()?;
        let low = self
            .low_price
            .as_deref()
            .map(|v| parse_decimal(v, "lowPrice"))
            .transpose()?;
        let volume = parse_decimal(&self.quote_volume, "quoteVolume")?;
        let last_update = self
            .close_time
            .and_then(millis_to_datetime)
            .unwrap_or_else(Utc::now);

        Ok(AssetSnapshot::new(asset, price, change, high, low, volume, last_update))
    }
}

/// Parse a klines response body: an array of
/// `[openTime, open, high, low, close, volume, ...]` rows.
///
/// # Errors
///
/// Returns `MalformedResponse` if the body is not an array of rows or a row
/// is short or non-numeric.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>, MarketDataError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| MarketDataError::malformed(format!("klines: expected array of rows: {e}")))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            parse_kline_row(row)
                .map_err(|e| MarketDataError::malformed(format!("klines row {i}: {e}")))
        })
        .collect()
}

fn parse_kline_row(row: &[Value]) -> Result<Candle, String> {
    if row.len() < 6 {
        return Err(format!("expected at least 6 fields, got {}", row.len()));
    }
    let timestamp = row[0].as_i64().ok_or("openTime is not an integer")?;
    let field = |idx: usize| -> Result<f64, String> {
        match &row[idx] {
            Value::String(s) => s.parse().map_err(|_| format!("field {idx} is not a number: {s}")),
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("field {idx} out of range")),
            other => Err(format!("field {idx} has unexpected type: {other}")),
        }
    };

    Ok(Candle {
        timestamp,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

/// Parse a decimal string field.
///
/// # Errors
///
/// Returns `MalformedResponse` naming `field`.
pub fn parse_decimal(value: &str, field: &str) -> Result<f64, MarketDataError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MarketDataError::malformed(format!("{field} is not a number: {value:?}")))
}

/// Convert a Unix millisecond timestamp.
#[must_use]
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KLINES: &str = r#"[
        [1700000000000,"37000.10","37100.00","36950.5","37050.0","123.4",1700000059999,"4567.8",10,"1","2","0"],
        [1700000060000,"37050.0","37060.0","37000.0","37010.0","99.9",1700000119999,"3700.0",8,"1","2","0"]
    ]"#;

    #[test]
    fn parses_kline_rows() {
        let candles = parse_klines(KLINES).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
        assert!((candles[0].open - 37000.10).abs() < 1e-9);
        assert!((candles[1].volume - 99.9).abs() < 1e-9);
    }

    #[test]
    fn empty_array_is_empty() {
        assert!(parse_klines("[]").unwrap().is_empty());
    }

    #[test]
    fn non_array_is_malformed() {
        let err = parse_klines(r#"{"code":-1121,"msg":"Invalid symbol."}"#).unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedResponse(_)));
    }

    #[test]
    fn short_row_is_malformed() {
        let err = parse_klines(r#"[[1700000000000,"1","2"]]"#).unwrap_err();
        assert!(err.to_string().contains("row 0"));
    }

    #[test]
    fn ticker_maps_to_snapshot() {
        let ticker: Ticker24h = serde_json::from_str(
            r#"{"symbol":"ETHUSDT","lastPrice":"2000.5","priceChangePercent":"-1.25",
                "highPrice":"2100","lowPrice":"1950","quoteVolume":"123456.7",
                "volume":"61.7","closeTime":1700000000000}"#,
        )
        .unwrap();
        let snapshot = ticker.into_snapshot(Asset::Ethereum).unwrap();
        assert_eq!(snapshot.symbol, "ETH/USD");
        assert!((snapshot.price - 2000.5).abs() < 1e-9);
        assert!((snapshot.change_24h + 1.25).abs() < 1e-9);
        assert!((snapshot.volume_24h - 123_456.7).abs() < 1e-9);
        assert_eq!(snapshot.last_update.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn missing_high_low_default_to_price() {
        let ticker: Ticker24h = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","lastPrice":"10","priceChangePercent":"0","quoteVolume":"0"}"#,
        )
        .unwrap();
        let snapshot = ticker.into_snapshot(Asset::Bitcoin).unwrap();
        assert_eq!(snapshot.high_24h, 10.0);
        assert_eq!(snapshot.low_24h, 10.0);
    }

    #[test]
    fn garbage_number_is_malformed() {
        assert!(parse_decimal("abc", "lastPrice").is_err());
        assert!(parse_decimal("NaN", "lastPrice").is_err());
    }
}
