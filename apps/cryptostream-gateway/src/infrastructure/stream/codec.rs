//! Ticker Frame Codec
//!
//! Decodes combined-stream ticker frames:
//!
//! ```json
//! {"stream":"btcusdt@ticker","data":{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT",
//!  "p":"120.5","P":"0.33","c":"37000.1","h":"37200","l":"36500","v":"1234.5","q":"45678901.2"}}
//! ```
//!
//! Numeric fields are decimal strings except the event time `E`. Bare
//! payloads (single-stream connections) are accepted too.

use serde::Deserialize;

use crate::domain::market::PriceUpdate;
use crate::domain::symbol::Asset;
use crate::infrastructure::binance::millis_to_datetime;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A numeric field did not parse.
    #[error("invalid number in field {field}: {value:?}")]
    InvalidNumber {
        /// Wire field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// Event time out of range.
    #[error("invalid event time: {0}")]
    InvalidEventTime(i64),
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// Ticker for a tracked asset.
    Update(PriceUpdate),
    /// Ticker for a symbol that maps to no tracked asset.
    Unmapped(String),
}

/// Ticker payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPayload {
    /// Event type.
    #[serde(rename = "e", default)]
    pub event_type: String,
    /// Event time, Unix ms.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Exchange symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Absolute 24h change.
    #[serde(rename = "p")]
    pub price_change: String,
    /// 24h change in percent.
    #[serde(rename = "P")]
    pub price_change_percent: String,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: String,
    /// 24h high.
    #[serde(rename = "h")]
    pub high_price: String,
    /// 24h low.
    #[serde(rename = "l")]
    pub low_price: String,
    /// 24h base volume.
    #[serde(rename = "v")]
    pub volume: String,
    /// 24h quote volume.
    #[serde(rename = "q")]
    pub quote_volume: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Combined { data: TickerPayload },
    Bare(TickerPayload),
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns a [`CodecError`] if the frame is not a ticker payload or a field
/// does not parse.
pub fn decode(text: &str) -> Result<DecodedFrame, CodecError> {
    let payload = match serde_json::from_str::<Envelope>(text)? {
        Envelope::Combined { data } | Envelope::Bare(data) => data,
    };

    let Some(asset) = Asset::resolve(&payload.symbol) else {
        return Ok(DecodedFrame::Unmapped(payload.symbol));
    };

    let event_time = millis_to_datetime(payload.event_time)
        .ok_or(CodecError::InvalidEventTime(payload.event_time))?;

    Ok(DecodedFrame::Update(PriceUpdate {
        asset,
        symbol: asset.display(),
        price: number("c", &payload.last_price)?,
        price_change: number("p", &payload.price_change)?,
        change_24h: number("P", &payload.price_change_percent)?,
        high_24h: number("h", &payload.high_price)?,
        low_24h: number("l", &payload.low_price)?,
        volume_24h: number("q", &payload.quote_volume)?,
        event_time,
    }))
}

fn number(field: &'static str, value: &str) -> Result<f64, CodecError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CodecError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}
