//! JSON error envelope.
//!
//! ```json
//! {"statusCode":429,"statusMessage":"Too Many Requests","message":"...","kind":"RATE_LIMITED"}
//! ```
//!
//! `kind` is present on the internal market endpoints and absent on the relay.

use axum::Json;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{ErrorKind, MarketDataError};

/// An HTTP error rendered as the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    status_message: String,
    message: String,
    kind: Option<ErrorKind>,
    retry_after_secs: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    status_code: u16,
    status_message: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl ApiError {
    /// Error with an explicit status and messages.
    pub fn new(status: StatusCode, status_message: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            status_message: status_message.into(),
            message: message.into(),
            kind: None,
            retry_after_secs: None,
        }
    }

    /// 400 tagged `BAD_REQUEST`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        MarketDataError::BadRequest(message.into()).into()
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<MarketDataError> for ApiError {
    fn from(err: MarketDataError) -> Self {
        let kind = err.kind();
        let status =
            StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after_secs = match &err {
            MarketDataError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        };
        Self {
            status,
            status_message: kind.status_message().to_string(),
            message: err.to_string(),
            kind: Some(kind),
            retry_after_secs,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(Envelope {
            status_code: self.status.as_u16(),
            status_message: &self.status_message,
            message: &self.message,
            kind: self.kind,
        });
        let mut response = (self.status, body).into_response();
        if let Some(secs) = self.retry_after_secs {
            response.headers_mut().insert(RETRY_AFTER, secs.into());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_errors_map_to_status_and_kind() {
        let err = ApiError::from(MarketDataError::KeyNotConfigured);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.kind, Some(ErrorKind::KeyNotConfigured));
        assert_eq!(err.status_message, "API Key Not Configured");
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = ApiError::from(MarketDataError::RateLimited {
            upstream: "binance".to_string(),
            retry_after_secs: Some(12),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "12");
    }

    #[test]
    fn plain_errors_have_no_kind() {
        let err = ApiError::new(StatusCode::BAD_REQUEST, "Bad Request", "missing endpoint");
        assert!(err.kind.is_none());
        assert_eq!(err.message(), "missing endpoint");
    }
}
