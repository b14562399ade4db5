//! Relay endpoint.
//!
//! `GET /api/binance-proxy?endpoint=/api/v3/...&<params>` forwards to the
//! primary exchange host and re-emits its body, so a gateway deployed where
//! the exchange is reachable can serve one where it is not.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use reqwest::Client;

use super::AppState;
use super::error::ApiError;
use crate::infrastructure::http::{FetchError, FetchOptions, fetch_text};

/// Retries for relayed requests.
const RELAY_RETRY_COUNT: u32 = 2;

/// Timeout for relayed requests.
const RELAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Forwarding target of the relay.
#[derive(Debug, Clone)]
pub struct RelayUpstream {
    client: Client,
    base_url: String,
}

impl RelayUpstream {
    /// Relay forwarding to `base_url` through `client`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Upstream URL for `endpoint` plus pass-through query pairs.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`ApiError`] if `endpoint` is not an `/api/` path.
    pub fn target_url(&self, endpoint: &str, params: &[(String, String)]) -> Result<String, ApiError> {
        if !endpoint.starts_with("/api/") || endpoint.contains("..") {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                format!("endpoint must be an /api/ path, got {endpoint:?}"),
            ));
        }

        let mut url = reqwest::Url::parse(&format!("{}{endpoint}", self.base_url)).map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, "Bad Request", format!("invalid endpoint: {e}"))
        })?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url.into())
    }

    async fn forward(&self, url: &str) -> Result<String, FetchError> {
        let options = FetchOptions::new(RELAY_RETRY_COUNT, RELAY_TIMEOUT);
        fetch_text(&self.client, url, &options).await
    }
}

pub(super) async fn relay_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let mut endpoint = None;
    let mut params = Vec::with_capacity(query.len());
    for (key, value) in query {
        if key == "endpoint" {
            endpoint = Some(value);
        } else if !value.is_empty() {
            params.push((key, value));
        }
    }

    let Some(endpoint) = endpoint.filter(|e| !e.is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "Parameter \"endpoint\" required. Example: /api/v3/ticker/24hr",
        ));
    };

    let url = state.relay.target_url(&endpoint, &params)?;
    tracing::info!(endpoint = %endpoint, "Relaying exchange request");

    match state.relay.forward(&url).await {
        Ok(body) => Ok(([(CONTENT_TYPE, "application/json")], body).into_response()),
        Err(e) => {
            tracing::warn!(endpoint = %endpoint, error = %e, "Relay request failed");
            Err(relay_error(&e))
        }
    }
}

fn relay_error(error: &FetchError) -> ApiError {
    match error.status() {
        Some(400) => ApiError::new(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            format!("Invalid Binance API request: {}", error.upstream_message()),
        ),
        Some(429) => ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests",
            "Rate limit exceeded. Please try again later.",
        ),
        status => ApiError::new(
            status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
            "Service Unavailable",
            format!("Cannot connect to Binance API. {error}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> RelayUpstream {
        RelayUpstream::new(Client::new(), "https://api.binance.com")
    }

    #[test]
    fn target_url_copies_params() {
        let url = relay()
            .target_url(
                "/api/v3/klines",
                &[("symbol".to_string(), "BTCUSDT".to_string()), ("limit".to_string(), "5".to_string())],
            )
            .unwrap();
        assert_eq!(url, "https://api.binance.com/api/v3/klines?symbol=BTCUSDT&limit=5");
    }

    #[test]
    fn target_url_without_params_has_no_query() {
        assert_eq!(
            relay().target_url("/api/v3/ping", &[]).unwrap(),
            "https://api.binance.com/api/v3/ping"
        );
    }

    #[test]
    fn non_api_endpoint_is_rejected() {
        for endpoint in ["/admin", "https://evil.example/api/", "/api/../secret"] {
            let err = relay().target_url(endpoint, &[]).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn upstream_failures_keep_status_or_use_503() {
        let not_found = FetchError::Status {
            status: 404,
            body: String::new(),
            retry_after_secs: None,
        };
        assert_eq!(relay_error(&not_found).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            relay_error(&FetchError::Transport("refused".to_string())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn bad_request_carries_exchange_message() {
        let err = relay_error(&FetchError::Status {
            status: 400,
            body: r#"{"code":-1121,"msg":"Invalid symbol."}"#.to_string(),
            retry_after_secs: None,
        });
        assert_eq!(err.message(), "Invalid Binance API request: Invalid symbol.");
    }
}
