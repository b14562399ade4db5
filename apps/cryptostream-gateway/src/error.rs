//! Error taxonomy for the market data gateway.
//!
//! Every failure that reaches a caller is a [`MarketDataError`]. Each variant
//! maps to a machine-checkable [`ErrorKind`] and an HTTP status, so the same
//! error can be matched on in Rust code or rendered as a JSON envelope by the
//! HTTP layer.
//!
//! | Kind | HTTP | Retried? |
//! |------|------|----------|
//! | `BAD_REQUEST` | 400 | never |
//! | `KEY_NOT_CONFIGURED` | 401 | never |
//! | `KEY_INVALID` | 401 | never (key is quarantined) |
//! | `RATE_LIMITED` | 429 | left to the caller |
//! | `UPSTREAM_UNAVAILABLE` | 503 | already retried per strategy and across strategies |
//! | `MALFORMED_RESPONSE` | 502 | never |
//! | `STREAM_TERMINAL` | 503 | only through an explicit reconnect |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-checkable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Invalid interval, limit, range or symbol supplied by the caller.
    BadRequest,
    /// No usable provider API key is configured.
    KeyNotConfigured,
    /// The provider rejected the API key that was used.
    KeyInvalid,
    /// An upstream answered with HTTP 429.
    RateLimited,
    /// Every fallback strategy was exhausted.
    UpstreamUnavailable,
    /// The upstream answered with a payload of the wrong shape.
    MalformedResponse,
    /// Stream reconnection attempts are exhausted.
    StreamTerminal,
}

impl ErrorKind {
    /// HTTP status code used when this kind is rendered by the server.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::KeyNotConfigured | Self::KeyInvalid => 401,
            Self::RateLimited => 429,
            Self::MalformedResponse => 502,
            Self::UpstreamUnavailable | Self::StreamTerminal => 503,
        }
    }

    /// Stable reason string.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::KeyNotConfigured => "KEY_NOT_CONFIGURED",
            Self::KeyInvalid => "KEY_INVALID",
            Self::RateLimited => "RATE_LIMITED",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::MalformedResponse => "MALFORMED_RESPONSE",
            Self::StreamTerminal => "STREAM_TERMINAL",
        }
    }

    /// Short human-readable status message for error envelopes.
    #[must_use]
    pub const fn status_message(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::KeyNotConfigured => "API Key Not Configured",
            Self::KeyInvalid => "API Key Invalid",
            Self::RateLimited => "Too Many Requests",
            Self::UpstreamUnavailable => "Service Unavailable",
            Self::MalformedResponse => "Bad Gateway",
            Self::StreamTerminal => "Stream Unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// One failed strategy attempt recorded by the fallback router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    /// Strategy name (`direct`, `relay`, `alternates`, ...).
    pub strategy: String,
    /// Failure description.
    pub message: String,
}

/// Errors surfaced by the market data services.
#[derive(Debug, Clone, Error)]
pub enum MarketDataError {
    /// Caller supplied invalid parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No provider key is configured.
    #[error("no provider API key configured")]
    KeyNotConfigured,

    /// Provider rejected key number `key_index + 1`.
    #[error("provider rejected API key {} (HTTP {status})", key_index + 1)]
    KeyInvalid {
        /// Zero-based index of the rejected key in the pool.
        key_index: usize,
        /// Upstream status (401 or 403), or 0 if the key could not be sent.
        status: u16,
    },

    /// Upstream throttled the request.
    #[error("rate limited by {upstream}")]
    RateLimited {
        /// Upstream name.
        upstream: String,
        /// Value of the `Retry-After` header, if any.
        retry_after_secs: Option<u64>,
    },

    /// All strategies failed.
    #[error("upstream unavailable: {last_error}")]
    UpstreamUnavailable {
        /// Message of the last underlying failure.
        last_error: String,
        /// Every failed strategy, in the order tried.
        failures: Vec<StrategyFailure>,
    },

    /// Upstream payload failed validation.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Stream gave up reconnecting.
    #[error("stream reconnection attempts exhausted after {attempts} attempts")]
    StreamTerminal {
        /// Number of reconnect attempts made.
        attempts: u32,
    },
}

impl MarketDataError {
    /// Kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::KeyNotConfigured => ErrorKind::KeyNotConfigured,
            Self::KeyInvalid { .. } => ErrorKind::KeyInvalid,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::StreamTerminal { .. } => ErrorKind::StreamTerminal,
        }
    }

    /// Shorthand for a [`MarketDataError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Shorthand for a [`MarketDataError::MalformedResponse`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}

// =============================================================================
// Tests
// =============================================================================
