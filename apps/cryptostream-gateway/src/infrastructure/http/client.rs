//! Outbound HTTP clients and the single-host request loop.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Proxy};
use thiserror::Error;

use super::retry::{RetryBudget, StatusCategory, categorize_status};
use crate::infrastructure::config::ProxySettings;

/// Longest slice of an upstream body kept in error messages.
const BODY_SNIPPET_LEN: usize = 200;

/// A single upstream request failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request did not finish within the timeout.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a non-success status.
    #[error("HTTP {status}: {}", snippet(.body))]
    Status {
        /// Status code.
        status: u16,
        /// Response body.
        body: String,
        /// `Retry-After` header in seconds, if present.
        retry_after_secs: Option<u64>,
    },

    /// Every alternate host failed.
    #[error("All alternative endpoints failed: {0}")]
    AllHostsFailed(Box<FetchError>),
}

impl FetchError {
    /// Upstream status code, looking through [`FetchError::AllHostsFailed`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::AllHostsFailed(inner) => inner.status(),
            Self::Transport(_) | Self::Timeout(_) => None,
        }
    }

    /// Whether repeating the same request might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => categorize_status(*status) == StatusCategory::Retryable,
            Self::AllHostsFailed(_) => false,
        }
    }

    /// Human-readable upstream message, preferring the message field of a JSON body.
    #[must_use]
    pub fn upstream_message(&self) -> String {
        match self {
            Self::Status { body, .. } => {
                upstream_message(body).unwrap_or_else(|| snippet(body).to_string())
            }
            Self::AllHostsFailed(inner) => inner.upstream_message(),
            other => other.to_string(),
        }
    }
}

/// Per-call request options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Retries after the first try.
    pub retry_count: u32,
    /// Per-try timeout.
    pub timeout: Duration,
    /// Extra request headers.
    pub headers: HeaderMap,
}

impl FetchOptions {
    /// Options with no extra headers.
    #[must_use]
    pub fn new(retry_count: u32, timeout: Duration) -> Self {
        Self {
            retry_count,
            timeout,
            headers: HeaderMap::new(),
        }
    }

    /// Same options with a different retry count and timeout.
    #[must_use]
    pub fn with_limits(&self, retry_count: u32, timeout: Duration) -> Self {
        Self {
            retry_count,
            timeout,
            headers: self.headers.clone(),
        }
    }

    /// Attach a header whose value is hidden from `Debug` output.
    ///
    /// # Errors
    ///
    /// Returns the header value error if `value` contains invalid characters.
    pub fn with_sensitive_header(
        mut self,
        name: &'static str,
        value: &str,
    ) -> Result<Self, reqwest::header::InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(value)?;
        value.set_sensitive(true);
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }
}

// =============================================================================
// Clients
// =============================================================================

/// Outbound clients: one that never uses a proxy and, when configured, one
/// that always does.
#[derive(Debug, Clone)]
pub struct HttpClients {
    direct: Client,
    proxied: Option<Client>,
}

impl HttpClients {
    /// Build the clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend or proxy cannot be initialized.
    pub fn new(proxy: Option<&ProxySettings>) -> Result<Self, reqwest::Error> {
        let direct = Client::builder().no_proxy().build()?;

        let proxied = match proxy {
            Some(settings) => {
                let mut proxy = Proxy::all(&settings.url)?;
                if let Some(credentials) = &settings.credentials {
                    proxy = proxy.basic_auth(&credentials.username, &credentials.password);
                }
                tracing::info!(proxy = %settings.url, "Outbound proxy configured");
                Some(Client::builder().proxy(proxy).build()?)
            }
            None => None,
        };

        Ok(Self { direct, proxied })
    }

    /// Client that bypasses any proxy, including system proxy variables.
    #[must_use]
    pub const fn direct(&self) -> &Client {
        &self.direct
    }

    /// Proxied client, if a proxy is configured.
    #[must_use]
    pub const fn proxied(&self) -> Option<&Client> {
        self.proxied.as_ref()
    }

    /// Proxied client when configured, otherwise the direct one.
    #[must_use]
    pub fn preferred(&self) -> &Client {
        self.proxied.as_ref().unwrap_or(&self.direct)
    }
}

// =============================================================================
// Request Loop
// =============================================================================

/// GET `url` and return the body, retrying transport failures, timeouts,
/// 408 and 5xx up to `options.retry_count` times.
///
/// # Errors
///
/// Returns the last failure once retries are spent, or the first
/// non-retryable failure.
pub async fn fetch_text(
    client: &Client,
    url: &str,
    options: &FetchOptions,
) -> Result<String, FetchError> {
    let mut budget = RetryBudget::new(options.retry_count);

    loop {
        match send_once(client, url, options).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_retryable() => {
                let Some(delay) = budget.next_backoff() else {
                    return Err(e);
                };
                tracing::warn!(
                    url,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    attempt = budget.used(),
                    "Upstream request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_once(client: &Client, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .headers(options.headers.clone())
        .timeout(options.timeout)
        .send()
        .await
        .map_err(|e| classify(&e, options.timeout))?;

    let status = response.status();
    if status.is_success() {
        return response
            .text()
            .await
            .map_err(|e| classify(&e, options.timeout));
    }

    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(FetchError::Status {
        status: status.as_u16(),
        body,
        retry_after_secs,
    })
}

fn classify(error: &reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Transport(error.to_string())
    }
}

/// Message field of a JSON error body (`msg`, `error`, or
/// `status.error_message`).
#[must_use]
pub fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["/msg", "/error", "/message", "/status/error_message"]
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(|v| v.as_str()))
        .map(ToString::to_string)
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
