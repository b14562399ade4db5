//! Fetch strategies: one concrete way of reaching an upstream each.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::client::{FetchError, FetchOptions, fetch_text};

/// Path of the relay endpoint served by this gateway.
pub const RELAY_PATH: &str = "/api/binance-proxy";

/// Extra timeout granted to the relay hop.
const RELAY_EXTRA_TIMEOUT: Duration = Duration::from_secs(5);

/// One way of reaching an upstream.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Name used in logs, metrics and failure logs.
    fn name(&self) -> &str;

    /// GET `path_and_query` (e.g. `/api/v3/klines?symbol=BTCUSDT`).
    async fn fetch(&self, path_and_query: &str, options: &FetchOptions) -> Result<String, FetchError>;
}

// =============================================================================
// Host
// =============================================================================

/// Calls a single host with the caller's retry count and timeout.
#[derive(Debug, Clone)]
pub struct HostStrategy {
    name: String,
    client: Client,
    base_url: String,
}

impl HostStrategy {
    /// Strategy named `name` calling `base_url` through `client`.
    pub fn new(name: impl Into<String>, client: Client, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
        }
    }

    /// Host base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl FetchStrategy for HostStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, path_and_query: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let url = format!("{}{path_and_query}", self.base_url);
        fetch_text(&self.client, &url, options).await
    }
}

// =============================================================================
// Relay
// =============================================================================

/// Calls the relay endpoint, which forwards to the primary host from
/// wherever the relay runs.
#[derive(Debug, Clone)]
pub struct RelayStrategy {
    client: Client,
    relay_base: String,
}

impl RelayStrategy {
    /// Strategy calling the relay at `relay_base`.
    pub fn new(client: Client, relay_base: impl Into<String>) -> Self {
        Self {
            client,
            relay_base: relay_base.into(),
        }
    }

    /// Relay URL for an upstream `path_and_query`.
    #[must_use]
    pub fn relay_url(&self, path_and_query: &str) -> String {
        let (path, query) = path_and_query
            .split_once('?')
            .map_or((path_and_query, None), |(p, q)| (p, Some(q)));

        let mut url = format!("{}{RELAY_PATH}?endpoint={path}", self.relay_base);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('&');
            url.push_str(query);
        }
        url
    }
}

#[async_trait]
impl FetchStrategy for RelayStrategy {
    fn name(&self) -> &str {
        "relay"
    }

    async fn fetch(&self, path_and_query: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let options = options.with_limits(1, options.timeout + RELAY_EXTRA_TIMEOUT);
        fetch_text(&self.client, &self.relay_url(path_and_query), &options).await
    }
}

// =============================================================================
// Alternate Hosts
// =============================================================================

/// Tries each alternate host in order with one retry per host.
#[derive(Debug, Clone)]
pub struct AlternateHostsStrategy {
    client: Client,
    hosts: Vec<String>,
}

impl AlternateHostsStrategy {
    /// Strategy over `hosts`, tried in order.
    #[must_use]
    pub const fn new(client: Client, hosts: Vec<String>) -> Self {
        Self { client, hosts }
    }
}

#[async_trait]
impl FetchStrategy for AlternateHostsStrategy {
    fn name(&self) -> &str {
        "alternates"
    }

    async fn fetch(&self, path_and_query: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let options = options.with_limits(1, options.timeout);
        let mut last_error = FetchError::Transport("no alternate hosts configured".to_string());

        for host in &self.hosts {
            match fetch_text(&self.client, &format!("{host}{path_and_query}"), &options).await {
                Ok(body) => {
                    tracing::info!(host = %host, "Alternate host succeeded");
                    return Ok(body);
                }
                // Caller errors and throttling look the same on every host.
                Err(e) if matches!(e.status(), Some(400 | 429)) => return Err(e),
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "Alternate host failed");
                    last_error = e;
                }
            }
        }

        Err(FetchError::AllHostsFailed(Box::new(last_error)))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options() -> FetchOptions {
        FetchOptions::new(0, Duration::from_secs(2))
    }

    #[test]
    fn relay_url_carries_endpoint_and_query() {
        let relay = RelayStrategy::new(Client::new(), "http://relay:3000");
        assert_eq!(
            relay.relay_url("/api/v3/klines?symbol=BTCUSDT&interval=1h"),
            "http://relay:3000/api/binance-proxy?endpoint=/api/v3/klines&symbol=BTCUSDT&interval=1h"
        );
        assert_eq!(
            relay.relay_url("/api/v3/ping"),
            "http://relay:3000/api/binance-proxy?endpoint=/api/v3/ping"
        );
    }

    #[tokio::test]
    async fn relay_forwards_through_endpoint_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RELAY_PATH))
            .and(query_param("endpoint", "/api/v3/ticker/24hr"))
            .and(query_param("symbol", "ETHUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let relay = RelayStrategy::new(Client::new(), server.uri());
        let body = relay
            .fetch("/api/v3/ticker/24hr?symbol=ETHUSDT", &options())
            .await
            .unwrap();
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn alternates_fall_through_to_next_host() {
        let bad = MockServer::start().await;
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&bad)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&good)
            .await;

        let strategy = AlternateHostsStrategy::new(Client::new(), vec![bad.uri(), good.uri()]);
        assert_eq!(strategy.fetch("/api/v3/ping", &options()).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn alternates_report_last_failure() {
        let a = MockServer::start().await;
        let b = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&a)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&b)
            .await;

        let strategy = AlternateHostsStrategy::new(Client::new(), vec![a.uri(), b.uri()]);
        let err = strategy.fetch("/x", &options()).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("All alternative endpoints failed"));
    }

    #[tokio::test]
    async fn alternates_stop_on_rate_limit() {
        let a = MockServer::start().await;
        let b = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&a)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&b)
            .await;

        let strategy = AlternateHostsStrategy::new(Client::new(), vec![a.uri(), b.uri()]);
        let err = strategy.fetch("/x", &options()).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
    }
}
