//! Fallback Routing Integration Tests
//!
//! Drives the exchange router against mock hosts: strategy order, fallthrough,
//! exhaustion, rate limiting and snapshot fan-out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cryptostream_gateway::infrastructure::binance::BinanceClient;
use cryptostream_gateway::infrastructure::config::BinanceSettings;
use cryptostream_gateway::infrastructure::http::{
    FallbackRouter, FetchOptions, HttpClients, RouterError,
};
use cryptostream_gateway::{
    Asset, CandleQuery, CandleWindow, ErrorKind, Interval, MarketDataError, MarketDataProvider,
};

const KLINES: &str = r#"[
    [1700000000000, "100.0", "110.0", "95.0", "105.0", "12.5", 1700003599999],
    [1700003600000, "105.0", "112.0", "101.0", "111.0", "8.0", 1700007199999]
]"#;

struct Hosts {
    primary: MockServer,
    relay: MockServer,
    alternate_a: MockServer,
    alternate_b: MockServer,
}

impl Hosts {
    async fn start() -> Self {
        Self {
            primary: MockServer::start().await,
            relay: MockServer::start().await,
            alternate_a: MockServer::start().await,
            alternate_b: MockServer::start().await,
        }
    }

    fn settings(&self) -> BinanceSettings {
        BinanceSettings {
            api_endpoint: self.primary.uri(),
            alternate_hosts: vec![self.alternate_a.uri(), self.alternate_b.uri()],
            relay_url: self.relay.uri(),
            stream_url: "ws://127.0.0.1:1".to_string(),
        }
    }

    fn router(&self) -> FallbackRouter {
        let clients = HttpClients::new(None).unwrap();
        FallbackRouter::binance(&clients, &self.settings())
    }
}

fn options() -> FetchOptions {
    FetchOptions::new(0, Duration::from_secs(2))
}

async fn respond(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn strategies_run_direct_relay_alternates_without_proxy() {
    let hosts = Hosts::start().await;
    assert_eq!(hosts.router().strategy_names(), vec!["direct", "relay", "alternates"]);
}

#[tokio::test]
async fn direct_success_skips_remaining_strategies() {
    let hosts = Hosts::start().await;
    respond(&hosts.primary, "/api/v3/ping", ResponseTemplate::new(200).set_body_string("{}")).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&hosts.relay)
        .await;

    let response = hosts.router().fetch("/api/v3/ping", &options()).await.unwrap();

    assert_eq!(response.strategy, "direct");
    assert!(response.failures.is_empty());
}

#[tokio::test]
async fn primary_failure_falls_through_to_relay() {
    let hosts = Hosts::start().await;
    respond(&hosts.primary, "/api/v3/klines", ResponseTemplate::new(451)).await;
    Mock::given(method("GET"))
        .and(path("/api/binance-proxy"))
        .and(query_param("endpoint", "/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(KLINES))
        .mount(&hosts.relay)
        .await;

    let response = hosts
        .router()
        .fetch("/api/v3/klines?symbol=BTCUSDT&interval=1h&limit=2", &options())
        .await
        .unwrap();

    assert_eq!(response.strategy, "relay");
    assert_eq!(response.failures.len(), 1);
    assert_eq!(response.failures[0].strategy, "direct");
    assert!(response.failures[0].message.contains("451"));
}

#[tokio::test]
async fn second_alternate_host_serves_when_first_fails() {
    let hosts = Hosts::start().await;
    respond(&hosts.primary, "/api/v3/ping", ResponseTemplate::new(404)).await;
    respond(&hosts.relay, "/api/binance-proxy", ResponseTemplate::new(404)).await;
    respond(&hosts.alternate_a, "/api/v3/ping", ResponseTemplate::new(403)).await;
    respond(&hosts.alternate_b, "/api/v3/ping", ResponseTemplate::new(200).set_body_string("{}")).await;

    let response = hosts.router().fetch("/api/v3/ping", &options()).await.unwrap();

    assert_eq!(response.strategy, "alternates");
    let failed: Vec<&str> = response.failures.iter().map(|f| f.strategy.as_str()).collect();
    assert_eq!(failed, vec!["direct", "relay"]);
}

#[tokio::test]
async fn exhaustion_reports_every_strategy_and_last_error() {
    let hosts = Hosts::start().await;
    respond(&hosts.primary, "/api/v3/ping", ResponseTemplate::new(404)).await;
    respond(&hosts.relay, "/api/binance-proxy", ResponseTemplate::new(404)).await;
    respond(&hosts.alternate_a, "/api/v3/ping", ResponseTemplate::new(404)).await;
    respond(&hosts.alternate_b, "/api/v3/ping", ResponseTemplate::new(404)).await;

    let err = hosts.router().fetch("/api/v3/ping", &options()).await.unwrap_err();

    let RouterError::Exhausted {
        last_error,
        failures,
    } = err
    else {
        panic!("expected exhaustion");
    };
    assert_eq!(failures.len(), 3);
    assert!(last_error.contains("All alternative endpoints failed"));

    let mapped = MarketDataError::from(RouterError::Exhausted {
        last_error,
        failures,
    });
    assert_eq!(mapped.kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn rate_limit_stops_the_walk() {
    let hosts = Hosts::start().await;
    respond(
        &hosts.primary,
        "/api/v3/ping",
        ResponseTemplate::new(429).insert_header("Retry-After", "30"),
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&hosts.relay)
        .await;

    let err = hosts.router().fetch("/api/v3/ping", &options()).await.unwrap_err();

    assert!(matches!(
        err,
        RouterError::RateLimited {
            upstream: "binance",
            retry_after_secs: Some(30)
        }
    ));
}

#[tokio::test]
async fn bad_request_is_not_retried_elsewhere() {
    let hosts = Hosts::start().await;
    respond(
        &hosts.primary,
        "/api/v3/klines",
        ResponseTemplate::new(400).set_body_string(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&hosts.relay)
        .await;

    let err = hosts
        .router()
        .fetch("/api/v3/klines?symbol=NOPE", &options())
        .await
        .unwrap_err();

    let mapped = MarketDataError::from(err);
    assert_eq!(mapped.kind(), ErrorKind::BadRequest);
    assert!(mapped.to_string().contains("Invalid symbol."));
}

#[tokio::test]
async fn exchange_client_parses_candles_served_by_fallback() {
    let hosts = Hosts::start().await;
    respond(&hosts.primary, "/api/v3/klines", ResponseTemplate::new(502)).await;
    respond(&hosts.relay, "/api/binance-proxy", ResponseTemplate::new(502)).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "ETHUSDT"))
        .and(query_param("interval", "1h"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(KLINES))
        .mount(&hosts.alternate_a)
        .await;

    let client = BinanceClient::new(hosts.router(), Duration::from_secs(2)).with_retry_count(0);
    let candles = client
        .fetch_candles(CandleQuery {
            asset: Asset::Ethereum,
            window: CandleWindow::Range {
                interval: Interval::OneHour,
                limit: 2,
                start_time: None,
                end_time: None,
            },
        })
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].timestamp, 1_700_000_000_000);
    assert!((candles[1].close - 111.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn one_failing_ticker_fails_the_whole_snapshot() {
    let hosts = Hosts::start().await;
    for host in [&hosts.primary, &hosts.alternate_a, &hosts.alternate_b] {
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/24hr"))
            .and(query_param("symbol", "DOGEUSDT"))
            .respond_with(ResponseTemplate::new(404))
            .with_priority(1)
            .mount(host)
            .await;
    }
    respond(&hosts.relay, "/api/binance-proxy", ResponseTemplate::new(404)).await;
    respond(
        &hosts.primary,
        "/api/v3/ticker/24hr",
        ResponseTemplate::new(200).set_body_string(
            r#"{"symbol":"XUSDT","lastPrice":"10.0","priceChangePercent":"1.5","quoteVolume":"1000.0"}"#,
        ),
    )
    .await;

    let client = BinanceClient::new(hosts.router(), Duration::from_secs(2)).with_retry_count(0);
    let err = client.fetch_snapshot(&Asset::ALL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    let MarketDataError::UpstreamUnavailable { failures, .. } = err else {
        panic!("expected upstream exhaustion");
    };
    assert_eq!(failures.len(), 3);
}
