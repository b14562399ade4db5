//! Prometheus Metrics Module
//!
//! Exposes gateway metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Upstream**: REST requests per upstream/strategy and their outcomes
//! - **Keys**: provider API key quarantines
//! - **Stream**: frames by outcome, reconnects, connection gauge, callback failures
//! - **HTTP**: request latency per route
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the gateway HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "cryptostream_upstream_requests_total",
        "Upstream REST requests by upstream, strategy and outcome"
    );
    describe_counter!(
        "cryptostream_strategy_failures_total",
        "Fallback strategies that failed and were skipped"
    );
    describe_counter!(
        "cryptostream_api_keys_quarantined_total",
        "Provider API keys quarantined after an auth failure"
    );

    describe_counter!(
        "cryptostream_stream_frames_total",
        "Inbound stream frames by outcome"
    );
    describe_counter!(
        "cryptostream_stream_reconnects_total",
        "Scheduled stream reconnection attempts"
    );
    describe_gauge!(
        "cryptostream_stream_connected",
        "1 while the ticker stream is open"
    );
    describe_counter!(
        "cryptostream_subscriber_callback_failures_total",
        "Subscriber callbacks that returned an error or panicked"
    );

    describe_histogram!(
        "cryptostream_http_request_duration_seconds",
        "HTTP request latency by route"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Upstream label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// Exchange REST API.
    Binance,
    /// Market-data provider REST API.
    CoinGecko,
}

impl Upstream {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::CoinGecko => "coingecko",
        }
    }
}

/// Outcome label for an upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// 2xx with a body.
    Success,
    /// Failed, next strategy tried.
    Failed,
    /// 429.
    RateLimited,
    /// Request rejected (400, 401, 403).
    Rejected,
}

impl RequestOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
            Self::Rejected => "rejected",
        }
    }
}

/// Outcome label for a stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Decoded and dispatched.
    Dispatched,
    /// Could not be decoded.
    Malformed,
    /// Symbol did not map to a tracked asset.
    Unmapped,
}

impl FrameOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Malformed => "malformed",
            Self::Unmapped => "unmapped",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one upstream request outcome.
pub fn record_upstream_request(upstream: Upstream, strategy: &str, outcome: RequestOutcome) {
    counter!(
        "cryptostream_upstream_requests_total",
        "upstream" => upstream.as_str(),
        "strategy" => strategy.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a strategy that failed and was skipped.
pub fn record_strategy_failure(upstream: Upstream, strategy: &str) {
    counter!(
        "cryptostream_strategy_failures_total",
        "upstream" => upstream.as_str(),
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Record a key quarantine.
pub fn record_key_quarantined() {
    counter!("cryptostream_api_keys_quarantined_total").increment(1);
}

/// Record one inbound stream frame.
pub fn record_stream_frame(outcome: FrameOutcome) {
    counter!(
        "cryptostream_stream_frames_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("cryptostream_stream_reconnects_total").increment(1);
}

/// Set the connection gauge.
pub fn set_stream_connected(connected: bool) {
    gauge!("cryptostream_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record failed subscriber callbacks.
pub fn record_callback_failures(count: usize) {
    if count > 0 {
        counter!("cryptostream_subscriber_callback_failures_total").increment(count as u64);
    }
}

/// Record HTTP request latency.
pub fn record_http_duration(route: &str, duration: Duration) {
    histogram!(
        "cryptostream_http_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_as_str() {
        assert_eq!(Upstream::Binance.as_str(), "binance");
        assert_eq!(Upstream::CoinGecko.as_str(), "coingecko");
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(RequestOutcome::RateLimited.as_str(), "rate_limited");
        assert_eq!(FrameOutcome::Unmapped.as_str(), "unmapped");
        assert_eq!(FrameOutcome::Malformed.as_str(), "malformed");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_stream_frame(FrameOutcome::Dispatched);
        record_callback_failures(0);
        set_stream_connected(true);
    }
}
