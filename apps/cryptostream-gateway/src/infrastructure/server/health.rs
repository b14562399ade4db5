//! Health and metrics endpoints.
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe
//! - `GET /readyz` - readiness probe (stream open, or streaming disabled)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::domain::keys::KeyPoolStats;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::stream::ConnectionState;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Provider serving the market endpoints.
    pub provider: &'static str,
    /// Live stream status, absent when streaming is disabled.
    pub stream: Option<StreamStatus>,
    /// Provider key pool, absent for keyless providers.
    pub api_keys: Option<KeyPoolStats>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Stream reconnecting or keys partly quarantined.
    Degraded,
    /// Stream terminal or every key quarantined.
    Unhealthy,
}

/// Live stream status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Registered subscriber callbacks.
    pub subscriptions: usize,
}

pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let is_ready = state
        .stream
        .as_ref()
        .is_none_or(|stream| stream.connection_state().is_open());

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let stream = state.stream.as_ref().map(|registry| StreamStatus {
        state: registry.connection_state(),
        subscriptions: registry.total_subscriptions(),
    });
    let api_keys = state.keys.as_ref().map(|keys| keys.stats());

    HealthResponse {
        status: determine_health_status(stream.as_ref(), api_keys.as_ref()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        provider: state.historical.provider_name(),
        stream,
        api_keys,
    }
}

fn determine_health_status(stream: Option<&StreamStatus>, keys: Option<&KeyPoolStats>) -> HealthStatus {
    let stream_terminal = stream.is_some_and(|s| s.state.terminal);
    let keys_exhausted = keys.is_some_and(|k| k.total == 0 || k.quarantined >= k.total);
    if stream_terminal || keys_exhausted {
        return HealthStatus::Unhealthy;
    }

    let stream_down = stream.is_some_and(|s| !s.state.is_open());
    let keys_degraded = keys.is_some_and(|k| k.quarantined > 0);
    if stream_down || keys_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::stream::ConnectionPhase;

    fn stream(phase: ConnectionPhase, terminal: bool) -> StreamStatus {
        StreamStatus {
            state: ConnectionState {
                phase,
                terminal,
                ..ConnectionState::default()
            },
            subscriptions: 1,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(serde_json::to_string(&HealthStatus::Degraded).unwrap(), "\"degraded\"");
    }

    #[test]
    fn open_stream_and_healthy_keys_is_healthy() {
        let keys = KeyPoolStats { total: 3, quarantined: 0 };
        assert_eq!(
            determine_health_status(Some(&stream(ConnectionPhase::Open, false)), Some(&keys)),
            HealthStatus::Healthy
        );
        assert_eq!(determine_health_status(None, None), HealthStatus::Healthy);
    }

    #[test]
    fn reconnecting_stream_is_degraded() {
        assert_eq!(
            determine_health_status(Some(&stream(ConnectionPhase::Connecting, false)), None),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn terminal_stream_or_no_keys_is_unhealthy() {
        assert_eq!(
            determine_health_status(Some(&stream(ConnectionPhase::Closed, true)), None),
            HealthStatus::Unhealthy
        );
        let keys = KeyPoolStats { total: 0, quarantined: 0 };
        assert_eq!(determine_health_status(None, Some(&keys)), HealthStatus::Unhealthy);
    }
}
