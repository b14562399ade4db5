//! HTTP Server
//!
//! axum server for the relay, the internal market endpoints, and health and
//! metrics.
//!
//! # Endpoints
//!
//! - `GET /api/binance-proxy` - exchange relay
//! - `GET /api/crypto/historical` - candles from the configured provider
//! - `GET /api/crypto/market` - 24h snapshots for the tracked assets
//! - `GET /api/crypto/live` - live board and stream state
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics`

mod crypto;
mod error;
mod health;
mod relay;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub use crypto::LiveResponse;
pub use error::ApiError;
pub use health::{HealthResponse, HealthStatus, StreamStatus};
pub use relay::RelayUpstream;

use crate::application::services::{HistoricalDataService, LiveMarketBoard, MarketSnapshotService};
use crate::domain::keys::KeyRotationRegistry;
use crate::infrastructure::http::RELAY_PATH;
use crate::infrastructure::metrics;
use crate::infrastructure::stream::StreamRegistry;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for every handler.
pub struct AppState {
    historical: HistoricalDataService,
    snapshot: MarketSnapshotService,
    board: Arc<LiveMarketBoard>,
    relay: RelayUpstream,
    stream: Option<Arc<StreamRegistry>>,
    keys: Option<Arc<KeyRotationRegistry>>,
    version: String,
    started_at: Instant,
}

impl AppState {
    /// Create state without a stream or key pool.
    #[must_use]
    pub fn new(
        historical: HistoricalDataService,
        snapshot: MarketSnapshotService,
        board: Arc<LiveMarketBoard>,
        relay: RelayUpstream,
    ) -> Self {
        Self {
            historical,
            snapshot,
            board,
            relay,
            stream: None,
            keys: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// Attach the live stream.
    #[must_use]
    pub fn with_stream(mut self, stream: Arc<StreamRegistry>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Attach the provider key pool for health output.
    #[must_use]
    pub fn with_key_pool(mut self, keys: Arc<KeyRotationRegistry>) -> Self {
        self.keys = Some(keys);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("provider", &self.historical.provider_name())
            .field("stream", &self.stream.is_some())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(RELAY_PATH, get(relay::relay_handler))
        .route("/api/crypto/historical", get(crypto::historical_handler))
        .route("/api/crypto/market", get(crypto::market_handler))
        .route("/api/crypto/live", get(crypto::live_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .route_layer(middleware::from_fn(request_context))
        .with_state(state)
}

/// Run each request inside a span carrying a fresh request id, and record
/// its latency.
async fn request_context(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let span = tracing::info_span!(
        "http_request",
        %request_id,
        method = %request.method(),
        route = %route,
    );

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed = started.elapsed();

    metrics::record_http_duration(&route, elapsed);
    span.in_scope(|| {
        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

// =============================================================================
// Server
// =============================================================================

/// Gateway HTTP server.
pub struct GatewayServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Gateway HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Gateway HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
