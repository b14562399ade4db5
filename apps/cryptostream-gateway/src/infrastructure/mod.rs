//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surface.

/// Exchange REST adapter.
pub mod binance;

/// Market-data provider REST adapter with API key rotation.
pub mod coingecko;

/// Configuration from environment variables.
pub mod config;

/// Outbound HTTP: retries, fetch strategies and the fallback router.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// HTTP server: relay, market endpoints, health.
pub mod server;

/// Exchange ticker stream: codec, transport, connection state machine.
pub mod stream;

/// OpenTelemetry tracing integration.
pub mod telemetry;
