//! CryptoStream Gateway Binary
//!
//! Starts the market data gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin cryptostream-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CRYPTO_API_PROVIDER`: coingecko | binance (default: coingecko)
//! - `COINGECKO_API_KEY_1` .. `COINGECKO_API_KEY_7`: provider API keys
//! - `COINGECKO_API_BASE`: provider base URL
//! - `BINANCE_API_ENDPOINT`: primary exchange REST host
//! - `BINANCE_ALTERNATE_HOSTS`: comma-separated alternate hosts
//! - `BINANCE_RELAY_URL`: base URL of the relay (default: this server)
//! - `BINANCE_STREAM_URL`: ticker stream base URL
//! - `HTTPS_PROXY` / `HTTP_PROXY` / `BINANCE_PROXY`: outbound proxy
//! - `PROXY_USER` / `PROXY_PASS`: proxy basic auth
//! - `USE_PROXY`: set to false to ignore configured proxies
//! - `UPSTREAM_TIMEOUT_MS`: per-request upstream timeout (default: 10000)
//! - `STREAM_ENABLED`: open the ticker stream (default: true)
//! - `STREAM_RECONNECT_DELAY_MS`: linear reconnect unit (default: 3000)
//! - `STREAM_MAX_RECONNECT_ATTEMPTS`: attempts before giving up (default: 5)
//! - `GATEWAY_HTTP_PORT`: HTTP port (default: 3000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint
//! - `OTEL_SERVICE_NAME`: Service name (default: cryptostream-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use cryptostream_gateway::application::ports::MarketDataProvider;
use cryptostream_gateway::infrastructure::binance::BinanceClient;
use cryptostream_gateway::infrastructure::coingecko::CoinGeckoClient;
use cryptostream_gateway::infrastructure::http::{FallbackRouter, HttpClients};
use cryptostream_gateway::infrastructure::server::RelayUpstream;
use cryptostream_gateway::infrastructure::stream::{
    ReconnectConfig, StreamConfig, StreamRegistry, TungsteniteTransport,
};
use cryptostream_gateway::infrastructure::telemetry;
use cryptostream_gateway::{
    AppState, Asset, GatewayConfig, GatewayServer, HistoricalDataService, KeyRotationRegistry,
    LiveMarketBoard, MarketSnapshotService, ProviderKind, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[allow(clippy::expect_used)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting CryptoStream Gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let clients = HttpClients::new(config.proxy.as_ref())?;

    // Select the provider behind the internal endpoints
    let mut key_pool = None;
    let provider: Arc<dyn MarketDataProvider> = match config.provider {
        ProviderKind::Binance => {
            let router = FallbackRouter::binance(&clients, &config.binance);
            tracing::info!(strategies = ?router.strategy_names(), "Exchange fallback order");
            Arc::new(BinanceClient::new(router, config.upstream_timeout))
        }
        ProviderKind::CoinGecko => {
            let keys = Arc::new(KeyRotationRegistry::new(config.coingecko.api_keys.clone()));
            if keys.is_empty() {
                tracing::warn!("No COINGECKO_API_KEY_n configured; provider requests will fail");
            }
            key_pool = Some(Arc::clone(&keys));
            Arc::new(CoinGeckoClient::from_settings(
                &clients,
                &config.coingecko,
                keys,
                config.upstream_timeout,
            ))
        }
    };

    let historical = HistoricalDataService::new(Arc::clone(&provider));
    let snapshot = MarketSnapshotService::new(Arc::clone(&provider));
    let board = LiveMarketBoard::new(&Asset::ALL);
    let relay = RelayUpstream::new(clients.direct().clone(), config.binance.api_endpoint.clone());

    let mut state = AppState::new(historical, snapshot.clone(), Arc::clone(&board), relay);
    if let Some(keys) = key_pool {
        state = state.with_key_pool(keys);
    }

    // Live ticker stream feeding the board
    let mut board_subscription = None;
    let stream = if config.stream.enabled {
        let stream_config = StreamConfig {
            base_url: config.binance.stream_url.clone(),
            reconnect: ReconnectConfig::new(
                config.stream.reconnect_base_delay,
                config.stream.max_reconnect_attempts,
            ),
        };
        let registry = Arc::new(StreamRegistry::new(
            Arc::new(TungsteniteTransport),
            stream_config,
        ));
        board_subscription = Some(registry.subscribe("*", board.as_callback()));
        registry.connect(&Asset::ALL)?;
        state = state.with_stream(Arc::clone(&registry));
        Some(registry)
    } else {
        tracing::info!("Ticker stream disabled");
        None
    };

    // Seed the board from a REST snapshot until live updates arrive
    let seed_board = Arc::clone(&board);
    tokio::spawn(async move {
        match snapshot.snapshot().await {
            Ok(snapshots) => {
                seed_board.seed(&snapshots);
                tracing::info!(assets = snapshots.len(), "Live board seeded");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to seed live board"),
        }
    });

    // Spawn HTTP server
    let server = GatewayServer::new(
        config.server.http_port,
        Arc::new(state),
        shutdown_token.clone(),
    );
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Gateway server error");
        }
    });

    tracing::info!("Gateway ready");

    await_shutdown(shutdown_token).await;

    if let Some(subscription) = board_subscription {
        subscription.unsubscribe();
    }
    if let Some(registry) = stream {
        registry.disconnect();
    }

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle).await.is_err() {
        tracing::warn!("HTTP server did not drain before the shutdown timeout");
    }

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        provider = config.provider.as_str(),
        http_port = config.server.http_port,
        proxy = config.proxy.is_some(),
        stream_enabled = config.stream.enabled,
        api_keys = config.coingecko.api_keys.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        binance_endpoint = %config.binance.api_endpoint,
        relay_url = %config.binance.relay_url,
        stream_url = %config.binance.stream_url,
        coingecko_base = %config.coingecko.base_url,
        "Upstream endpoints"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
