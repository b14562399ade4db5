//! Stream Connection
//!
//! One persistent session to the combined ticker stream, driven by a
//! spawned task.
//!
//! # State Machine
//!
//! ```text
//! Closed -> Connecting -> Open -> Closing -> Closed      (disconnect)
//! Open -> (drop) -> Closed -> Connecting -> ...          (auto-reconnect)
//! ```
//!
//! Involuntary drops and failed handshakes are retried with linear backoff.
//! When attempts run out the state turns terminal and stays there until
//! [`StreamConnection::reconnect`] is called.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::codec::{DecodedFrame, decode};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::StreamTransport;
use crate::domain::subscription::SubscriberRegistry;
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;
use crate::infrastructure::metrics::{self, FrameOutcome};

// =============================================================================
// State
// =============================================================================

/// Lifecycle phase of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// No session.
    #[default]
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Receiving frames.
    Open,
    /// Explicit teardown in progress.
    Closing,
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Current phase.
    pub phase: ConnectionPhase,
    /// A reconnect is scheduled.
    pub reconnecting: bool,
    /// Reconnect attempts since the last successful handshake.
    pub reconnect_attempts: u32,
    /// Reconnect attempts are exhausted.
    pub terminal: bool,
    /// Last drop or handshake failure.
    pub last_error: Option<String>,
}

impl ConnectionState {
    /// Whether the session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    /// The terminal error, if reconnect attempts are exhausted.
    #[must_use]
    pub fn terminal_error(&self) -> Option<MarketDataError> {
        if self.terminal {
            Some(MarketDataError::StreamTerminal {
                attempts: self.reconnect_attempts,
            })
        } else {
            None
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Stream base URL, e.g. `wss://stream.binance.com:9443`.
    pub base_url: String,
    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl StreamConfig {
    /// Combined-stream URL for `assets`.
    #[must_use]
    pub fn combined_url(&self, assets: &[Asset]) -> String {
        let streams: Vec<String> = assets.iter().map(|a| a.ticker_stream()).collect();
        format!(
            "{}/stream?streams={}",
            self.base_url.trim_end_matches('/'),
            streams.join("/")
        )
    }
}

/// Stream lifecycle errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StreamError {
    /// `connect` was called with no symbols.
    #[error("no symbols to subscribe")]
    NoSymbols,

    /// `reconnect` was called before any `connect`.
    #[error("stream was never connected")]
    NeverConnected,
}

// =============================================================================
// Connection
// =============================================================================

struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Shared pieces the driver task needs.
#[derive(Clone)]
struct Driver {
    transport: Arc<dyn StreamTransport>,
    subscribers: Arc<SubscriberRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    reconnect: ReconnectConfig,
}

/// One socket session with automatic reconnect.
pub struct StreamConnection {
    config: StreamConfig,
    driver: Driver,
    session: Mutex<Option<Session>>,
    symbols: Mutex<Vec<Asset>>,
}

impl StreamConnection {
    /// Create a closed connection dispatching into `subscribers`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        subscribers: Arc<SubscriberRegistry>,
        config: StreamConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            driver: Driver {
                transport,
                subscribers,
                state: Arc::new(state),
                reconnect: config.reconnect,
            },
            config,
            session: Mutex::new(None),
            symbols: Mutex::new(Vec::new()),
        }
    }

    /// Open a session for `assets`.
    ///
    /// A no-op while a session is live (open, connecting or waiting to
    /// reconnect).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NoSymbols`] for an empty asset list.
    pub fn connect(&self, assets: &[Asset]) -> Result<(), StreamError> {
        if assets.is_empty() {
            return Err(StreamError::NoSymbols);
        }

        let mut session = self.session.lock();
        if let Some(live) = session.as_ref()
            && !live.handle.is_finished()
        {
            tracing::info!(phase = ?self.state().phase, "Stream already connected, ignoring connect");
            return Ok(());
        }

        let url = self.config.combined_url(assets);
        *self.symbols.lock() = assets.to_vec();

        let cancel = CancellationToken::new();
        self.driver.state.send_replace(ConnectionState {
            phase: ConnectionPhase::Connecting,
            ..ConnectionState::default()
        });

        tracing::info!(url = %url, symbols = assets.len(), "Connecting ticker stream");
        let handle = tokio::spawn(self.driver.clone().run(url, cancel.clone()));
        *session = Some(Session { cancel, handle });
        Ok(())
    }

    /// Tear the session down, clear every subscription and reset the
    /// reconnect counter. Idempotent.
    pub fn disconnect(&self) {
        self.teardown();
        self.driver.subscribers.clear();
    }

    /// Restart the session with the last symbol list, keeping subscriptions.
    ///
    /// This is the recovery path out of a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NeverConnected`] if `connect` was never called.
    pub fn reconnect(&self) -> Result<(), StreamError> {
        let symbols = self.symbols.lock().clone();
        if symbols.is_empty() {
            return Err(StreamError::NeverConnected);
        }
        self.teardown();
        tracing::info!("Reconnecting ticker stream on request");
        self.connect(&symbols)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.driver.state.borrow().clone()
    }

    /// Receiver following every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.driver.state.subscribe()
    }

    /// Symbols of the current or last session.
    #[must_use]
    pub fn symbols(&self) -> Vec<Asset> {
        self.symbols.lock().clone()
    }

    fn teardown(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            self.driver.state.send_modify(|s| s.phase = ConnectionPhase::Closing);
            session.cancel.cancel();
            tracing::info!("Ticker stream disconnected");
        }
        self.driver.state.send_replace(ConnectionState::default());
        metrics::set_stream_connected(false);
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

// =============================================================================
// Driver Task
// =============================================================================

impl Driver {
    async fn run(self, url: String, cancel: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.reconnect);

        loop {
            self.publish(&cancel, |s| s.phase = ConnectionPhase::Connecting);

            let opened = tokio::select! {
                () = cancel.cancelled() => return,
                opened = self.transport.open(&url) => opened,
            };

            let reason = match opened {
                Ok(mut frames) => {
                    policy.reset();
                    self.publish(&cancel, |s| {
                        *s = ConnectionState {
                            phase: ConnectionPhase::Open,
                            ..ConnectionState::default()
                        };
                    });
                    metrics::set_stream_connected(true);
                    tracing::info!("Ticker stream open");

                    let reason = loop {
                        tokio::select! {
                            () = cancel.cancelled() => return,
                            frame = frames.next() => match frame {
                                Some(Ok(text)) => self.handle_frame(&text),
                                Some(Err(e)) => break e.to_string(),
                                None => break "stream closed by remote".to_string(),
                            }
                        }
                    };
                    metrics::set_stream_connected(false);
                    reason
                }
                Err(e) => e.to_string(),
            };

            let Some(delay) = policy.next_delay() else {
                let attempts = policy.attempt_count();
                tracing::error!(attempts, error = %reason, "Ticker stream reconnect attempts exhausted");
                self.publish(&cancel, |s| {
                    s.phase = ConnectionPhase::Closed;
                    s.reconnecting = false;
                    s.terminal = true;
                    s.last_error = Some(reason.clone());
                });
                return;
            };

            let attempt = policy.attempt_count();
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis(),
                error = %reason,
                "Ticker stream dropped, reconnecting"
            );
            metrics::record_reconnect();
            self.publish(&cancel, |s| {
                s.phase = ConnectionPhase::Closed;
                s.reconnecting = true;
                s.reconnect_attempts = attempt;
                s.last_error = Some(reason.clone());
            });

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Ticker stream cancelled during reconnect delay");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match decode(text) {
            Ok(DecodedFrame::Update(update)) => {
                let report = self.subscribers.dispatch(&update);
                metrics::record_stream_frame(FrameOutcome::Dispatched);
                metrics::record_callback_failures(report.failed);
            }
            Ok(DecodedFrame::Unmapped(symbol)) => {
                metrics::record_stream_frame(FrameOutcome::Unmapped);
                tracing::warn!(symbol = %symbol, "Dropping frame for unmapped symbol");
            }
            Err(e) => {
                metrics::record_stream_frame(FrameOutcome::Malformed);
                tracing::warn!(error = %e, "Dropping malformed frame");
            }
        }
    }

    /// Apply `f` unless the session has been cancelled. The check runs under
    /// the channel lock so a concurrent teardown always wins.
    fn publish(&self, cancel: &CancellationToken, f: impl FnOnce(&mut ConnectionState)) {
        self.state.send_if_modified(|state| {
            if cancel.is_cancelled() {
                return false;
            }
            f(state);
            true
        });
    }
}
