//! Stream Registry
//!
//! The process-wide entry point for live prices: one [`StreamConnection`]
//! plus the [`SubscriberRegistry`] it dispatches into. Created once at
//! startup and shared by reference.

use std::sync::Arc;

use tokio::sync::watch;

use super::connection::{ConnectionState, StreamConfig, StreamConnection, StreamError};
use crate::application::ports::StreamTransport;
use crate::domain::subscription::{SubscriberRegistry, Subscription, SubscriptionKey, UpdateCallback};
use crate::domain::symbol::Asset;

/// Shared live-price stream.
#[derive(Debug)]
pub struct StreamRegistry {
    subscribers: Arc<SubscriberRegistry>,
    connection: StreamConnection,
}

impl StreamRegistry {
    /// Create a registry with a closed connection.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>, config: StreamConfig) -> Self {
        let subscribers = SubscriberRegistry::new();
        let connection = StreamConnection::new(transport, Arc::clone(&subscribers), config);
        Self {
            subscribers,
            connection,
        }
    }

    /// Register `callback` for `symbol` (any supported spelling, or `*` for
    /// every symbol). Works before a connection exists and survives
    /// reconnects.
    #[must_use = "dropping the handle leaves the callback registered with no way to release it"]
    pub fn subscribe(&self, symbol: &str, callback: UpdateCallback) -> Subscription {
        self.subscribers.subscribe(subscription_key(symbol), callback)
    }

    /// Open the shared connection for `assets`. A no-op if one is live.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NoSymbols`] for an empty list.
    pub fn connect(&self, assets: &[Asset]) -> Result<(), StreamError> {
        self.connection.connect(assets)
    }

    /// Close the connection and drop every subscription. Idempotent.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Restart with the previous symbol list, keeping subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NeverConnected`] if `connect` was never called.
    pub fn reconnect(&self) -> Result<(), StreamError> {
        self.connection.reconnect()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Receiver following every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_changes()
    }

    /// Callbacks registered for `symbol` (or `*`).
    #[must_use]
    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.subscribers.subscriber_count(&subscription_key(symbol))
    }

    /// Callbacks registered across all keys.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.subscribers.total_subscriptions()
    }
}

/// Key for a caller-supplied symbol: the wildcard, the canonical display
/// form of a known asset, or the raw string.
fn subscription_key(symbol: &str) -> SubscriptionKey {
    match SubscriptionKey::parse(symbol.trim()) {
        SubscriptionKey::All => SubscriptionKey::All,
        SubscriptionKey::Symbol(raw) => {
            SubscriptionKey::Symbol(Asset::resolve(&raw).map_or(raw, Asset::display))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_canonicalized() {
        assert_eq!(subscription_key("btcusdt"), SubscriptionKey::Symbol("BTC/USD".to_string()));
        assert_eq!(subscription_key("ethereum"), SubscriptionKey::Symbol("ETH/USD".to_string()));
        assert_eq!(subscription_key("*"), SubscriptionKey::All);
        assert_eq!(subscription_key("PEPE"), SubscriptionKey::Symbol("PEPE".to_string()));
    }
}
