//! Subscriber Registry
//!
//! Tracks which callbacks want updates for which canonical symbol.
//!
//! # Design
//!
//! - Callbacks are registered under a [`SubscriptionKey`]: one symbol, or the
//!   wildcard that receives every update.
//! - `subscribe` returns a [`Subscription`] capability. Releasing it removes
//!   exactly that registration; other registrations of the same callback are
//!   untouched.
//! - A symbol entry is removed as soon as its last callback is released.
//! - Dispatch snapshots the matching callbacks and releases the lock before
//!   invoking them, so a callback may subscribe or unsubscribe re-entrantly.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::domain::market::PriceUpdate;

// =============================================================================
// Types
// =============================================================================

/// Callback invoked for each dispatched update.
pub type UpdateCallback = Arc<dyn Fn(&PriceUpdate) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as an [`UpdateCallback`].
pub fn callback<F>(f: F) -> UpdateCallback
where
    F: Fn(&PriceUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Unique identifier for one registration.
pub type SubscriptionId = u64;

/// Key a callback is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// A canonical symbol, e.g. `BTC/USD`.
    Symbol(String),
    /// Every symbol.
    All,
}

impl SubscriptionKey {
    /// Wildcard marker accepted by [`SubscriptionKey::parse`].
    pub const WILDCARD: &'static str = "*";

    /// Parse `*` as the wildcard and anything else as a symbol.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw == Self::WILDCARD {
            Self::All
        } else {
            Self::Symbol(raw.to_string())
        }
    }
}

/// Outcome of dispatching one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that returned `Ok`.
    pub delivered: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
struct RegistryState {
    entries: HashMap<SubscriptionKey, Vec<(SubscriptionId, UpdateCallback)>>,
}

/// Registry of update callbacks keyed by symbol.
#[derive(Default)]
pub struct SubscriberRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` under `key`.
    #[must_use = "dropping the handle leaks the registration until the registry is cleared"]
    pub fn subscribe(self: &Arc<Self>, key: SubscriptionKey, callback: UpdateCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state
            .write()
            .entries
            .entry(key.clone())
            .or_default()
            .push((id, callback));

        tracing::debug!(?key, id, "Subscriber registered");

        Subscription {
            id,
            key,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove one registration. Returns `true` if it existed.
    fn remove(&self, key: &SubscriptionKey, id: SubscriptionId) -> bool {
        let mut state = self.state.write();
        let Some(callbacks) = state.entries.get_mut(key) else {
            return false;
        };

        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        let removed = callbacks.len() != before;

        if callbacks.is_empty() {
            state.entries.remove(key);
        }
        removed
    }

    /// Deliver `update` to every callback for its symbol and to every wildcard callback.
    ///
    /// Errors and panics are caught per callback; one failing callback never
    /// prevents delivery to the rest.
    pub fn dispatch(&self, update: &PriceUpdate) -> DispatchReport {
        let callbacks: Vec<(SubscriptionId, UpdateCallback)> = {
            let state = self.state.read();
            let symbol_key = SubscriptionKey::Symbol(update.symbol.clone());
            [symbol_key, SubscriptionKey::All]
                .iter()
                .filter_map(|key| state.entries.get(key))
                .flatten()
                .cloned()
                .collect()
        };

        let mut report = DispatchReport::default();
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(update))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(id, symbol = %update.symbol, error = %e, "Subscriber callback failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(id, symbol = %update.symbol, "Subscriber callback panicked");
                }
            }
        }
        report
    }

    /// Number of callbacks registered under `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        self.state.read().entries.get(key).map_or(0, Vec::len)
    }

    /// Keys that currently have at least one callback.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Total registrations across all keys.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.state.read().entries.values().map(Vec::len).sum()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.state.write().entries.clear();
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("keys", &self.keys())
            .field("total", &self.total_subscriptions())
            .finish()
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Capability for releasing one registration.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    key: SubscriptionKey,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    /// Registration ID.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Key this registration was made under.
    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Remove this registration. Returns `true` if it was still registered.
    pub fn unsubscribe(self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.key, self.id));
        if removed {
            tracing::debug!(key = ?self.key, id = self.id, "Subscriber released");
        }
        removed
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use chrono::Utc;

    use super::*;
    use crate::domain::symbol::Asset;

    fn update(asset: Asset) -> PriceUpdate {
        PriceUpdate {
            asset,
            symbol: asset.display(),
            price: 1.0,
            price_change: 0.0,
            change_24h: 0.0,
            high_24h: 1.0,
            low_24h: 1.0,
            volume_24h: 0.0,
            event_time: Utc::now(),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, UpdateCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        let cb = callback(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (hits, cb)
    }

    fn btc() -> SubscriptionKey {
        SubscriptionKey::Symbol("BTC/USD".to_string())
    }

    #[test]
    fn parse_wildcard() {
        assert_eq!(SubscriptionKey::parse("*"), SubscriptionKey::All);
        assert_eq!(SubscriptionKey::parse("BTC/USD"), btc());
    }

    #[test]
    fn dispatch_reaches_symbol_and_wildcard_subscribers() {
        let registry = SubscriberRegistry::new();
        let (btc_hits, btc_cb) = counter();
        let (eth_hits, eth_cb) = counter();
        let (all_hits, all_cb) = counter();

        let _a = registry.subscribe(btc(), btc_cb);
        let _b = registry.subscribe(SubscriptionKey::Symbol("ETH/USD".to_string()), eth_cb);
        let _c = registry.subscribe(SubscriptionKey::All, all_cb);

        let report = registry.dispatch(&update(Asset::Bitcoin));

        assert_eq!(report.delivered, 2);
        assert_eq!(btc_hits.load(Ordering::SeqCst), 1);
        assert_eq!(eth_hits.load(Ordering::SeqCst), 0);
        assert_eq!(all_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_block_others() {
        let registry = SubscriberRegistry::new();
        let _bad = registry.subscribe(btc(), callback(|_| panic!("subscriber bug")));
        let _err = registry.subscribe(btc(), callback(|_| anyhow::bail!("subscriber error")));
        let (hits, good) = counter();
        let _good = registry.subscribe(btc(), good);

        let report = registry.dispatch(&update(Asset::Bitcoin));

        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_registration() {
        let registry = SubscriberRegistry::new();
        let (hits, cb) = counter();

        let first = registry.subscribe(btc(), Arc::clone(&cb));
        let _second = registry.subscribe(SubscriptionKey::All, cb);

        assert!(first.unsubscribe());
        registry.dispatch(&update(Asset::Bitcoin));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscriber_count(&SubscriptionKey::All), 1);
    }

    #[test]
    fn last_unsubscribe_removes_symbol_entry() {
        let registry = SubscriberRegistry::new();
        let (_, cb) = counter();
        let sub = registry.subscribe(btc(), cb);

        assert_eq!(registry.keys(), vec![btc()]);
        assert!(sub.unsubscribe());
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn unsubscribe_after_clear_is_harmless() {
        let registry = SubscriberRegistry::new();
        let (_, cb) = counter();
        let sub = registry.subscribe(btc(), cb);

        registry.clear();
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn callback_can_unsubscribe_during_dispatch() {
        let registry = SubscriberRegistry::new();
        let slot: Arc<parking_lot::Mutex<Option<Subscription>>> = Arc::default();
        let inner = Arc::clone(&slot);

        let sub = registry.subscribe(
            btc(),
            callback(move |_| {
                if let Some(sub) = inner.lock().take() {
                    sub.unsubscribe();
                }
                Ok(())
            }),
        );
        *slot.lock() = Some(sub);

        let report = registry.dispatch(&update(Asset::Bitcoin));
        assert_eq!(report.delivered, 1);
        assert_eq!(registry.total_subscriptions(), 0);
    }

    #[test]
    fn concurrent_subscribe_and_release() {
        let registry = SubscriberRegistry::new();
        let mut handles = vec![];

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let (_, cb) = counter();
                    let sub = registry.subscribe(SubscriptionKey::Symbol("ETH/USD".to_string()), cb);
                    assert!(sub.unsubscribe());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.total_subscriptions(), 0);
        assert!(registry.keys().is_empty());
    }
}
