//! API Key Rotation
//!
//! Round-robin pool of provider API keys with quarantine.
//!
//! # Invariants
//!
//! - The rotation cursor is always in `[0, len)`.
//! - The cursor advances on every `next()` step, including steps that skip a
//!   quarantined key, so load spreads across the pool.
//! - When the quarantine set would cover the whole pool it is cleared, so a
//!   non-empty pool always yields a key.
//!
//! Cursor and quarantine live behind one mutex; a rotation step is a single
//! critical section.

use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Maximum number of keys read from configuration.
pub const MAX_API_KEYS: usize = 7;

/// A key handed out by the registry, tagged with its pool index.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    index: usize,
    value: String,
}

impl ApiKey {
    /// Zero-based index in the pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Raw key value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("index", &self.index)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Default)]
struct RotationState {
    cursor: usize,
    quarantined: BTreeSet<usize>,
}

/// Point-in-time view of the pool, for health output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct KeyPoolStats {
    /// Keys configured.
    pub total: usize,
    /// Keys currently quarantined.
    pub quarantined: usize,
}

/// Rotating, quarantining pool of provider API keys.
pub struct KeyRotationRegistry {
    keys: Vec<String>,
    state: Mutex<RotationState>,
}

impl KeyRotationRegistry {
    /// Create a registry. Blank keys are dropped.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys,
            state: Mutex::new(RotationState::default()),
        }
    }

    /// Number of keys in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the pool has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Hand out the next usable key, or `None` when the pool is empty.
    pub fn next(&self) -> Option<ApiKey> {
        let len = self.keys.len();
        if len == 0 {
            return None;
        }

        let mut state = self.state.lock();
        if state.quarantined.len() >= len {
            tracing::info!(keys = len, "All API keys quarantined, resetting quarantine");
            state.quarantined.clear();
        }

        for _ in 0..len {
            let index = state.cursor;
            state.cursor = (state.cursor + 1) % len;
            if !state.quarantined.contains(&index) {
                return Some(ApiKey {
                    index,
                    value: self.keys[index].clone(),
                });
            }
        }

        // Unreachable while the quarantine is smaller than the pool.
        None
    }

    /// Quarantine the key at `index` until the next pool-wide reset.
    ///
    /// Returns `true` if the key was not already quarantined.
    pub fn mark_failed(&self, index: usize) -> bool {
        if index >= self.keys.len() {
            return false;
        }
        let inserted = self.state.lock().quarantined.insert(index);
        if inserted {
            tracing::warn!(key = index + 1, "API key marked as failed");
        }
        inserted
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> KeyPoolStats {
        KeyPoolStats {
            total: self.keys.len(),
            quarantined: self.state.lock().quarantined.len(),
        }
    }
}

impl std::fmt::Debug for KeyRotationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationRegistry")
            .field("keys", &self.keys.len())
            .field("state", &*self.state.lock())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn pool(n: usize) -> KeyRotationRegistry {
        KeyRotationRegistry::new((1..=n).map(|i| format!("key-{i}")))
    }

    #[test]
    fn empty_pool_returns_none() {
        let registry = KeyRotationRegistry::new(Vec::new());
        assert!(registry.is_empty());
        assert!(registry.next().is_none());
    }

    #[test]
    fn blank_keys_are_dropped() {
        let registry = KeyRotationRegistry::new(vec![" ".to_string(), "a".to_string(), String::new()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.next().unwrap().value(), "a");
    }

    #[test]
    fn rotation_is_round_robin() {
        let registry = pool(4);
        let handed: Vec<String> = (0..4).map(|_| registry.next().unwrap().value().to_string()).collect();
        assert_eq!(handed, vec!["key-1", "key-2", "key-3", "key-4"]);
        assert_eq!(registry.next().unwrap().value(), "key-1");
    }

    #[test]
    fn quarantined_keys_are_skipped() {
        let registry = pool(3);
        assert!(registry.mark_failed(1));
        assert!(!registry.mark_failed(1));
        let indexes: Vec<usize> = (0..4).map(|_| registry.next().unwrap().index()).collect();
        assert_eq!(indexes, vec![0, 2, 0, 2]);
    }

    #[test]
    fn full_quarantine_resets_and_returns_key() {
        let registry = pool(3);
        for i in 0..3 {
            registry.mark_failed(i);
        }
        assert_eq!(registry.stats().quarantined, 3);

        let key = registry.next();
        assert!(key.is_some());
        assert_eq!(registry.stats().quarantined, 0);
    }

    #[test]
    fn mark_failed_out_of_range_is_ignored() {
        let registry = pool(2);
        assert!(!registry.mark_failed(9));
        assert_eq!(registry.stats().quarantined, 0);
    }

    #[test]
    fn debug_redacts_key_values() {
        let registry = pool(1);
        let key = registry.next().unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("key-1"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn concurrent_rotation_hands_out_each_key_evenly() {
        let registry = Arc::new(pool(4));
        let mut handles = vec![];

        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| registry.next().unwrap().index()).collect::<Vec<_>>()
            }));
        }

        let mut counts = [0usize; 4];
        for handle in handles {
            for index in handle.join().unwrap() {
                counts[index] += 1;
            }
        }
        assert_eq!(counts, [100, 100, 100, 100]);
    }
}
