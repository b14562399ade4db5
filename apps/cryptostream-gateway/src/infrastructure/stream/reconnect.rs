//! Reconnection Policy
//!
//! Linear backoff for the ticker stream: attempt `n` waits `n * base_delay`.
//! After `max_attempts` consecutive failures the stream gives up.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay unit; attempt `n` waits `n` units.
    pub base_delay: Duration,
    /// Attempts before the stream turns terminal.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before attempt number `attempt` (one-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Reconnection attempt counter over a [`ReconnectConfig`].
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;
        Some(self.config.delay_for_attempt(self.attempt_count))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts scheduled since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.attempt_count < self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sequence_is_linear_then_stops() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let delays: Vec<u128> = std::iter::from_fn(|| policy.next_delay())
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![3000, 6000, 9000, 12000, 15000]);
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 5);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn zero_attempts_never_retries() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_secs(1), 0));
        assert!(!policy.should_retry());
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn delay_is_pure() {
        let config = ReconnectConfig::new(Duration::from_millis(250), 10);
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(4), config.delay_for_attempt(4));
    }
}
