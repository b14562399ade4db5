//! Retry policy for upstream REST calls.
//!
//! Delays double from a one second base and are capped at five seconds. The
//! delay for a given attempt is a pure function so it can be tested without
//! timers.

use std::time::Duration;

/// Delay before the first retry.
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on any single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Delay before retry number `attempt` (zero-based).
///
/// `min(1000 * 2^attempt, 5000)` milliseconds.
#[must_use]
pub fn next_delay(attempt: u32) -> Duration {
    let base = u64::try_from(BASE_RETRY_DELAY.as_millis()).unwrap_or(u64::MAX);
    let max = u64::try_from(MAX_RETRY_DELAY.as_millis()).unwrap_or(u64::MAX);
    let millis = 2_u64
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max));
    Duration::from_millis(millis)
}

/// How a non-success status should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// 429.
    RateLimited,
    /// Worth retrying against the same host.
    Retryable,
    /// Retrying the same request cannot help.
    NonRetryable,
}

/// Categorize an HTTP status for retry handling.
#[must_use]
pub const fn categorize_status(status: u16) -> StatusCategory {
    match status {
        429 => StatusCategory::RateLimited,
        408 | 500..=599 => StatusCategory::Retryable,
        _ => StatusCategory::NonRetryable,
    }
}

/// Bounded retry counter over [`next_delay`].
#[derive(Debug, Clone)]
pub struct RetryBudget {
    attempt: u32,
    max_retries: u32,
}

impl RetryBudget {
    /// Budget allowing `max_retries` retries after the first try.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
        }
    }

    /// Retries used so far.
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry, or `None` once the budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let delay = next_delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, 1000)]
    #[test_case(1, 2000)]
    #[test_case(2, 4000)]
    #[test_case(3, 5000)]
    #[test_case(10, 5000)]
    #[test_case(200, 5000)]
    fn delay_doubles_and_caps(attempt: u32, expected_ms: u64) {
        assert_eq!(next_delay(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn categorize() {
        assert_eq!(categorize_status(429), StatusCategory::RateLimited);
        assert_eq!(categorize_status(408), StatusCategory::Retryable);
        assert_eq!(categorize_status(502), StatusCategory::Retryable);
        assert_eq!(categorize_status(400), StatusCategory::NonRetryable);
        assert_eq!(categorize_status(401), StatusCategory::NonRetryable);
        assert_eq!(categorize_status(404), StatusCategory::NonRetryable);
    }

    #[test]
    fn budget_is_bounded() {
        let mut budget = RetryBudget::new(2);
        assert_eq!(budget.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(budget.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(budget.next_backoff(), None);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn zero_budget_never_retries() {
        assert_eq!(RetryBudget::new(0).next_backoff(), None);
    }
}
