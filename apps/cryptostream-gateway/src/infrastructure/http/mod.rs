//! Outbound HTTP
//!
//! Retry policy, outbound clients, fetch strategies and the fallback router
//! shared by the exchange and provider clients.

mod client;
mod retry;
mod router;
mod strategy;

pub use client::{FetchError, FetchOptions, HttpClients, fetch_text, upstream_message};
pub use retry::{
    BASE_RETRY_DELAY, MAX_RETRY_DELAY, RetryBudget, StatusCategory, categorize_status, next_delay,
};
pub use router::{FallbackRouter, RoutedResponse, RouterError};
pub use strategy::{
    AlternateHostsStrategy, FetchStrategy, HostStrategy, RELAY_PATH, RelayStrategy,
};
