//! Fallback router.
//!
//! Runs an ordered list of [`FetchStrategy`]s strictly one after another and
//! returns the first success. Only throttling, caller errors and (when
//! enabled) auth failures stop the walk early; everything else is logged and
//! the next strategy is tried.

use thiserror::Error;

use super::client::{FetchError, FetchOptions, HttpClients};
use super::strategy::{AlternateHostsStrategy, FetchStrategy, HostStrategy, RelayStrategy};
use crate::error::{MarketDataError, StrategyFailure};
use crate::infrastructure::config::BinanceSettings;
use crate::infrastructure::metrics::{self, RequestOutcome, Upstream};

/// Successful routed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedResponse {
    /// Response body.
    pub body: String,
    /// Strategy that produced the body.
    pub strategy: String,
    /// Strategies that failed first, in order.
    pub failures: Vec<StrategyFailure>,
}

/// Why the router stopped without a body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// Upstream answered 429.
    #[error("{upstream} rate limited the request")]
    RateLimited {
        /// Upstream name.
        upstream: &'static str,
        /// `Retry-After` in seconds, if sent.
        retry_after_secs: Option<u64>,
    },

    /// Upstream answered 400.
    #[error("{upstream} rejected the request: {message}")]
    Rejected {
        /// Upstream name.
        upstream: &'static str,
        /// Upstream message.
        message: String,
    },

    /// Upstream answered 401 or 403 and auth short-circuit is enabled.
    #[error("{upstream} rejected credentials (HTTP {status})")]
    Unauthorized {
        /// Upstream name.
        upstream: &'static str,
        /// 401 or 403.
        status: u16,
    },

    /// Every strategy failed.
    #[error("all strategies failed: {last_error}")]
    Exhausted {
        /// Message of the last failure.
        last_error: String,
        /// Each failure, in order.
        failures: Vec<StrategyFailure>,
    },
}

impl From<RouterError> for MarketDataError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::RateLimited {
                upstream,
                retry_after_secs,
            } => Self::RateLimited {
                upstream: upstream.to_string(),
                retry_after_secs,
            },
            RouterError::Rejected { message, .. } => Self::BadRequest(message),
            // Keyed clients intercept this before converting.
            unauthorized @ RouterError::Unauthorized { .. } => Self::UpstreamUnavailable {
                last_error: unauthorized.to_string(),
                failures: Vec::new(),
            },
            RouterError::Exhausted {
                last_error,
                failures,
            } => Self::UpstreamUnavailable {
                last_error,
                failures,
            },
        }
    }
}

/// Ordered strategy list for one upstream.
pub struct FallbackRouter {
    upstream: Upstream,
    strategies: Vec<Box<dyn FetchStrategy>>,
    auth_short_circuit: bool,
}

impl FallbackRouter {
    /// Empty router for `upstream`.
    #[must_use]
    pub fn new(upstream: Upstream) -> Self {
        Self {
            upstream,
            strategies: Vec::new(),
            auth_short_circuit: false,
        }
    }

    /// Append a strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl FetchStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Stop on 401/403 instead of falling through.
    #[must_use]
    pub const fn with_auth_short_circuit(mut self) -> Self {
        self.auth_short_circuit = true;
        self
    }

    /// Exchange router: `[proxy] -> direct -> relay -> alternates`.
    #[must_use]
    pub fn binance(clients: &HttpClients, settings: &BinanceSettings) -> Self {
        let mut router = Self::new(Upstream::Binance);
        if let Some(proxied) = clients.proxied() {
            router = router.with_strategy(HostStrategy::new(
                "proxy",
                proxied.clone(),
                settings.api_endpoint.clone(),
            ));
        }
        router = router
            .with_strategy(HostStrategy::new(
                "direct",
                clients.direct().clone(),
                settings.api_endpoint.clone(),
            ))
            .with_strategy(RelayStrategy::new(
                clients.direct().clone(),
                settings.relay_url.clone(),
            ));
        if !settings.alternate_hosts.is_empty() {
            router = router.with_strategy(AlternateHostsStrategy::new(
                clients.direct().clone(),
                settings.alternate_hosts.clone(),
            ));
        }
        router
    }

    /// Strategy names in execution order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Fetch `path_and_query`, walking strategies in order.
    ///
    /// # Errors
    ///
    /// See [`RouterError`].
    pub async fn fetch(
        &self,
        path_and_query: &str,
        options: &FetchOptions,
    ) -> Result<RoutedResponse, RouterError> {
        let upstream = self.upstream.as_str();
        let mut failures: Vec<StrategyFailure> = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            let error = match strategy.fetch(path_and_query, options).await {
                Ok(body) => {
                    metrics::record_upstream_request(self.upstream, name, RequestOutcome::Success);
                    if !failures.is_empty() {
                        tracing::info!(
                            upstream,
                            strategy = name,
                            failed = failures.len(),
                            "Fallback strategy succeeded"
                        );
                    }
                    return Ok(RoutedResponse {
                        body,
                        strategy: name.to_string(),
                        failures,
                    });
                }
                Err(e) => e,
            };

            if let Some(stop) = self.stop_condition(&error) {
                let outcome = if matches!(stop, RouterError::RateLimited { .. }) {
                    RequestOutcome::RateLimited
                } else {
                    RequestOutcome::Rejected
                };
                metrics::record_upstream_request(self.upstream, name, outcome);
                tracing::warn!(upstream, strategy = name, error = %error, "Upstream refused request");
                return Err(stop);
            }

            metrics::record_upstream_request(self.upstream, name, RequestOutcome::Failed);
            metrics::record_strategy_failure(self.upstream, name);
            tracing::warn!(upstream, strategy = name, error = %error, "Strategy failed, trying next");
            failures.push(StrategyFailure {
                strategy: name.to_string(),
                message: error.to_string(),
            });
        }

        let last_error = failures
            .last()
            .map_or_else(|| "no strategies configured".to_string(), |f| f.message.clone());
        tracing::error!(upstream, failed = failures.len(), last_error = %last_error, "All strategies exhausted");
        Err(RouterError::Exhausted {
            last_error,
            failures,
        })
    }

    fn stop_condition(&self, error: &FetchError) -> Option<RouterError> {
        let upstream = self.upstream.as_str();
        match error.status()? {
            429 => Some(RouterError::RateLimited {
                upstream,
                retry_after_secs: retry_after(error),
            }),
            400 => Some(RouterError::Rejected {
                upstream,
                message: error.upstream_message(),
            }),
            status @ (401 | 403) if self.auth_short_circuit => {
                Some(RouterError::Unauthorized { upstream, status })
            }
            _ => None,
        }
    }
}

fn retry_after(error: &FetchError) -> Option<u64> {
    match error {
        FetchError::Status {
            retry_after_secs, ..
        } => *retry_after_secs,
        FetchError::AllHostsFailed(inner) => retry_after(inner),
        _ => None,
    }
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("upstream", &self.upstream)
            .field("strategies", &self.strategy_names())
            .field("auth_short_circuit", &self.auth_short_circuit)
            .finish()
    }
}
