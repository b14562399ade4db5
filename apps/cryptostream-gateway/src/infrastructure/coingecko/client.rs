//! Keyed provider REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::wire::{parse_market_chart, parse_markets, parse_ohlc};
use crate::application::ports::MarketDataProvider;
use crate::domain::keys::{ApiKey, KeyRotationRegistry};
use crate::domain::market::{AssetSnapshot, Candle, CandleQuery, CandleWindow, days_covering};
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;
use crate::infrastructure::config::CoinGeckoSettings;
use crate::infrastructure::http::{
    FallbackRouter, FetchOptions, HostStrategy, HttpClients, RouterError,
};
use crate::infrastructure::metrics::{self, Upstream};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Retries for provider calls.
pub const DEFAULT_RETRY_COUNT: u32 = 2;

/// Provider REST client. Every call takes the next key from the rotation.
#[derive(Debug)]
pub struct CoinGeckoClient {
    router: FallbackRouter,
    keys: Arc<KeyRotationRegistry>,
    timeout: Duration,
    retry_count: u32,
}

impl CoinGeckoClient {
    /// Create a client over an existing router and key pool.
    ///
    /// The router should have auth short-circuit enabled so a rejected key
    /// is not retried against other strategies.
    #[must_use]
    pub fn new(router: FallbackRouter, keys: Arc<KeyRotationRegistry>, timeout: Duration) -> Self {
        Self {
            router,
            keys,
            timeout,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }

    /// Build the standard single-host router for `settings`.
    #[must_use]
    pub fn from_settings(
        clients: &HttpClients,
        settings: &CoinGeckoSettings,
        keys: Arc<KeyRotationRegistry>,
        timeout: Duration,
    ) -> Self {
        let name = if clients.proxied().is_some() { "proxy" } else { "direct" };
        let router = FallbackRouter::new(Upstream::CoinGecko)
            .with_auth_short_circuit()
            .with_strategy(HostStrategy::new(
                name,
                clients.preferred().clone(),
                settings.base_url.clone(),
            ));
        Self::new(router, keys, timeout)
    }

    /// Override the retry count.
    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Key pool.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyRotationRegistry> {
        &self.keys
    }

    async fn get(&self, path_and_query: &str) -> Result<String, MarketDataError> {
        let key = self.keys.next().ok_or(MarketDataError::KeyNotConfigured)?;

        let options = FetchOptions::new(self.retry_count, self.timeout)
            .with_sensitive_header(API_KEY_HEADER, key.value())
            .map_err(|_| self.quarantine(&key, 0))?;

        match self.router.fetch(path_and_query, &options).await {
            Ok(response) => Ok(response.body),
            Err(RouterError::Unauthorized { status, .. }) => Err(self.quarantine(&key, status)),
            Err(e) => Err(e.into()),
        }
    }

    fn quarantine(&self, key: &ApiKey, status: u16) -> MarketDataError {
        if self.keys.mark_failed(key.index()) {
            metrics::record_key_quarantined();
        }
        MarketDataError::KeyInvalid {
            key_index: key.index(),
            status,
        }
    }
}

/// Day count, inclusive time bounds and candle cap used to serve `query`.
fn provider_window(query: &CandleQuery, now_ms: i64) -> (u32, Option<(i64, i64)>, Option<usize>) {
    match query.window {
        CandleWindow::Days(days) => (days, None, None),
        CandleWindow::Range {
            interval,
            limit,
            start_time,
            end_time,
        } => {
            let span = interval.duration_ms().saturating_mul(i64::from(limit));
            // An end-only range reaches back `span` from its end, not from now.
            let earliest = start_time.or_else(|| end_time.map(|end| end.saturating_sub(span)));
            let days = earliest.map_or_else(
                || days_covering(span),
                |earliest| days_covering(now_ms.saturating_sub(earliest)),
            );
            let bounds = match (start_time, end_time) {
                (None, None) => None,
                (start, end) => Some((start.unwrap_or(i64::MIN), end.unwrap_or(i64::MAX))),
            };
            (days, bounds, usize::try_from(limit).ok())
        }
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoClient {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    #[tracing::instrument(skip(self), fields(asset = %query.asset))]
    async fn fetch_candles(&self, query: CandleQuery) -> Result<Vec<Candle>, MarketDataError> {
        let coin = query.asset.coin_id();
        let (days, bounds, limit) = provider_window(&query, Utc::now().timestamp_millis());

        let mut candles = if days <= 1 {
            let body = self
                .get(&format!("/coins/{coin}/ohlc?vs_currency=usd&days=1"))
                .await?;
            parse_ohlc(&body)?
        } else {
            let body = self
                .get(&format!(
                    "/coins/{coin}/market_chart?vs_currency=usd&days={days}&interval=daily"
                ))
                .await?;
            parse_market_chart(&body)?
        };

        if let Some((start, end)) = bounds {
            candles.retain(|c| (start..=end).contains(&c.timestamp));
        }
        if let Some(limit) = limit
            && candles.len() > limit
        {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    #[tracing::instrument(skip(self), fields(assets = assets.len()))]
    async fn fetch_snapshot(&self, assets: &[Asset]) -> Result<Vec<AssetSnapshot>, MarketDataError> {
        let ids: Vec<&str> = assets.iter().map(|a| a.coin_id()).collect();
        let body = self
            .get(&format!(
                "/coins/markets?vs_currency=usd&ids={}&order=market_cap_desc&per_page=10&page=1&sparkline=false&price_change_percentage=24h",
                ids.join(",")
            ))
            .await?;
        let mut rows = parse_markets(&body)?;

        assets
            .iter()
            .map(|&asset| {
                let position = rows
                    .iter()
                    .position(|row| row.id == asset.coin_id())
                    .ok_or_else(|| {
                        MarketDataError::malformed(format!("no market data for {}", asset.coin_id()))
                    })?;
                rows.swap_remove(position).into_snapshot(asset)
            })
            .collect()
    }
}
