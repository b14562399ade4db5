//! Exchange REST client.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;

use super::wire::{Ticker24h, parse_klines};
use crate::application::ports::MarketDataProvider;
use crate::domain::market::{
    AssetSnapshot, Candle, CandleQuery, CandleWindow, Interval, MAX_DERIVED_LIMIT,
};
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;
use crate::infrastructure::http::{FallbackRouter, FetchOptions};

/// Retries per strategy for exchange calls.
pub const DEFAULT_RETRY_COUNT: u32 = 2;

/// Exchange REST client behind the fallback router.
#[derive(Debug)]
pub struct BinanceClient {
    router: FallbackRouter,
    options: FetchOptions,
}

impl BinanceClient {
    /// Create a client routing through `router` with a per-request `timeout`.
    #[must_use]
    pub fn new(router: FallbackRouter, timeout: Duration) -> Self {
        Self {
            router,
            options: FetchOptions::new(DEFAULT_RETRY_COUNT, timeout),
        }
    }

    /// Override the per-strategy retry count.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.options = self.options.with_limits(retry_count, self.options.timeout);
        self
    }

    async fn get(&self, path_and_query: &str) -> Result<String, MarketDataError> {
        let response = self.router.fetch(path_and_query, &self.options).await?;
        tracing::debug!(
            path = path_and_query,
            strategy = %response.strategy,
            failed = response.failures.len(),
            "Exchange request served"
        );
        Ok(response.body)
    }

    async fn ticker(&self, asset: Asset) -> Result<AssetSnapshot, MarketDataError> {
        let ticker = asset.exchange_ticker();
        let body = self.get(&format!("/api/v3/ticker/24hr?symbol={ticker}")).await?;
        let parsed: Ticker24h = serde_json::from_str(&body)
            .map_err(|e| MarketDataError::malformed(format!("ticker {ticker}: {e}")))?;
        parsed.into_snapshot(asset)
    }
}

/// Klines path for a query.
///
/// Day-count queries become hourly candles for a single day and daily
/// candles otherwise.
#[must_use]
pub fn klines_path(query: &CandleQuery) -> String {
    let ticker = query.asset.exchange_ticker();
    match query.window {
        CandleWindow::Range {
            interval,
            limit,
            start_time,
            end_time,
        } => {
            let mut path = format!(
                "/api/v3/klines?symbol={ticker}&interval={}&limit={limit}",
                interval.as_str()
            );
            if let Some(start) = start_time {
                path.push_str(&format!("&startTime={start}"));
            }
            if let Some(end) = end_time {
                path.push_str(&format!("&endTime={end}"));
            }
            path
        }
        CandleWindow::Days(days) if days <= 1 => format!(
            "/api/v3/klines?symbol={ticker}&interval={}&limit=24",
            Interval::OneHour.as_str()
        ),
        CandleWindow::Days(days) => format!(
            "/api/v3/klines?symbol={ticker}&interval={}&limit={}",
            Interval::OneDay.as_str(),
            days.min(MAX_DERIVED_LIMIT)
        ),
    }
}

#[async_trait]
impl MarketDataProvider for BinanceClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    #[tracing::instrument(skip(self), fields(asset = %query.asset))]
    async fn fetch_candles(&self, query: CandleQuery) -> Result<Vec<Candle>, MarketDataError> {
        let body = self.get(&klines_path(&query)).await?;
        parse_klines(&body)
    }

    #[tracing::instrument(skip(self), fields(assets = assets.len()))]
    async fn fetch_snapshot(&self, assets: &[Asset]) -> Result<Vec<AssetSnapshot>, MarketDataError> {
        try_join_all(assets.iter().map(|&asset| self.ticker(asset))).await
    }
}
