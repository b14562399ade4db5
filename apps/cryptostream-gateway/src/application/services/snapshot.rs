//! Market snapshot use case.

use std::sync::Arc;

use crate::application::ports::MarketDataProvider;
use crate::domain::market::AssetSnapshot;
use crate::domain::symbol::Asset;
use crate::error::MarketDataError;

/// Fetches 24h snapshots for the tracked asset list.
#[derive(Clone)]
pub struct MarketSnapshotService {
    provider: Arc<dyn MarketDataProvider>,
    assets: Vec<Asset>,
}

impl MarketSnapshotService {
    /// Create a service tracking every supported asset.
    #[must_use]
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::with_assets(provider, Asset::ALL.to_vec())
    }

    /// Create a service tracking a custom asset list.
    #[must_use]
    pub const fn with_assets(provider: Arc<dyn MarketDataProvider>, assets: Vec<Asset>) -> Self {
        Self { provider, assets }
    }

    /// Tracked assets, in output order.
    #[must_use]
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// Fetch one snapshot per tracked asset.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any asset fails; partial results are never returned.
    #[tracing::instrument(skip(self), fields(provider = self.provider.name(), assets = self.assets.len()))]
    pub async fn snapshot(&self) -> Result<Vec<AssetSnapshot>, MarketDataError> {
        let snapshots = self.provider.fetch_snapshot(&self.assets).await?;

        if snapshots.len() != self.assets.len() {
            return Err(MarketDataError::malformed(format!(
                "expected {} snapshots, got {}",
                self.assets.len(),
                snapshots.len()
            )));
        }
        Ok(snapshots)
    }
}

impl std::fmt::Debug for MarketSnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketSnapshotService")
            .field("provider", &self.provider.name())
            .field("assets", &self.assets)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::application::ports::MockMarketDataProvider;

    fn snapshot(asset: Asset) -> AssetSnapshot {
        AssetSnapshot::new(asset, 10.0, 1.0, None, None, 100.0, Utc::now())
    }

    #[tokio::test]
    async fn requests_every_tracked_asset() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_fetch_snapshot()
            .withf(|assets| assets == Asset::ALL)
            .times(1)
            .returning(|assets| Ok(assets.iter().copied().map(snapshot).collect()));

        let service = MarketSnapshotService::new(Arc::new(provider));
        let snapshots = service.snapshot().await.unwrap();

        assert_eq!(snapshots.len(), 9);
        assert_eq!(snapshots[0].symbol, "BTC/USD");
        assert_eq!(snapshots[8].symbol, "TRX/USD");
    }

    #[tokio::test]
    async fn short_result_is_malformed() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_fetch_snapshot()
            .returning(|_| Ok(vec![snapshot(Asset::Bitcoin)]));

        let service = MarketSnapshotService::new(Arc::new(provider));
        let err = service.snapshot().await.unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn provider_failure_fails_whole_snapshot() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_name().return_const("mock");
        provider.expect_fetch_snapshot().returning(|_| {
            Err(MarketDataError::UpstreamUnavailable {
                last_error: "DOGEUSDT timed out".to_string(),
                failures: vec![],
            })
        });

        let service = MarketSnapshotService::with_assets(Arc::new(provider), vec![Asset::Dogecoin]);
        let err = service.snapshot().await.unwrap_err();
        assert!(err.to_string().contains("DOGEUSDT"));
    }
}
