//! Live market board.
//!
//! One [`AssetSnapshot`] per tracked asset, mutated in place by stream
//! updates. This is the state a dashboard renders from.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::market::{AssetSnapshot, PriceUpdate};
use crate::domain::subscription::{UpdateCallback, callback};
use crate::domain::symbol::Asset;

#[derive(Debug, Clone)]
struct BoardEntry {
    snapshot: AssetSnapshot,
    live: bool,
}

/// Serializable view of the board.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    /// Snapshots in tracked order.
    pub assets: Vec<AssetSnapshot>,
    /// Largest 24h gainer among assets with live data.
    pub top_gainer: Option<AssetSnapshot>,
}

/// In-memory board of the latest snapshot per asset.
#[derive(Debug)]
pub struct LiveMarketBoard {
    entries: RwLock<BTreeMap<Asset, BoardEntry>>,
}

impl LiveMarketBoard {
    /// Board for `assets`, every price starting at zero.
    #[must_use]
    pub fn new(assets: &[Asset]) -> Arc<Self> {
        let now = Utc::now();
        let entries = assets
            .iter()
            .map(|&asset| {
                (
                    asset,
                    BoardEntry {
                        snapshot: AssetSnapshot::empty(asset, now),
                        live: false,
                    },
                )
            })
            .collect();
        Arc::new(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Apply a live update. Updates for untracked assets are ignored.
    pub fn apply(&self, update: &PriceUpdate) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&update.asset) {
            entry.snapshot.apply(update);
            entry.live = true;
        }
    }

    /// Fill entries that have not yet seen a live update from a REST snapshot.
    pub fn seed(&self, snapshots: &[AssetSnapshot]) {
        let mut entries = self.entries.write();
        for snapshot in snapshots {
            let Some(asset) = Asset::resolve(&snapshot.symbol) else {
                continue;
            };
            if let Some(entry) = entries.get_mut(&asset)
                && !entry.live
            {
                entry.snapshot = snapshot.clone();
            }
        }
    }

    /// Current snapshots in tracked order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<AssetSnapshot> {
        self.entries
            .read()
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect()
    }

    /// Asset with the highest 24h change among those with live data.
    #[must_use]
    pub fn top_gainer(&self) -> Option<AssetSnapshot> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.live)
            .max_by(|a, b| a.snapshot.change_24h.total_cmp(&b.snapshot.change_24h))
            .map(|entry| entry.snapshot.clone())
    }

    /// Snapshots and top gainer together.
    #[must_use]
    pub fn view(&self) -> BoardView {
        BoardView {
            assets: self.snapshots(),
            top_gainer: self.top_gainer(),
        }
    }

    /// Callback that feeds this board, for registering with the stream.
    #[must_use]
    pub fn as_callback(self: &Arc<Self>) -> UpdateCallback {
        let board = Arc::clone(self);
        callback(move |update| {
            board.apply(update);
            Ok(())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn update(asset: Asset, price: f64, change: f64) -> PriceUpdate {
        PriceUpdate {
            asset,
            symbol: asset.display(),
            price,
            price_change: 0.0,
            change_24h: change,
            high_24h: price,
            low_24h: price,
            volume_24h: 0.0,
            event_time: Utc::now(),
        }
    }

    #[test]
    fn starts_with_zeroed_assets() {
        let board = LiveMarketBoard::new(&Asset::ALL);
        let snapshots = board.snapshots();
        assert_eq!(snapshots.len(), 9);
        assert!(snapshots.iter().all(|s| s.price == 0.0));
        assert!(board.top_gainer().is_none());
    }

    #[test]
    fn updates_track_previous_price() {
        let board = LiveMarketBoard::new(&[Asset::Bitcoin]);
        board.apply(&update(Asset::Bitcoin, 100.0, 1.0));
        board.apply(&update(Asset::Bitcoin, 101.0, 1.5));

        let btc = &board.snapshots()[0];
        assert_eq!(btc.price, 101.0);
        assert_eq!(btc.previous_price, Some(100.0));
    }

    #[test]
    fn top_gainer_considers_live_assets_only() {
        let board = LiveMarketBoard::new(&[Asset::Bitcoin, Asset::Ethereum, Asset::Solana]);
        board.seed(&[AssetSnapshot::new(Asset::Solana, 1.0, 50.0, None, None, 0.0, Utc::now())]);
        board.apply(&update(Asset::Bitcoin, 1.0, 2.0));
        board.apply(&update(Asset::Ethereum, 1.0, 5.0));

        assert_eq!(board.top_gainer().unwrap().symbol, "ETH/USD");
    }

    #[test]
    fn seed_does_not_overwrite_live_data() {
        let board = LiveMarketBoard::new(&[Asset::Bitcoin]);
        board.apply(&update(Asset::Bitcoin, 200.0, 1.0));
        board.seed(&[AssetSnapshot::new(Asset::Bitcoin, 150.0, 0.0, None, None, 0.0, Utc::now())]);
        assert_eq!(board.snapshots()[0].price, 200.0);
    }

    #[test]
    fn untracked_updates_are_ignored() {
        let board = LiveMarketBoard::new(&[Asset::Bitcoin]);
        board.apply(&update(Asset::Tron, 1.0, 1.0));
        assert_eq!(board.snapshots().len(), 1);
    }

    #[test]
    fn callback_applies_updates() {
        let board = LiveMarketBoard::new(&[Asset::Cardano]);
        let cb = board.as_callback();
        cb(&update(Asset::Cardano, 0.5, 3.0)).unwrap();
        assert_eq!(board.snapshots()[0].price, 0.5);
    }
}
