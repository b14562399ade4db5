//! Symbol Normalization
//!
//! Maps between the three symbol conventions used by the gateway:
//!
//! - canonical display form: `"BTC/USD"`
//! - exchange ticker form: `"BTCUSDT"`
//! - provider coin-ID form: `"bitcoin"`
//!
//! Lookup is table-driven over the fixed set of tracked [`Asset`]s. Input that
//! matches no tracked asset resolves to [`DEFAULT_ASSET`] (Bitcoin) instead of
//! failing. Callers that need strict validation use [`Asset::resolve`], which
//! returns `None` for unknown input.

use serde::{Deserialize, Serialize};

/// Quote currency suffix on exchange tickers.
pub const QUOTE_SUFFIX: &str = "USDT";

/// Asset used when input matches no tracked asset.
pub const DEFAULT_ASSET: Asset = Asset::Bitcoin;

// =============================================================================
// Asset Table
// =============================================================================

/// A tracked crypto asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    /// Bitcoin (BTC).
    Bitcoin,
    /// Ethereum (ETH).
    Ethereum,
    /// Solana (SOL).
    Solana,
    /// XRP (XRP).
    Xrp,
    /// BNB (BNB).
    Bnb,
    /// Cardano (ADA).
    Cardano,
    /// Chainlink (LINK).
    Chainlink,
    /// Dogecoin (DOGE).
    Dogecoin,
    /// Tron (TRX).
    Tron,
}

impl Asset {
    /// Every tracked asset, in display order.
    pub const ALL: [Self; 9] = [
        Self::Bitcoin,
        Self::Ethereum,
        Self::Solana,
        Self::Xrp,
        Self::Bnb,
        Self::Cardano,
        Self::Chainlink,
        Self::Dogecoin,
        Self::Tron,
    ];

    /// Base ticker, e.g. `BTC`.
    #[must_use]
    pub const fn base(self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
            Self::Ethereum => "ETH",
            Self::Solana => "SOL",
            Self::Xrp => "XRP",
            Self::Bnb => "BNB",
            Self::Cardano => "ADA",
            Self::Chainlink => "LINK",
            Self::Dogecoin => "DOGE",
            Self::Tron => "TRX",
        }
    }

    /// Provider coin ID, e.g. `bitcoin`.
    #[must_use]
    pub const fn coin_id(self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Ethereum => "ethereum",
            Self::Solana => "solana",
            Self::Xrp => "ripple",
            Self::Bnb => "binancecoin",
            Self::Cardano => "cardano",
            Self::Chainlink => "chainlink",
            Self::Dogecoin => "dogecoin",
            Self::Tron => "tron",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bitcoin => "Bitcoin",
            Self::Ethereum => "Ethereum",
            Self::Solana => "Solana",
            Self::Xrp => "XRP",
            Self::Bnb => "BNB",
            Self::Cardano => "Cardano",
            Self::Chainlink => "Chainlink",
            Self::Dogecoin => "Dogecoin",
            Self::Tron => "Tron",
        }
    }

    /// Canonical display symbol, e.g. `BTC/USD`.
    #[must_use]
    pub fn display(self) -> String {
        format!("{}/USD", self.base())
    }

    /// Exchange ticker, e.g. `BTCUSDT`.
    #[must_use]
    pub fn exchange_ticker(self) -> String {
        format!("{}{QUOTE_SUFFIX}", self.base())
    }

    /// Stream name on the exchange combined stream, e.g. `btcusdt@ticker`.
    #[must_use]
    pub fn ticker_stream(self) -> String {
        format!("{}@ticker", self.exchange_ticker().to_lowercase())
    }

    /// Resolve any supported spelling to an asset.
    ///
    /// Accepts the display form (`BTC/USD`), a bare ticker (`btc`), an
    /// exchange ticker (`BTCUSDT`) or a coin ID (`bitcoin`). Matching is
    /// case-insensitive and ignores surrounding whitespace.
    #[must_use]
    pub fn resolve(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();

        if let Some(asset) = Self::from_coin_id(&lower) {
            return Some(asset);
        }

        let upper = trimmed.to_uppercase();
        let base = upper
            .strip_suffix("/USDT")
            .or_else(|| upper.strip_suffix("/USD"))
            .or_else(|| upper.strip_suffix(QUOTE_SUFFIX))
            .unwrap_or(&upper);

        Self::ALL.into_iter().find(|asset| asset.base() == base)
    }

    /// Resolve input, falling back to [`DEFAULT_ASSET`] for unknown input.
    #[must_use]
    pub fn resolve_or_default(input: &str) -> Self {
        Self::resolve(input).unwrap_or_else(|| {
            tracing::debug!(input, default = DEFAULT_ASSET.base(), "Unknown symbol, using default asset");
            DEFAULT_ASSET
        })
    }

    fn from_coin_id(id: &str) -> Option<Self> {
        match id {
            "bitcoin" => Some(Self::Bitcoin),
            "ethereum" => Some(Self::Ethereum),
            "solana" => Some(Self::Solana),
            "ripple" | "xrp" => Some(Self::Xrp),
            "binancecoin" | "bnb" => Some(Self::Bnb),
            "cardano" => Some(Self::Cardano),
            "chainlink" => Some(Self::Chainlink),
            "dogecoin" => Some(Self::Dogecoin),
            "tron" => Some(Self::Tron),
            _ => None,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/USD", self.base())
    }
}

// =============================================================================
// Normalizer Functions
// =============================================================================

/// Provider coin ID for any supported spelling. Unknown input yields `bitcoin`.
#[must_use]
pub fn to_provider_id(input: &str) -> &'static str {
    Asset::resolve_or_default(input).coin_id()
}

/// Exchange ticker for any supported spelling. Unknown input yields `BTCUSDT`.
#[must_use]
pub fn to_exchange_ticker(input: &str) -> String {
    Asset::resolve_or_default(input).exchange_ticker()
}

/// Canonical display symbol for any supported spelling. Unknown input yields `BTC/USD`.
#[must_use]
pub fn to_display(input: &str) -> String {
    Asset::resolve_or_default(input).display()
}

/// Normalize an arbitrary ticker string to exchange form.
///
/// Uppercases, strips every `USDT` occurrence and any `/USD` suffix, then
/// appends a single `USDT`. Unlike [`to_exchange_ticker`] this does not
/// consult the asset table, so `"pepe"` becomes `"PEPEUSDT"`.
///
/// `normalize_ticker(normalize_ticker(x)) == normalize_ticker(x)` for all `x`.
#[must_use]
pub fn normalize_ticker(input: &str) -> String {
    let mut core = input.trim().to_uppercase();
    loop {
        let without_quote = core.replace(QUOTE_SUFFIX, "");
        let stripped = without_quote
            .strip_suffix("/USD")
            .unwrap_or(&without_quote)
            .trim()
            .to_string();
        if stripped == core {
            break;
        }
        core = stripped;
    }
    format!("{core}{QUOTE_SUFFIX}")
}

// =============================================================================
// Tests
// =============================================================================
