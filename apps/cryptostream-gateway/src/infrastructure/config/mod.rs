//! Configuration Module
//!
//! Configuration loading for the gateway.

mod settings;

pub use settings::{
    BinanceSettings, CoinGeckoSettings, ConfigError, GatewayConfig, ProviderKind, ProxyCredentials,
    ProxySettings, ServerSettings, StreamSettings,
};
