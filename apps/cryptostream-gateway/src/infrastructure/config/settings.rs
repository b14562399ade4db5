//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.
//! Parsing goes through [`GatewayConfig::from_lookup`] so any key/value
//! source can stand in for the process environment.

use std::time::Duration;

use crate::domain::keys::MAX_API_KEYS;

/// Default primary exchange host.
pub const DEFAULT_BINANCE_ENDPOINT: &str = "https://api.binance.com";

/// Default alternate exchange hosts, tried in order.
pub const DEFAULT_BINANCE_ALTERNATES: [&str; 3] = [
    "https://api1.binance.com",
    "https://api2.binance.com",
    "https://api3.binance.com",
];

/// Default exchange stream base.
pub const DEFAULT_BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443";

/// Default provider base URL.
pub const DEFAULT_COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3";

// =============================================================================
// Provider Selection
// =============================================================================

/// Which upstream serves the internal historical and market endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Market-data provider (keyed).
    #[default]
    CoinGecko,
    /// Exchange REST API (keyless).
    Binance,
}

impl ProviderKind {
    /// Parse a provider name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown name.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "coingecko" => Ok(Self::CoinGecko),
            "binance" => Ok(Self::Binance),
            other => Err(ConfigError::InvalidValue {
                key: "CRYPTO_API_PROVIDER".to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Provider name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CoinGecko => "coingecko",
            Self::Binance => "binance",
        }
    }
}

// =============================================================================
// Upstream Settings
// =============================================================================

/// Exchange REST and stream settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceSettings {
    /// Primary REST host.
    pub api_endpoint: String,
    /// Alternate REST hosts, tried in order.
    pub alternate_hosts: Vec<String>,
    /// Base URL of the relay serving `/api/binance-proxy`.
    pub relay_url: String,
    /// Stream base URL.
    pub stream_url: String,
}

/// Market-data provider settings.
#[derive(Clone, PartialEq, Eq)]
pub struct CoinGeckoSettings {
    /// API base URL.
    pub base_url: String,
    /// Configured API keys, in key-number order.
    pub api_keys: Vec<String>,
}

impl std::fmt::Debug for CoinGeckoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoSettings")
            .field("base_url", &self.base_url)
            .field("api_keys", &format_args!("[REDACTED; {}]", self.api_keys.len()))
            .finish()
    }
}

/// Proxy basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Outbound HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy URL.
    pub url: String,
    /// Optional basic auth.
    pub credentials: Option<ProxyCredentials>,
}

/// Live stream settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Whether the binary opens the ticker stream.
    pub enabled: bool,
    /// Linear reconnect base delay.
    pub reconnect_base_delay: Duration,
    /// Reconnect attempts before the stream turns terminal.
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_base_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 3000 }
    }
}

// =============================================================================
// Gateway Configuration
// =============================================================================

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Provider serving internal endpoints.
    pub provider: ProviderKind,
    /// Exchange settings.
    pub binance: BinanceSettings,
    /// Provider settings.
    pub coingecko: CoinGeckoSettings,
    /// Outbound proxy, if configured and enabled.
    pub proxy: Option<ProxySettings>,
    /// Per-request upstream timeout.
    pub upstream_timeout: Duration,
    /// Stream settings.
    pub stream: StreamSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown provider name or an unparseable proxy URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown provider name or an unparseable proxy URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = get("CRYPTO_API_PROVIDER")
            .map(|v| ProviderKind::parse(&v))
            .transpose()?
            .unwrap_or_default();

        let server = ServerSettings {
            http_port: parse_or(get("GATEWAY_HTTP_PORT"), ServerSettings::default().http_port),
        };

        let binance = BinanceSettings {
            api_endpoint: get("BINANCE_API_ENDPOINT")
                .map_or_else(|| DEFAULT_BINANCE_ENDPOINT.to_string(), |v| trim_slash(&v)),
            alternate_hosts: get("BINANCE_ALTERNATE_HOSTS").map_or_else(
                || DEFAULT_BINANCE_ALTERNATES.iter().map(ToString::to_string).collect(),
                |v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(trim_slash)
                        .collect()
                },
            ),
            relay_url: get("BINANCE_RELAY_URL").map_or_else(
                || format!("http://127.0.0.1:{}", server.http_port),
                |v| trim_slash(&v),
            ),
            stream_url: get("BINANCE_STREAM_URL")
                .map_or_else(|| DEFAULT_BINANCE_STREAM_URL.to_string(), |v| trim_slash(&v)),
        };

        let coingecko = CoinGeckoSettings {
            base_url: get("COINGECKO_API_BASE")
                .map_or_else(|| DEFAULT_COINGECKO_BASE.to_string(), |v| trim_slash(&v)),
            api_keys: (1..=MAX_API_KEYS)
                .filter_map(|n| get(&format!("COINGECKO_API_KEY_{n}")))
                .collect(),
        };

        let proxy = parse_proxy(&get)?;

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            enabled: parse_bool(get("STREAM_ENABLED"), stream_defaults.enabled),
            reconnect_base_delay: get("STREAM_RECONNECT_DELAY_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(stream_defaults.reconnect_base_delay, Duration::from_millis),
            max_reconnect_attempts: parse_or(
                get("STREAM_MAX_RECONNECT_ATTEMPTS"),
                stream_defaults.max_reconnect_attempts,
            ),
        };

        let upstream_timeout = get("UPSTREAM_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(Duration::from_secs(10), Duration::from_millis);

        Ok(Self {
            provider,
            binance,
            coingecko,
            proxy,
            upstream_timeout,
            stream,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable has a value that cannot be used.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_proxy(get: &impl Fn(&str) -> Option<String>) -> Result<Option<ProxySettings>, ConfigError> {
    let url = get("HTTPS_PROXY")
        .or_else(|| get("HTTP_PROXY"))
        .or_else(|| get("BINANCE_PROXY"));

    let Some(url) = url else {
        if parse_bool(get("USE_PROXY"), false) {
            tracing::warn!("USE_PROXY is set but no proxy URL is configured");
        }
        return Ok(None);
    };

    if !parse_bool(get("USE_PROXY"), true) {
        return Ok(None);
    }

    if reqwest::Url::parse(&url).is_err() {
        return Err(ConfigError::InvalidValue {
            key: "HTTPS_PROXY".to_string(),
            value: url,
        });
    }

    let credentials = match (get("PROXY_USER"), get("PROXY_PASS")) {
        (Some(username), Some(password)) => Some(ProxyCredentials { username, password }),
        _ => None,
    };

    Ok(Some(ProxySettings { url, credentials }))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        Some("true" | "1" | "yes") => true,
        Some("false" | "0" | "no") => false,
        _ => default,
    }
}

fn trim_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.provider, ProviderKind::CoinGecko);
        assert_eq!(config.binance.api_endpoint, DEFAULT_BINANCE_ENDPOINT);
        assert_eq!(config.binance.alternate_hosts.len(), 3);
        assert_eq!(config.binance.relay_url, "http://127.0.0.1:3000");
        assert_eq!(config.coingecko.base_url, DEFAULT_COINGECKO_BASE);
        assert!(config.coingecko.api_keys.is_empty());
        assert!(config.proxy.is_none());
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert_eq!(config.stream, StreamSettings::default());
    }

    #[test]
    fn keys_are_read_in_order_and_blanks_skipped() {
        let config = config(&[
            ("COINGECKO_API_KEY_1", "one"),
            ("COINGECKO_API_KEY_2", "  "),
            ("COINGECKO_API_KEY_3", "three"),
            ("COINGECKO_API_KEY_7", "seven"),
            ("COINGECKO_API_KEY_8", "ignored"),
        ])
        .unwrap();
        assert_eq!(config.coingecko.api_keys, vec!["one", "three", "seven"]);
    }

    #[test]
    fn provider_selection() {
        assert_eq!(config(&[("CRYPTO_API_PROVIDER", "Binance")]).unwrap().provider, ProviderKind::Binance);
        assert!(matches!(
            config(&[("CRYPTO_API_PROVIDER", "kraken")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn endpoint_override_and_relay_follow_port() {
        let config = config(&[
            ("BINANCE_API_ENDPOINT", "https://data-api.binance.vision/"),
            ("GATEWAY_HTTP_PORT", "8080"),
            ("BINANCE_ALTERNATE_HOSTS", "https://a.example, https://b.example/"),
        ])
        .unwrap();
        assert_eq!(config.binance.api_endpoint, "https://data-api.binance.vision");
        assert_eq!(config.binance.relay_url, "http://127.0.0.1:8080");
        assert_eq!(config.binance.alternate_hosts, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn proxy_precedence_and_credentials() {
        let config = config(&[
            ("HTTP_PROXY", "http://second:8080"),
            ("HTTPS_PROXY", "http://first:8080"),
            ("PROXY_USER", "user"),
            ("PROXY_PASS", "secret"),
        ])
        .unwrap();
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.url, "http://first:8080");
        assert_eq!(proxy.credentials.as_ref().unwrap().username, "user");
        assert!(!format!("{proxy:?}").contains("secret"));
    }

    #[test]
    fn proxy_can_be_disabled_explicitly() {
        let config = config(&[("BINANCE_PROXY", "http://p:1"), ("USE_PROXY", "false")]).unwrap();
        assert!(config.proxy.is_none());
    }

    #[test]
    fn invalid_proxy_url_is_an_error() {
        assert!(config(&[("HTTPS_PROXY", "not a url")]).is_err());
    }

    #[test]
    fn stream_settings_parse() {
        let config = config(&[
            ("STREAM_ENABLED", "false"),
            ("STREAM_RECONNECT_DELAY_MS", "100"),
            ("STREAM_MAX_RECONNECT_ATTEMPTS", "oops"),
        ])
        .unwrap();
        assert!(!config.stream.enabled);
        assert_eq!(config.stream.reconnect_base_delay, Duration::from_millis(100));
        assert_eq!(config.stream.max_reconnect_attempts, 5);
    }

    #[test]
    fn debug_redacts_api_keys() {
        let config = config(&[("COINGECKO_API_KEY_1", "super-secret")]).unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
