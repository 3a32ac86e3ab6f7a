//! countgate.toml configuration parser.
//!
//! Every section and field is optional; missing values fall back to
//! [`GatewayConfig::default`]. The daemon layers the `COUNTAPI_REDIS_URL`
//! environment variable and CLI flags on top of whatever the file provides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store_url::{DEFAULT_STORE_URL, StoreUrl};

/// Environment variable that overrides `store.url`.
pub const STORE_URL_ENV: &str = "COUNTAPI_REDIS_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub connect_timeout: String,
    pub response_timeout: String,
    /// Reconnect attempts made by the store client itself.
    pub retries: usize,
    /// Upper bound on a single liveness probe.
    pub health_timeout: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            connect_timeout: "3s".to_string(),
            response_timeout: "3s".to_string(),
            retries: 1,
            health_timeout: "2s".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn parsed_url(&self) -> anyhow::Result<StoreUrl> {
        Ok(StoreUrl::parse(&self.url)?)
    }

    pub fn connect_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("store.connect_timeout", &self.connect_timeout)
    }

    pub fn response_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("store.response_timeout", &self.response_timeout)
    }

    pub fn health_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("store.health_timeout", &self.health_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub burst: Option<u32>,
}

impl RateLimitConfig {
    /// Burst defaults to the per-second rate.
    pub fn burst(&self) -> u32 {
        self.burst.unwrap_or(self.per_second)
    }
}

impl GatewayConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply an environment override for the store URL, if present.
    pub fn with_store_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.store.url = url;
        }
        self
    }

    /// Check fields that can only be interpreted after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.store.parsed_url()?;
        self.store.connect_timeout()?;
        self.store.response_timeout()?;
        self.store.health_timeout()?;
        if let Some(rl) = &self.rate_limit {
            anyhow::ensure!(rl.per_second > 0, "rate_limit.per_second must be positive");
            anyhow::ensure!(rl.burst() > 0, "rate_limit.burst must be positive");
        }
        Ok(())
    }
}

fn duration_field(name: &str, raw: &str) -> anyhow::Result<Duration> {
    parse_duration(raw).ok_or_else(|| anyhow::anyhow!("{name}: invalid duration {raw:?}"))
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
