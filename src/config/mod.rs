use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::proxy::ProxyPool;

/// How the collector should source outbound proxies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum ProxyConfig {
    /// No proxy; requests go out directly.
    #[default]
    None,
    /// A single proxy endpoint.
    Single(String),
    /// A list of endpoints, handed to a freshly built round-robin pool.
    List(Vec<String>),
}

impl ProxyConfig {
    /// Build a [`ProxyPool`] from this configuration, or `None` if no proxy
    /// was configured.
    pub fn into_pool(self) -> AppResult<Option<ProxyPool>> {
        match self {
            ProxyConfig::None => Ok(None),
            ProxyConfig::Single(endpoint) => Ok(Some(ProxyPool::new(vec![endpoint])?)),
            ProxyConfig::List(endpoints) => {
                if endpoints.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(ProxyPool::new(endpoints)?))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Proxy source for outbound requests.
    pub proxy: ProxyConfig,
    /// Seconds to wait between successive GraphQL requests.
    pub rate_limit_delay: f64,
    /// Upper bound (seconds) of the uniform jitter added to rate-limit waits.
    pub jitter: f64,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Attempt cap for a single GraphQL request (rate-limit/network retries).
    pub max_retries: u32,
    /// Consecutive session-refresh failures tolerated before the session is
    /// considered expired.
    pub max_refresh_attempts: u32,
    /// Page size requested per GraphQL call.
    pub page_size: u32,
    /// Optional path to a persistent (SQLite-backed) dedup store. `None`
    /// uses the in-memory tracker.
    pub dedup_store_path: Option<PathBuf>,
    /// Origin to bootstrap and issue GraphQL calls against. `None` uses
    /// [`crate::constants::BASE_URL`]; overriding it is mainly useful for
    /// pointing a session at a mock server in tests.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::None,
            rate_limit_delay: 2.0,
            jitter: 1.0,
            timeout: 30,
            max_retries: 3,
            max_refresh_attempts: 3,
            page_size: 30,
            dedup_store_path: None,
            base_url: None,
        }
    }
}

impl CollectorConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Load configuration from a TOML file, writing out the defaults the
    /// first time the file does not exist. `CONFIG_FILE` overrides the path.
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "collector.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)
                .map_err(|e| AppError::configuration(e.to_string()))?;
            toml::from_str(&contents).map_err(|e| AppError::configuration(e.to_string()))
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::configuration(e.to_string()))?;
            std::fs::write(&config_file, contents)
                .map_err(|e| AppError::configuration(e.to_string()))?;
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = CollectorConfig::default();
        assert_eq!(config.rate_limit_delay, 2.0);
        assert_eq!(config.jitter, 1.0);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_refresh_attempts, 3);
        assert!(matches!(config.proxy, ProxyConfig::None));
    }
}
