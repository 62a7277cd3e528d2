use episode_analyzer::core::resolver::ResolverOptions;
use episode_analyzer::core::store::{AnyStore, FetchPolicy, HttpStore, LocalStore, DEFAULT_HUB_URL};
use episode_analyzer::core::sample::DEFAULT_SAMPLE_CAP;
use episode_analyzer::AnalyticsOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub name: String,
    pub version: String,
    pub connection: Connection,
    pub store: StoreConfig,
    pub supported_versions: Vec<String>,
    pub sample_cap: usize,
    /// Concurrent file fetches while loading a sample.
    pub concurrency: usize,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub analytics: AnalyticsOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Hub { url: String },
    Local { root: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub attempts: u32,
    pub timeout_secs: u64,
    pub backoff_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let resolver = ResolverOptions::default();
        Self {
            name: "episode-analyzer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connection: Connection::default(),
            store: StoreConfig::default(),
            supported_versions: resolver.supported_versions,
            sample_cap: DEFAULT_SAMPLE_CAP,
            concurrency: 8,
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            analytics: AnalyticsOptions::default(),
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 8410,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Hub {
            url: DEFAULT_HUB_URL.to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            max_entries: 256,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        let policy = FetchPolicy::default();
        Self {
            attempts: policy.attempts,
            timeout_secs: policy.timeout.as_secs(),
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl AnalyzerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.connection.ip, self.connection.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            supported_versions: self.supported_versions.clone(),
            fetch: FetchPolicy {
                attempts: self.fetch.attempts,
                timeout: Duration::from_secs(self.fetch.timeout_secs),
                backoff: Duration::from_millis(self.fetch.backoff_ms),
            },
        }
    }

    pub fn build_store(&self) -> AnyStore {
        match &self.store {
            StoreConfig::Hub { url } => AnyStore::Http(HttpStore::new(url.clone())),
            StoreConfig::Local { root } => AnyStore::Local(LocalStore::new(root)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AnalyzerConfig = serde_json::from_str(
            r#"{
                "connection": { "port": 9000 },
                "store": { "kind": "local", "root": "/data/lerobot" },
                "analytics": { "time_bins": 20 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.sample_cap, DEFAULT_SAMPLE_CAP);
        assert_eq!(config.analytics.time_bins, 20);
        assert_eq!(config.analytics.k_max, 5);
        assert!(matches!(config.build_store(), AnyStore::Local(_)));
        assert_eq!(config.resolver_options().fetch.attempts, 3);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: AnalyzerConfig = serde_json::from_str("{}").unwrap();
        assert!(matches!(config.store, StoreConfig::Hub { .. }));
        assert_eq!(config.supported_versions, vec!["v2.0", "v2.1", "v3.0"]);
    }
}
