use config::{Config, ConfigError, Environment, File};
use nostr_client::RelayConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::server::ResponseCache;
use crate::server::cache::DEFAULT_MAX_ENTRIES;

/// Default location of the optional settings file.
pub const DEFAULT_CONFIG_PATH: &str = "badges.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub relays: RelaySettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Relays configured at startup. May be empty; the list can be set later
    /// through the API.
    pub urls: Vec<String>,
    pub connect_timeout_secs: u64,
    pub ack_timeout_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            connect_timeout_secs: 10,
            ack_timeout_secs: 10,
        }
    }
}

impl RelaySettings {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of cached GET responses. Zero disables caching.
    pub ttl_secs: u64,
    /// Upper bound on cached responses; the oldest is evicted beyond it.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 40,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn response_cache(&self) -> ResponseCache {
        ResponseCache::new(self.ttl()).with_max_entries(self.max_entries)
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then `BADGES_*` environment
    /// variables (`__` separates nested keys, relay URLs are comma separated).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("BADGES")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("relays.urls")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        info!(
            "Loaded settings: {}:{}, {} relays, cache ttl {}s",
            settings.server.host,
            settings.server.port,
            settings.relays.urls.len(),
            settings.cache.ttl_secs
        );
        Ok(settings)
    }
}
