//! Configuration types
//!
//! Layering, lowest to highest precedence:
//! 1. `config/default.toml` (optional)
//! 2. the file named by `TWAP_CONFIG` (optional)
//! 3. `TWAP__*` environment variables, `__` separating nested keys
//!
//! The RPC endpoint falls back to `RPC_URL`, then `API_KEY`.

use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::time::Duration;

use crate::errors::{ConfigError, ConfigResult};
use crate::math::MAX_SCALE;
use crate::pools::PoolConfig;

/// WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upgrade path, e.g. "/ws"
    pub path: String,
    /// Accepted `Origin` headers; empty accepts any origin
    pub allowed_origins: Vec<String>,
    /// Deadline for a client to finish the WebSocket upgrade
    pub handshake_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            path: "/ws".to_string(),
            allowed_origins: vec![],
            handshake_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Publish loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub interval_secs: u64,
    /// Per-pool read deadline; half the interval when unset
    pub read_timeout_ms: Option<u64>,
    /// Share one snapshot per window across subscribers
    pub shared_cache: bool,
    /// Max age of a shared snapshot; the interval when unset
    pub cache_max_age_ms: Option<u64>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            read_timeout_ms: None,
            shared_cache: false,
            cache_max_age_ms: None,
        }
    }
}

impl PublisherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.interval() / 2)
    }

    pub fn cache_max_age(&self) -> Duration {
        self.cache_max_age_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.interval())
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl AppConfig {
    /// Load from files and environment, then validate
    pub fn load() -> ConfigResult<Self> {
        let vars: Map<String, String> = env::vars().collect();
        let config_file = env::var("TWAP_CONFIG").ok();
        Self::load_from(config_file.as_deref(), vars)
    }

    /// Same layering as [`AppConfig::load`] over an explicit set of variables
    pub fn load_from(config_file: Option<&str>, vars: Map<String, String>) -> ConfigResult<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("TWAP")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        let config = config.with_rpc_fallback(|key| vars.get(key).cloned());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml(toml: &str) -> ConfigResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Fill a missing RPC URL from `RPC_URL`, then `API_KEY`
    pub fn with_rpc_fallback<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.rpc_url.as_deref().map_or(true, str::is_empty) {
            self.rpc_url = ["RPC_URL", "API_KEY"]
                .iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.is_empty());
        }
        self
    }

    pub fn rpc_url(&self) -> ConfigResult<&str> {
        self.rpc_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingRpcUrl)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.rpc_url()?;

        if self.pools.is_empty() {
            return Err(ConfigError::NoPools);
        }

        let mut seen = HashSet::new();
        for pool in &self.pools {
            if !seen.insert(pool.pair.as_str()) {
                return Err(ConfigError::DuplicatePair(pool.pair.clone()));
            }
            if pool.precision > MAX_SCALE {
                return Err(ConfigError::Invalid(format!(
                    "{}: precision {} exceeds {}",
                    pool.pair, pool.precision, MAX_SCALE
                )));
            }
        }

        if self.server.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.handshake_timeout_ms must be positive".to_string(),
            ));
        }

        if self.publisher.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "publisher.interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
