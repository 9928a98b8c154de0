//! Dashboard configuration.
//!
//! Resolution order, later wins:
//!
//! 1. built-in defaults
//! 2. TOML file (`--config <path>`, else `$SHAREWATCH_HOME/config.toml` when present)
//! 3. `SHAREWATCH_*` environment variables
//! 4. command-line flags (applied by the CLI)
//!
//! ```toml
//! source = "yahoo"
//! cache_ttl_secs = 300
//! fetch_timeout_ms = 15000
//! max_concurrency = 8
//! requests_per_minute = 120
//! band_margin = 0.10
//! band_floor = 0.0
//! history_limit = 30
//! watchlist_urls = ["https://example.com/watchlist-us.json"]
//! warehouse_path = "/var/lib/sharewatch/warehouse.duckdb"
//! ```

use std::env;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sharewatch_warehouse::{resolve_home, WarehouseConfig};
use thiserror::Error;

use crate::band::BandOptions;
use crate::cache::CacheMode;
use crate::client::ClientOptions;
use crate::watchlist::DEFAULT_WATCHLIST_URLS;
use crate::ProviderId;

/// File name looked up inside `$SHAREWATCH_HOME`.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {key}='{value}' is invalid")]
    InvalidEnv { key: String, value: String },
    #[error("config field '{field}' {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "config.io",
            Self::Parse { .. } => "config.parse",
            Self::InvalidEnv { .. } => "config.invalid_env",
            Self::Invalid { .. } => "config.invalid",
        }
    }
}

/// Runtime settings for the dashboard back-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub source: ProviderId,
    /// Series cache TTL; `0` disables caching.
    pub cache_ttl_secs: u64,
    /// Per-fetch timeout; `0` disables it.
    pub fetch_timeout_ms: u64,
    pub max_concurrency: usize,
    /// `0` means unthrottled.
    pub requests_per_minute: u32,
    pub band_margin: f64,
    /// `None` disables lower-bound clamping.
    pub band_floor: Option<f64>,
    pub history_limit: usize,
    pub watchlist_urls: Vec<String>,
    /// Defaults to `$SHAREWATCH_HOME/warehouse.duckdb`.
    pub warehouse_path: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let client = ClientOptions::default();
        let band = BandOptions::default();
        Self {
            source: ProviderId::Yahoo,
            cache_ttl_secs: client.cache_ttl.as_secs(),
            fetch_timeout_ms: u64::try_from(client.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
            max_concurrency: 8,
            requests_per_minute: client.requests_per_minute.map_or(0, NonZeroU32::get),
            band_margin: band.margin,
            band_floor: band.floor,
            history_limit: 30,
            watchlist_urls: DEFAULT_WATCHLIST_URLS.iter().map(ToString::to_string).collect(),
            warehouse_path: None,
        }
    }
}

impl DashboardConfig {
    /// Load defaults, then the TOML file, then environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `$SHAREWATCH_HOME/config.toml`
    /// is used only if present. The result is not validated: apply any
    /// command-line overrides first, then call [`validate`](Self::validate) once.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => {
                let implicit = resolve_home().join(CONFIG_FILE_NAME);
                if implicit.is_file() {
                    Self::from_path(&implicit)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `SHAREWATCH_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SHAREWATCH_SOURCE") {
            self.source = parse_env("SHAREWATCH_SOURCE", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_env("SHAREWATCH_CACHE_TTL_SECS", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_env("SHAREWATCH_FETCH_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_MAX_CONCURRENCY") {
            self.max_concurrency = parse_env("SHAREWATCH_MAX_CONCURRENCY", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_REQUESTS_PER_MINUTE") {
            self.requests_per_minute = parse_env("SHAREWATCH_REQUESTS_PER_MINUTE", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_BAND_MARGIN") {
            self.band_margin = parse_env("SHAREWATCH_BAND_MARGIN", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_BAND_FLOOR") {
            self.band_floor = match value.trim().to_ascii_lowercase().as_str() {
                "" | "none" => None,
                _ => Some(parse_env("SHAREWATCH_BAND_FLOOR", value)?),
            };
        }
        if let Some(value) = lookup("SHAREWATCH_HISTORY_LIMIT") {
            self.history_limit = parse_env("SHAREWATCH_HISTORY_LIMIT", value)?;
        }
        if let Some(value) = lookup("SHAREWATCH_WATCHLIST_URLS") {
            self.watchlist_urls = value
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(value) = lookup("SHAREWATCH_WAREHOUSE_PATH") {
            self.warehouse_path = (!value.trim().is_empty()).then(|| PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
                reason: String::from("must be at least 1"),
            });
        }
        if !self.band_margin.is_finite() || self.band_margin < 0.0 {
            return Err(ConfigError::Invalid {
                field: "band_margin",
                reason: format!("must be a finite non-negative fraction, got {}", self.band_margin),
            });
        }
        if self.band_floor.is_some_and(|floor| !floor.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "band_floor",
                reason: String::from("must be finite"),
            });
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "history_limit",
                reason: String::from("must be at least 1"),
            });
        }
        Ok(())
    }

    pub fn client_options(&self, cache_mode: CacheMode) -> ClientOptions {
        ClientOptions {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            requests_per_minute: NonZeroU32::new(self.requests_per_minute),
            cache_mode,
        }
    }

    pub fn band_options(&self) -> BandOptions {
        BandOptions {
            margin: self.band_margin,
            floor: self.band_floor,
            ..BandOptions::default()
        }
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        let config = WarehouseConfig::default();
        match &self.warehouse_path {
            Some(path) => config.with_db_path(path),
            None => config,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })
}
