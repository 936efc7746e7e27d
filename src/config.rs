//! Configuration for a log sync session.
//!
//! Settings live in a TOML file (`<config dir>/logsync/config.toml` by
//! default). Every field has a default, so a missing file or a partial file
//! is fine; command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SyncError};

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

/// Knobs of the synchronization core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Tail size: page size of both history pages and forward polls.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Skip a poll tick while the previous forward request is outstanding.
    #[serde(default = "default_true")]
    pub single_flight_polling: bool,

    /// Re-issue the tail load on ticks where nothing has been loaded yet.
    #[serde(default = "default_true")]
    pub reseed_when_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            page_size: default_page_size(),
            poll_interval_ms: default_poll_interval_ms(),
            single_flight_polling: true,
            reseed_when_empty: true,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SyncError::InvalidConfig("page_size must be at least 1".into()));
        }
        if self.page_size > i64::MAX as usize {
            return Err(SyncError::InvalidConfig("page_size is too large".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(SyncError::InvalidConfig("poll_interval_ms must be at least 1".into()));
        }
        Ok(())
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SyncError::InvalidConfig("base_url must not be empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig("request_timeout_ms must be at least 1".into()));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.source.validate()
    }
}

/// Locates and reads the config file.
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Loader for the default location, `<config dir>/logsync/config.toml`.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logsync");
        Self {
            config_path: config_dir.join("config.toml"),
        }
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Reads the file, falling back to defaults when it does not exist.
    /// A file that exists but does not parse or validate is an error.
    pub fn load_or_default(&self) -> Result<Config> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        self.load()
    }

    pub fn load(&self) -> Result<Config> {
        let content = fs::read_to_string(&self.config_path)?;
        let config = Config::from_toml(&content)?;
        debug!(path = %self.config_path.display(), "loaded config");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
