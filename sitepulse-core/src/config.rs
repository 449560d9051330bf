//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sitepulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sitepulse/` (~/.config/sitepulse/)
//! - Data: `$XDG_DATA_HOME/sitepulse/` (~/.local/share/sitepulse/)
//! - State/Logs: `$XDG_STATE_HOME/sitepulse/` (~/.local/state/sitepulse/)

use crate::error::{Error, Result};
use crate::types::{ClientContext, Dimensions};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Collector (client) configuration
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Ingestion server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client context reported with every batch
    #[serde(default)]
    pub client: ClientConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Also write logs to stderr (useful for the server)
    #[serde(default)]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            stderr: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Collector configuration
///
/// `enabled` is only the initial consent when no consent has been stored yet.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Initial consent when nothing has been persisted
    #[serde(default)]
    pub enabled: bool,

    /// Ingestion server base URL (e.g., `https://example.com`)
    pub server_url: Option<String>,

    /// Buffered events that trigger an immediate flush
    #[serde(default = "default_collector_batch_size")]
    pub batch_size: usize,

    /// Seconds between timer-driven flushes
    #[serde(default = "default_collector_flush_interval")]
    pub flush_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on buffered events; the oldest are dropped past it
    #[serde(default = "default_collector_max_buffered")]
    pub max_buffered_events: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: None,
            batch_size: default_collector_batch_size(),
            flush_interval_secs: default_collector_flush_interval(),
            timeout_secs: default_collector_timeout(),
            max_buffered_events: default_collector_max_buffered(),
        }
    }
}

impl CollectorConfig {
    /// Check if collector is enabled and knows where to deliver
    pub fn is_ready(&self) -> bool {
        self.enabled && self.server_url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.server_url.is_none() {
            return Err(Error::Config(
                "collector.server_url is required when collector is enabled".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::Config(
                "collector.batch_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "collector.flush_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_buffered_events < self.batch_size {
            return Err(Error::Config(
                "collector.max_buffered_events must not be smaller than batch_size".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the configured flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn default_collector_batch_size() -> usize {
    10
}

fn default_collector_flush_interval() -> u64 {
    30
}

fn default_collector_timeout() -> u64 {
    10
}

fn default_collector_max_buffered() -> usize {
    1000
}

/// Where the ingestion server keeps batches
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process-lifetime list, lost on restart
    #[default]
    Memory,
    /// SQLite database file
    Sqlite,
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageKind::Memory),
            "sqlite" => Ok(StorageKind::Sqlite),
            _ => Err(format!("unknown storage kind: {}", s)),
        }
    }
}

/// Ingestion server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageKind,

    /// Database path override (only with `storage = "sqlite"`)
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            storage: StorageKind::default(),
            database_path: None,
        }
    }
}

impl ServerConfig {
    /// Database path, falling back to the XDG data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Config::database_path)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Client context reported by the collector
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub screen_width: u32,
    #[serde(default)]
    pub screen_height: u32,
    #[serde(default)]
    pub viewport_width: u32,
    #[serde(default)]
    pub viewport_height: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            language: default_language(),
            timezone: default_timezone(),
            screen_width: 0,
            screen_height: 0,
            viewport_width: 0,
            viewport_height: 0,
        }
    }
}

impl ClientConfig {
    pub fn context(&self) -> ClientContext {
        ClientContext::new(
            &self.user_agent,
            self.language.clone(),
            self.timezone.clone(),
            Dimensions::new(self.screen_width, self.screen_height),
            Dimensions::new(self.viewport_width, self.viewport_height),
        )
    }
}

fn default_user_agent() -> String {
    format!("sitepulse/{}", env!("CARGO_PKG_VERSION"))
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.collector.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/sitepulse/config.toml` (~/.config/sitepulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sitepulse").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("sitepulse")
    }

    /// Returns the state directory path (for logs and consent)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sitepulse")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/sitepulse/batches.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("batches.db")
    }

    /// Returns the persisted consent path
    ///
    /// `$XDG_STATE_HOME/sitepulse/consent.json`
    pub fn consent_path() -> PathBuf {
        Self::state_dir().join("consent.json")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("sitepulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// CLI binaries call this before anything reads these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
