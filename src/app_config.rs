use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Render/export service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Preview pipeline tuning
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Batch export tuning
    #[serde(default)]
    pub export: ExportConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Remote service connection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Base URL of the render/export API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token, empty when the service is open
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Transport timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Preview pipeline settings
///
/// The cache bounds only limit memory and staleness; there is no universally
/// right value for either.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Quiet period after the last edit before a remote render is issued
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum number of cached preview artifacts
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,

    /// Age after which a cached artifact is no longer served
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl PreviewConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            cache_max_size: default_cache_max_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Batch export settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// Delay between two status polls of a running batch
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed polls before the batch status is reported unknown
    #[serde(default = "default_max_consecutive_poll_failures")]
    pub max_consecutive_poll_failures: u32,

    /// Where the CLI stores downloaded exports
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl ExportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Configured download directory, else the user's download folder
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_poll_failures: default_max_consecutive_poll_failures(),
            download_dir: None,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_endpoint() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_cache_max_size() -> usize {
    64
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_consecutive_poll_failures() -> u32 {
    5
}

impl Config {
    /// Load a configuration file, creating it with defaults when missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!("Created default configuration at {}", path.display());
        Ok(config)
    }

    /// Read a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.service.endpoint)
            .with_context(|| format!("Invalid service endpoint: {}", self.service.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("Service endpoint must be http or https: {}", url));
        }

        if self.service.timeout_secs == 0 {
            return Err(anyhow!("Service timeout must be at least one second"));
        }

        if self.preview.cache_max_size == 0 {
            return Err(anyhow!("Preview cache size must be at least 1"));
        }

        if self.export.poll_interval_ms == 0 {
            return Err(anyhow!("Export poll interval must be positive"));
        }

        if self.export.max_consecutive_poll_failures == 0 {
            return Err(anyhow!("Export poll failure budget must be at least 1"));
        }

        Ok(())
    }
}
