//! Configuration file management.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use dustline_core::{ChannelOptions, DashboardConfig, SeriesConfig};
use dustline_store::{Layout, StoreOptions};
use dustline_types::DurationCounts;

/// Which push transport `watch` subscribes with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Server-sent events on `/updates/all`
    #[default]
    EventStream,
    /// Per-device WebSocket on `/devices/{uuid}/ws`
    Websocket,
}

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the monitoring service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Push transport
    #[serde(default)]
    pub transport: TransportKind,

    /// Device this dashboard belongs to
    #[serde(default)]
    pub device_uuid: Option<String>,

    /// Storage layout, fixed per deployment
    #[serde(default)]
    pub layout: Layout,

    /// Database file (defaults to the platform data directory)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Seconds between reconnect attempts
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Storage quota in bytes (defaults to the store's quota)
    #[serde(default)]
    pub quota_bytes: Option<usize>,

    /// Charted concentration metrics
    #[serde(default = "SeriesConfig::defaults")]
    pub series: Vec<SeriesConfig>,

    /// Duration snapshots shown before anything is received
    #[serde(default)]
    pub initial_durations: BTreeMap<String, DurationCounts>,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            transport: TransportKind::default(),
            device_uuid: None,
            layout: Layout::default(),
            database: None,
            reconnect_delay_secs: default_reconnect_delay_secs(),
            quota_bytes: None,
            series: SeriesConfig::defaults(),
            initial_durations: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dustline")
            .join("config.toml")
    }

    /// Load config from `path`, or return default if it is missing or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config at {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load and parse config from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            bail!(
                "server_url must start with http:// or https://, got: {}",
                self.server_url
            );
        }
        if self.reconnect_delay_secs == 0 {
            bail!("reconnect_delay_secs must be > 0");
        }
        if self.series.iter().any(|s| s.metric.is_empty()) {
            bail!("series metric must not be empty");
        }
        Ok(())
    }

    /// Database file, falling back to the platform default.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(dustline_store::default_db_path)
    }

    pub fn store_options(&self) -> StoreOptions {
        match self.quota_bytes {
            Some(bytes) => StoreOptions::default().quota_bytes(bytes),
            None => StoreOptions::default(),
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions::new().reconnect_delay(Duration::from_secs(self.reconnect_delay_secs))
    }

    /// Session configuration derived from this file.
    pub fn dashboard_config(&self) -> DashboardConfig {
        let config = DashboardConfig::new()
            .series(self.series.clone())
            .initial_durations(self.initial_durations.clone());
        match &self.device_uuid {
            Some(uuid) => config.device_uuid(uuid.clone()),
            None => config,
        }
    }

    /// Configured device, or an error naming how to set one.
    pub fn require_device(&self) -> Result<&str> {
        self.device_uuid
            .as_deref()
            .filter(|uuid| !uuid.is_empty())
            .context("No device configured. Pass --device or set device_uuid in the config file")
    }
}
