// SPDX-License-Identifier: MPL-2.0

//! Monitor configuration
//!
//! Loaded from a JSON file. Any field missing from the file keeps its
//! default, so an empty object `{}` is a valid configuration.

use crate::error::{Error, Result};
use crate::metrics::AirtimeModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "REPEATER_MONITOR_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Format version of the file. Files newer than [`Config::VERSION`] are rejected.
    pub version: u64,

    /// Backend origin, e.g. `http://repeater.local:8000`. Endpoints live under `/api/`.
    pub api_url: String,
    pub request_timeout_ms: u64,

    /// Live dashboard polling (stats, recent packets).
    pub dashboard_interval_ms: u64,
    pub logs_interval_ms: u64,
    pub hardware_interval_ms: u64,
    /// Run the hardware poll timer on its own thread.
    pub hardware_dedicated_timer: bool,

    pub recent_packets_limit: u32,

    /// Maximum slots in the resource history ring buffer.
    pub resource_history_slots: usize,
    /// Samples closer together than this are treated as duplicates.
    pub resource_min_spacing_ms: u64,

    /// Trailing window for smoothed chart series.
    pub smoothing_window: usize,

    /// Window of the system view's metrics graph.
    pub metrics_graph_hours: u32,

    pub airtime: AirtimeModel,

    pub preferences_path: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            api_url: String::from("http://localhost:8000"),
            request_timeout_ms: 10_000,
            dashboard_interval_ms: 5_000,
            logs_interval_ms: 10_000,
            hardware_interval_ms: 30_000,
            hardware_dedicated_timer: true,
            recent_packets_limit: 50,
            resource_history_slots: 20,
            resource_min_spacing_ms: 1_000,
            smoothing_window: 5,
            metrics_graph_hours: 24,
            airtime: AirtimeModel::default(),
            preferences_path: PathBuf::from("repeater-monitor-preferences.json"),
            log_level: String::from("info"),
        }
    }
}

impl Config {
    pub const VERSION: u64 = 1;

    /// Longest accepted spacing between resource history samples (one day).
    pub const MAX_RESOURCE_SPACING_MS: u64 = 86_400_000;

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, else from `$REPEATER_MONITOR_CONFIG`, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) => Self::load(Path::new(&p)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version > Self::VERSION {
            return Err(Error::Config(format!(
                "config version {} is newer than supported version {}",
                self.version,
                Self::VERSION
            )));
        }
        if self.api_url.trim().is_empty() {
            return Err(Error::Config("api_url must not be empty".into()));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_url must be http(s), got {}",
                self.api_url
            )));
        }
        for (name, ms) in [
            ("dashboard_interval_ms", self.dashboard_interval_ms),
            ("logs_interval_ms", self.logs_interval_ms),
            ("hardware_interval_ms", self.hardware_interval_ms),
        ] {
            if ms == 0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if self.resource_history_slots == 0 {
            return Err(Error::Config("resource_history_slots must be positive".into()));
        }
        if self.resource_min_spacing_ms > Self::MAX_RESOURCE_SPACING_MS {
            return Err(Error::Config(format!(
                "resource_min_spacing_ms must be at most {}",
                Self::MAX_RESOURCE_SPACING_MS
            )));
        }
        if self.metrics_graph_hours == 0 {
            return Err(Error::Config("metrics_graph_hours must be positive".into()));
        }
        if self.smoothing_window == 0 {
            return Err(Error::Config("smoothing_window must be positive".into()));
        }
        self.airtime.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dashboard_interval(&self) -> Duration {
        Duration::from_millis(self.dashboard_interval_ms)
    }

    pub fn logs_interval(&self) -> Duration {
        Duration::from_millis(self.logs_interval_ms)
    }

    pub fn hardware_interval(&self) -> Duration {
        Duration::from_millis(self.hardware_interval_ms)
    }
}
