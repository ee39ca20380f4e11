//! Host application settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use engine_system::{ListenerFailurePolicy, SystemConfig};

use crate::lifecycle::DriverConfig;
use crate::tick::TickConfig;

/// Errors loading an [`AppConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_tick_rate() -> f64 {
    60.0
}

/// Settings for the host, read from a JSON file.
///
/// Every field is optional; an empty object yields the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Ticks to run before shutting down (0 = until Ctrl-C).
    pub max_ticks: u64,
    pub listener_failure_policy: ListenerFailurePolicy,
    /// Root system entries.
    pub manifest: Vec<SystemConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            max_ticks: 0,
            listener_failure_policy: ListenerFailurePolicy::default(),
            manifest: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// Load a standalone manifest, a JSON array of system entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn manifest_from_path(path: impl AsRef<Path>) -> Result<Vec<SystemConfig>, ConfigError> {
        read_json(path.as_ref())
    }

    #[must_use]
    pub fn driver(&self) -> DriverConfig {
        DriverConfig {
            tick_rate: self.tick_rate,
            listener_failure_policy: self.listener_failure_policy,
        }
    }

    #[must_use]
    pub fn tick(&self) -> TickConfig {
        TickConfig {
            tick_rate: self.tick_rate,
            max_ticks: self.max_ticks,
        }
    }
}
