//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `courier-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure and a
//! loader that reads the file and applies environment overrides. Every
//! field has a default, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CourierConfig {
    /// Which game world the queue belongs to.
    #[serde(default)]
    pub world: WorldConfig,

    /// Dispatcher timing and failure policy.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Where the queue and ledgers are persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Unit speeds and world speed multipliers.
    #[serde(default)]
    pub travel: TravelConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CourierConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `COURIER_WORLD` overrides `world.id`
    /// - `COURIER_DATA_DIR` overrides `storage.data_dir`
    /// - `COURIER_TICK_INTERVAL_MS` overrides `scheduler.tick_interval_ms`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `COURIER_TICK_INTERVAL_MS` is
    /// not an integer.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("COURIER_WORLD") {
            self.world.id = val;
        }
        if let Ok(val) = std::env::var("COURIER_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("COURIER_TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms =
                val.parse().map_err(|_err| ConfigError::Invalid {
                    reason: format!("COURIER_TICK_INTERVAL_MS is not an integer: {val}"),
                })?;
        }
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "world.id must not be empty".to_owned(),
            });
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "scheduler.tick_interval_ms must be at least 1".to_owned(),
            });
        }
        if !(self.travel.world_speed > 0.0 && self.travel.unit_speed > 0.0) {
            return Err(ConfigError::Invalid {
                reason: "travel.world_speed and travel.unit_speed must be positive".to_owned(),
            });
        }
        if let Some((unit, _)) = self
            .travel
            .unit_speeds
            .iter()
            .find(|(_, minutes)| !(minutes.is_finite() && **minutes > 0.0))
        {
            return Err(ConfigError::Invalid {
                reason: format!("travel.unit_speeds.{unit} must be a positive number"),
            });
        }
        Ok(())
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// World identifier; namespaces every persisted key.
    #[serde(default = "default_world_id")]
    pub id: String,

    /// Milliseconds the game server's clock runs ahead of the local clock.
    #[serde(default)]
    pub server_time_offset_ms: i64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            id: default_world_id(),
            server_time_offset_ms: 0,
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Polling interval of the dispatcher, in wall-clock milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Failed dispatch attempts before a command is expired
    /// (0 = retry every tick until removed).
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: u32,

    /// Capacity of the control channel in front of the dispatcher task.
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
            control_capacity: default_control_capacity(),
        }
    }
}

/// Which key/value backend holds the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per key inside `data_dir`.
    #[default]
    File,
    /// Process memory only; nothing survives a restart.
    Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Data directory for the file backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Movement speed configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TravelConfig {
    /// World speed multiplier.
    #[serde(default = "default_speed")]
    pub world_speed: f64,

    /// Unit speed multiplier.
    #[serde(default = "default_speed")]
    pub unit_speed: f64,

    /// Base minutes per field for each unit type.
    #[serde(default = "default_unit_speeds")]
    pub unit_speeds: BTreeMap<String, f64>,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            world_speed: default_speed(),
            unit_speed: default_speed(),
            unit_speeds: default_unit_speeds(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_world_id() -> String {
    "default".to_owned()
}

const fn default_tick_interval_ms() -> u64 {
    250
}

const fn default_max_dispatch_attempts() -> u32 {
    8
}

const fn default_control_capacity() -> usize {
    64
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_speed() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Base minutes per field of the stock unit roster.
fn default_unit_speeds() -> BTreeMap<String, f64> {
    [
        ("spear", 14.0),
        ("sword", 22.0),
        ("axe", 18.0),
        ("archer", 18.0),
        ("light_cavalry", 10.0),
        ("mounted_archer", 10.0),
        ("heavy_cavalry", 11.0),
        ("ram", 30.0),
        ("catapult", 30.0),
        ("knight", 10.0),
        ("snob", 35.0),
        ("doppelsoldner", 14.0),
        ("trebuchet", 30.0),
    ]
    .into_iter()
    .map(|(unit, minutes)| (unit.to_owned(), minutes))
    .collect()
}
