//! Application configuration at ~/.config/eventcal/config.toml
//!
//! Every key is optional. Values can also be overridden from the environment
//! with an `EVENTCAL_` prefix, e.g. `EVENTCAL_POLL_INTERVAL=30s`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

const APP_DIR: &str = "eventcal";
const DEFAULT_POLL_INTERVAL: &str = "1m";

/// Due detection matches on the minute, so polling less often than this
/// could skip an event's minute entirely.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON file holding every event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_file: Option<PathBuf>,

    /// Append-only error log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// How often the scheduler checks for due events (humantime, e.g. "30s").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
}

impl AppConfig {
    pub fn config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoDirectory("config"))?
            .join(APP_DIR);

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config from its default location, creating a commented-out
    /// default file on first run.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            Self::create_default_config(&path)?;
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("EVENTCAL"))
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        config.poll_interval()?;
        Ok(config)
    }

    pub fn events_path(&self) -> ConfigResult<PathBuf> {
        match &self.events_file {
            Some(path) => Ok(expand(path)),
            None => Ok(dirs::data_dir()
                .ok_or(ConfigError::NoDirectory("data"))?
                .join(APP_DIR)
                .join("events.json")),
        }
    }

    pub fn log_path(&self) -> ConfigResult<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(expand(path)),
            None => Ok(dirs::data_local_dir()
                .ok_or(ConfigError::NoDirectory("local data"))?
                .join(APP_DIR)
                .join("error.log")),
        }
    }

    /// The parsed poll interval. Must be non-zero and at most one minute.
    pub fn poll_interval(&self) -> ConfigResult<Duration> {
        let raw = self.poll_interval.as_deref().unwrap_or(DEFAULT_POLL_INTERVAL);

        let interval = humantime::parse_duration(raw)
            .map_err(|e| ConfigError::Invalid(format!("poll_interval \"{raw}\": {e}")))?;

        if interval.is_zero() || interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "poll_interval must be between 1ms and {}, got \"{raw}\"",
                humantime::format_duration(MAX_POLL_INTERVAL)
            )));
        }

        Ok(interval)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> ConfigResult<()> {
        let contents = format!(
            "\
# eventcal configuration

# Where events are stored:
# events_file = \"~/.local/share/eventcal/events.json\"

# Where errors are logged:
# log_file = \"~/.local/share/eventcal/error.log\"

# How often `eventcal watch` checks for due events (at most 1m):
# poll_interval = \"{}\"
",
            DEFAULT_POLL_INTERVAL
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
