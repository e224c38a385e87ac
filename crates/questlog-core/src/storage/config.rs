//! TOML-based application configuration.
//!
//! Stores the streak/forgiveness knobs and the debug switches. Configuration
//! lives at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::streak::forgiveness;

/// Streak and forgiveness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Tokens granted when a user is provisioned.
    #[serde(default = "default_initial_tokens")]
    pub initial_forgiveness_tokens: i64,
    /// Trailing window of the activity grid, in days.
    #[serde(default = "default_activity_window_days")]
    pub activity_window_days: u32,
}

/// Debug switches. All default to off; none belong in a production posture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Unlocks the `tokens refill` safety-valve.
    #[serde(default)]
    pub token_refill: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub streak: StreakConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

// Default functions
fn default_initial_tokens() -> i64 {
    forgiveness::DEFAULT_TOKENS
}
fn default_activity_window_days() -> u32 {
    90
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            initial_forgiveness_tokens: default_initial_tokens(),
            activity_window_days: default_activity_window_days(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            token_refill: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            streak: StreakConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Config {
    /// Location of the active config file.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be prepared.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing the default config on first run.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(&path)?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, falling back to defaults on any failure.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
