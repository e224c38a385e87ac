mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, DebugConfig, StreakConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::StorageError;

/// Returns the questlog data directory, creating it if needed.
///
/// `QUESTLOG_DATA_DIR` overrides the location outright (tests point this at
/// tempdirs). Otherwise `~/.config/questlog`, or `~/.config/questlog-dev`
/// when `QUESTLOG_ENV=dev`.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var("QUESTLOG_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("QUESTLOG_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("questlog-dev")
            } else {
                base_dir.join("questlog")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| StorageError::DataDirFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
