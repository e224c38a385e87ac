//! Core error types for questlog-core.
//!
//! This module defines the error hierarchy using thiserror. Business-rule
//! failures (tokens, forgiveness, recovery) are first-class variants so
//! callers can match on them instead of parsing messages.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for questlog-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No forgiveness tokens left to spend
    #[error("Insufficient forgiveness tokens")]
    InsufficientTokens,

    /// Restore-after-break requested without an unforgiven break
    #[error("No broken streak to forgive")]
    NoStreakToForgive,

    /// Recovery requested for a day that already has journal activity
    #[error("Day {date} already has journal activity")]
    DayAlreadyActive { date: chrono::NaiveDate },

    /// Unknown user
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Unknown task id
    #[error("Task not found: {id}")]
    TaskNotFound { id: i64 },
}

impl CoreError {
    /// Whether this is an expected business-rule failure (the 4xx-equivalent
    /// bucket) as opposed to a storage or configuration fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::InsufficientTokens
                | CoreError::NoStreakToForgive
                | CoreError::DayAlreadyActive { .. }
                | CoreError::UserNotFound(_)
                | CoreError::TaskNotFound { .. }
        )
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Data directory could not be created
    #[error("Failed to prepare data directory {path}: {message}")]
    DataDirFailed { path: PathBuf, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Required field missing or empty
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
