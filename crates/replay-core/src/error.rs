//! Core error types for replay-core.
//!
//! Store failures, tag-sync failures, configuration and input validation
//! each get their own enum; `CoreError` wraps them for callers that do not
//! care which layer failed.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for replay-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Row store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Push-audience tag synchronization errors
    #[error("Tag sync error: {0}")]
    TagSync(#[from] TagSyncError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a progress/profile row store.
#[derive(Error, Debug)]
pub enum StoreError {
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

    /// Insert hit a unique constraint (another writer created the row first)
    #[error("Row already exists in {table} for {key}")]
    Conflict { table: &'static str, key: String },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked or busy past the busy timeout
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt value in column {column}: {message}")]
    Corrupt { column: usize, message: String },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors raised while pushing tags to the audience service.
#[derive(Error, Debug)]
pub enum TagSyncError {
    /// App id or API key missing
    #[error("Push audience service is not configured")]
    NotConfigured,

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid endpoint URL
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// Service answered with a non-success status
    #[error("Tag update rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Tag payload could not be serialized for hashing
    #[error("Tag payload error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the stored sync state failed
    #[error("Sync state store error: {0}")]
    Store(#[from] StoreError),
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Not a `YYYY-MM-DD` calendar date
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Not a `HH:MM[:SS]` wall-clock time
    #[error("Invalid time '{0}': expected HH:MM:SS")]
    InvalidTime(String),

    /// Not an IANA timezone name
    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("User id must not be empty")]
    EmptyUserId,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    StoreError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    StoreError::Conflict {
                        table: "unknown",
                        key: err.to_string(),
                    }
                }
                _ => StoreError::QueryFailed(err.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(column, _ty, source) => StoreError::Corrupt {
                column: *column,
                message: source.to_string(),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
