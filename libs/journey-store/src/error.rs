//! Store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(PathBuf),

    #[error("document is read-only: {0}")]
    ReadOnly(PathBuf),

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: i64, supported: i64 },

    #[error("migration target already exists: {0}")]
    TargetExists(PathBuf),

    #[error("could not save journey {user}/{language}")]
    SaveFailed { user: String, language: String },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<journey_core::CoreError> for StoreError {
    fn from(err: journey_core::CoreError) -> Self {
        Self::InvalidData(err.to_string())
    }
}
