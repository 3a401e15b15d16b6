//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite (malformed SQL, I/O, busy, ...).
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// A UNIQUE, NOT NULL, CHECK or FOREIGN KEY constraint rejected a write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed; the whole migration run was rolled back.
    #[error("migration to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The connection mutex was poisoned by a panic in another thread.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Constraint(err.to_string())
            }
            _ => StorageError::Database(err),
        }
    }
}

impl From<cloudpos_types::Error> for StorageError {
    fn from(err: cloudpos_types::Error) -> Self {
        match err {
            cloudpos_types::Error::Serialization(e) => StorageError::Serialization(e),
            other => StorageError::InvalidData(other.to_string()),
        }
    }
}
