//! Error types for the sync layer.

use cloudpos_store::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote could not be reached at all; nothing was attempted.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// A request failed in transit (connect, reset, server error).
    #[error("network error: {0}")]
    Network(String),

    /// The remote refused the request.
    #[error("remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The remote reported a write conflict.
    #[error("remote conflict: {0}")]
    Conflict(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// A remote payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Another sync run is in progress on this engine.
    #[error("a sync is already running")]
    AlreadyRunning,

    /// A background task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<cloudpos_types::Error> for SyncError {
    fn from(err: cloudpos_types::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
