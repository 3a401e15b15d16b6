//! Error types for the vault.

use cloudpos_store::StorageError;
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors from provisioning and offline verification.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The PIN does not match the provisioned digest.
    #[error("invalid PIN")]
    InvalidCredential,

    /// No profile exists for the identifier on this device.
    #[error("this device is not provisioned for offline use")]
    NotProvisioned,

    /// The PIN does not meet the format requirements.
    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A blocking vault task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from a [`SessionProvider`](crate::SessionProvider).
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The identity service could not be reached.
    #[error("session service unreachable: {0}")]
    Unreachable(String),

    /// The identity service answered with something unusable.
    #[error("session lookup failed: {0}")]
    Failed(String),
}
