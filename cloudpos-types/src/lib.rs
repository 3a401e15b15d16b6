//! Core type definitions for CloudPOS.
//!
//! This crate defines the types shared by the offline store, the credential
//! vault and the sync engine:
//! - Entity and device identifiers (UUID)
//! - Millisecond wall-clock timestamps used for last-write-wins
//! - Typed per-entity fields and the tagged outbox payload
//! - Remote snapshot rows

mod entity;
mod ids;
mod remote;
mod timestamp;

pub use entity::{
    CategoryFields, CustomerFields, EntityFields, EntityType, OutboxOp, OutboxPayload,
    ProductFields, Record, SyncMeta,
};
pub use ids::{DeviceId, EntityId};
pub use remote::RemoteRow;
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("validation failed: {0}")]
    Validation(String),
}
