//! SQLite storage layer for CloudPOS.
//!
//! Provides the on-device database that lets the point of sale keep working
//! without connectivity.
//!
//! # Architecture
//!
//! - One shared connection per database, injected as a cloneable [`LocalStore`]
//! - Versioned migrations applied atomically on open
//! - Entity tables carry last-write-wins metadata and soft-delete tombstones
//! - Every local mutation appends to the [`Outbox`] in the same transaction

mod entities;
mod error;
mod migrations;
mod outbox;
mod store;
mod sync_meta;

pub use entities::{
    EntityStore, ProductListing, TableFields, apply_remote, local_updated_at, mark_pushed,
};
pub use error::{StorageError, StorageResult};
pub use migrations::{MIGRATIONS, Migration, MigrationReport};
pub use outbox::{Outbox, OutboxEntry};
pub use store::{FromRow, LocalStore, StoreOpener};
pub use sync_meta::{LastSync, SyncMetaStore};

/// Re-exported so downstream crates can write transaction closures and
/// [`FromRow`] impls without a direct `rusqlite` dependency.
pub use rusqlite;
