//! The remote side of sync.
//!
//! Defines the interface the engine talks to, plus a PostgREST client and an
//! in-process implementation.

pub mod memory;
pub mod rest;

use crate::error::SyncResult;
use async_trait::async_trait;
use cloudpos_types::{EntityId, EntityType, OutboxPayload, RemoteRow, Timestamp};

/// Abstract remote store.
///
/// Writes must be idempotent: repeating an upsert or soft delete with the
/// same arguments leaves the remote unchanged. There is no hard delete.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Cheap reachability probe.
    async fn ping(&self) -> SyncResult<()>;

    /// Full snapshot of one table, tombstones included.
    async fn fetch_all(&self, entity_type: EntityType) -> SyncResult<Vec<RemoteRow>>;

    /// Inserts or replaces a live row.
    async fn upsert(
        &self,
        entity_id: EntityId,
        payload: &OutboxPayload,
        updated_at: Timestamp,
    ) -> SyncResult<()>;

    /// Marks a row deleted.
    async fn soft_delete(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        deleted_at: Timestamp,
    ) -> SyncResult<()>;
}
