//! Durable FIFO of local mutations awaiting upload.
//!
//! Entries are appended in the same transaction as the entity write they
//! describe, so a row and its pending mutation are never out of step.
//! Sequence ids come from an AUTOINCREMENT column and are never reused,
//! even after the newest entry has been acknowledged.

use crate::entities;
use crate::error::{StorageError, StorageResult};
use crate::store::{FromRow, LocalStore};
use cloudpos_types::{EntityId, EntityType, OutboxOp, OutboxPayload, Timestamp};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxEntry {
    pub sequence_id: i64,
    pub entity_type: EntityType,
    pub op: OutboxOp,
    pub entity_id: EntityId,
    /// The row's fields as of the mutation.
    pub payload: OutboxPayload,
    pub created_at: Timestamp,
}

const SELECT_ENTRY: &str =
    "SELECT sequence_id, entity_type, op, entity_id, payload, created_at FROM outbox";

impl FromRow for OutboxEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let entity_type: EntityType = entities::parse_col(row, 1)?;
        let raw_payload: String = row.get(4)?;
        let payload: OutboxPayload = serde_json::from_str(&raw_payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        if payload.entity_type() != entity_type {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Text,
                format!(
                    "payload is tagged {} but entry is {}",
                    payload.entity_type(),
                    entity_type
                )
                .into(),
            ));
        }
        Ok(Self {
            sequence_id: row.get(0)?,
            entity_type,
            op: entities::parse_col(row, 2)?,
            entity_id: entities::parse_col(row, 3)?,
            payload,
            created_at: entities::parse_col(row, 5)?,
        })
    }
}

/// The mutation outbox.
#[derive(Debug, Clone)]
pub struct Outbox {
    store: LocalStore,
}

impl Outbox {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Appends an entry inside the caller's transaction and returns its
    /// sequence id.
    pub fn enqueue(
        conn: &Connection,
        op: OutboxOp,
        entity_id: EntityId,
        payload: &OutboxPayload,
        created_at: Timestamp,
    ) -> StorageResult<i64> {
        let entity_type = payload.entity_type();
        let json = serde_json::to_string(payload)?;
        conn.execute(
            "INSERT INTO outbox (entity_type, op, entity_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity_type.as_str(),
                op.as_str(),
                entity_id.to_string(),
                json,
                created_at.to_rfc3339()
            ],
        )?;
        let seq = conn.last_insert_rowid();
        debug!("Enqueued {} {} {} as #{}", op, entity_type, entity_id, seq);
        Ok(seq)
    }

    /// Drops pending entries for one row recorded at or before `upto`, inside
    /// the caller's transaction. Used when a newer remote version replaces the
    /// row, so the losing local edits are never uploaded over it.
    pub fn supersede(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: EntityId,
        upto: Timestamp,
    ) -> StorageResult<usize> {
        let removed = conn.execute(
            "DELETE FROM outbox
             WHERE entity_type = ?1 AND entity_id = ?2 AND created_at <= ?3",
            params![
                entity_type.as_str(),
                entity_id.to_string(),
                upto.to_rfc3339()
            ],
        )?;
        if removed > 0 {
            debug!(
                "Superseded {} pending {} {} entries at {}",
                removed, entity_type, entity_id, upto
            );
        }
        Ok(removed)
    }

    /// Every pending entry in ascending sequence order.
    pub fn peek_all(&self) -> StorageResult<Vec<OutboxEntry>> {
        self.store
            .query(&format!("{SELECT_ENTRY} ORDER BY sequence_id"), [])
    }

    /// Pending entries of one entity type, in ascending sequence order.
    pub fn peek_type(&self, entity_type: EntityType) -> StorageResult<Vec<OutboxEntry>> {
        self.store.query(
            &format!("{SELECT_ENTRY} WHERE entity_type = ?1 ORDER BY sequence_id"),
            [entity_type.as_str()],
        )
    }

    /// Removes one entry. Unknown sequence ids are reported as `NotFound`.
    pub fn ack(&self, sequence_id: i64) -> StorageResult<()> {
        let removed = self
            .store
            .execute("DELETE FROM outbox WHERE sequence_id = ?1", [sequence_id])?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("outbox entry #{sequence_id}")));
        }
        Ok(())
    }

    /// Removes an uploaded entry and records when the remote accepted its row,
    /// both in one transaction.
    pub fn ack_pushed(&self, entry: &OutboxEntry, at: Timestamp) -> StorageResult<()> {
        self.store.transaction(|tx| {
            let removed = tx.execute(
                "DELETE FROM outbox WHERE sequence_id = ?1",
                [entry.sequence_id],
            )?;
            if removed == 0 {
                return Err(StorageError::NotFound(format!(
                    "outbox entry #{}",
                    entry.sequence_id
                )));
            }
            entities::mark_pushed(tx, entry.entity_type, entry.entity_id, at)?;
            Ok(())
        })
    }

    pub fn len(&self) -> StorageResult<usize> {
        let counts = self.store.query_map("SELECT COUNT(*) FROM outbox", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Pending entry count per entity type. Types with nothing pending are absent.
    pub fn pending_by_type(&self) -> StorageResult<BTreeMap<EntityType, usize>> {
        let rows = self.store.query_map(
            "SELECT entity_type, COUNT(*) FROM outbox GROUP BY entity_type",
            [],
            |row| Ok((entities::parse_col::<EntityType>(row, 0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(rows
            .into_iter()
            .map(|(entity_type, count)| (entity_type, count.max(0) as usize))
            .collect())
    }
}
