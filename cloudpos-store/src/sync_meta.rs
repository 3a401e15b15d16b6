//! Bookkeeping about the last completed sync run.

use crate::entities::parse_opt_col;
use crate::error::StorageResult;
use crate::store::LocalStore;
use cloudpos_types::Timestamp;
use rusqlite::params;
use serde::Serialize;

/// Summary of the most recent sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LastSync {
    pub at: Option<Timestamp>,
    pub pushed: usize,
    pub pulled: usize,
    pub error_count: usize,
}

/// Access to the single-row `sync_meta` table.
#[derive(Debug, Clone)]
pub struct SyncMetaStore {
    store: LocalStore,
}

impl SyncMetaStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn load(&self) -> StorageResult<LastSync> {
        let rows = self.store.query_map(
            "SELECT last_synced_at, last_pushed, last_pulled, last_error_count
             FROM sync_meta WHERE id = 1",
            [],
            |row| {
                Ok(LastSync {
                    at: parse_opt_col(row, 0)?,
                    pushed: row.get::<_, i64>(1)?.max(0) as usize,
                    pulled: row.get::<_, i64>(2)?.max(0) as usize,
                    error_count: row.get::<_, i64>(3)?.max(0) as usize,
                })
            },
        )?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    pub fn record(&self, last: &LastSync) -> StorageResult<()> {
        self.store.execute(
            "INSERT INTO sync_meta (id, last_synced_at, last_pushed, last_pulled, last_error_count)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 last_synced_at = excluded.last_synced_at,
                 last_pushed = excluded.last_pushed,
                 last_pulled = excluded.last_pulled,
                 last_error_count = excluded.last_error_count",
            params![
                last.at.map(|t| t.to_rfc3339()),
                last.pushed as i64,
                last.pulled as i64,
                last.error_count as i64
            ],
        )?;
        Ok(())
    }
}
