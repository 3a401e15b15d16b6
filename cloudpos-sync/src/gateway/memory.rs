//! In-process gateway.
//!
//! Keeps remote tables in memory and lets callers script outages and
//! rejections. Used by the engine tests and by the CLI's offline demo mode.

use super::RemoteGateway;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use cloudpos_types::{EntityId, EntityType, OutboxOp, OutboxPayload, RemoteRow, Timestamp};
use cloudpos_vault::{SessionError, SessionProvider, SessionUser};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// A failure the gateway should produce instead of doing the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// HTTP-400 style rejection.
    Rejected,
    /// Write conflict.
    Conflict,
    /// Transport failure.
    Network,
    /// Never answers.
    Stall,
}

impl ScriptedFailure {
    async fn raise(self, what: String) -> SyncError {
        match self {
            ScriptedFailure::Rejected => SyncError::RemoteRejected {
                status: 400,
                message: what,
            },
            ScriptedFailure::Conflict => SyncError::Conflict(what),
            ScriptedFailure::Network => SyncError::Network(what),
            ScriptedFailure::Stall => std::future::pending().await,
        }
    }
}

/// One write received by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub op: OutboxOp,
    pub updated_at: Timestamp,
    /// Fields sent with an upsert; `None` for deletes.
    pub payload: Option<OutboxPayload>,
}

#[derive(Debug)]
struct MemoryState {
    reachable: bool,
    tables: HashMap<EntityType, BTreeMap<EntityId, RemoteRow>>,
    push_failures: HashMap<EntityId, ScriptedFailure>,
    fetch_failures: HashMap<EntityType, ScriptedFailure>,
    pushes: Vec<PushRecord>,
    session: Option<SessionUser>,
}

/// Remote store held in memory.
#[derive(Debug)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// A reachable gateway with empty tables.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                reachable: true,
                tables: HashMap::new(),
                push_failures: HashMap::new(),
                fetch_failures: HashMap::new(),
                pushes: Vec::new(),
                session: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Writes a row directly, as another device would.
    pub fn seed(&self, row: RemoteRow) {
        self.lock()
            .tables
            .entry(row.entity_type())
            .or_default()
            .insert(row.id, row);
    }

    pub fn row(&self, entity_type: EntityType, id: EntityId) -> Option<RemoteRow> {
        self.lock()
            .tables
            .get(&entity_type)
            .and_then(|table| table.get(&id).cloned())
    }

    pub fn rows(&self, entity_type: EntityType) -> Vec<RemoteRow> {
        self.lock()
            .tables
            .get(&entity_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes every push for `entity_id` fail until cleared.
    pub fn fail_pushes_for(&self, entity_id: EntityId, failure: ScriptedFailure) {
        self.lock().push_failures.insert(entity_id, failure);
    }

    /// Makes every fetch of `entity_type` fail until cleared.
    pub fn fail_fetches_for(&self, entity_type: EntityType, failure: ScriptedFailure) {
        self.lock().fetch_failures.insert(entity_type, failure);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.push_failures.clear();
        state.fetch_failures.clear();
    }

    /// Every successful write, in arrival order.
    pub fn pushes(&self) -> Vec<PushRecord> {
        self.lock().pushes.clone()
    }

    pub fn set_session(&self, session: Option<SessionUser>) {
        self.lock().session = session;
    }

    fn check_push(&self, entity_id: EntityId) -> Result<(), ScriptedFailure> {
        let state = self.lock();
        if !state.reachable {
            return Err(ScriptedFailure::Network);
        }
        match state.push_failures.get(&entity_id) {
            Some(failure) => Err(*failure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> SyncResult<()> {
        if self.lock().reachable {
            Ok(())
        } else {
            Err(SyncError::NetworkUnavailable)
        }
    }

    async fn fetch_all(&self, entity_type: EntityType) -> SyncResult<Vec<RemoteRow>> {
        let scripted = {
            let state = self.lock();
            if !state.reachable {
                Some(ScriptedFailure::Network)
            } else {
                state.fetch_failures.get(&entity_type).copied()
            }
        };
        if let Some(failure) = scripted {
            return Err(failure.raise(format!("fetch {}", entity_type.table())).await);
        }
        Ok(self.rows(entity_type))
    }

    async fn upsert(
        &self,
        entity_id: EntityId,
        payload: &OutboxPayload,
        updated_at: Timestamp,
    ) -> SyncResult<()> {
        let entity_type = payload.entity_type();
        if let Err(failure) = self.check_push(entity_id) {
            return Err(failure.raise(format!("upsert {entity_type} {entity_id}")).await);
        }

        let mut state = self.lock();
        let table = state.tables.entry(entity_type).or_default();
        let created_at = table
            .get(&entity_id)
            .and_then(|row| row.created_at)
            .unwrap_or(updated_at);
        table.insert(
            entity_id,
            RemoteRow {
                id: entity_id,
                created_at: Some(created_at),
                updated_at: Some(updated_at),
                is_deleted: false,
                payload: payload.clone(),
            },
        );
        state.pushes.push(PushRecord {
            entity_type,
            entity_id,
            op: OutboxOp::Upsert,
            updated_at,
            payload: Some(payload.clone()),
        });
        Ok(())
    }

    async fn soft_delete(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        deleted_at: Timestamp,
    ) -> SyncResult<()> {
        if let Err(failure) = self.check_push(entity_id) {
            return Err(failure.raise(format!("delete {entity_type} {entity_id}")).await);
        }

        let mut state = self.lock();
        if let Some(row) = state
            .tables
            .get_mut(&entity_type)
            .and_then(|table| table.get_mut(&entity_id))
        {
            row.is_deleted = true;
            row.updated_at = Some(deleted_at);
        }
        state.pushes.push(PushRecord {
            entity_type,
            entity_id,
            op: OutboxOp::Delete,
            updated_at: deleted_at,
            payload: None,
        });
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for MemoryGateway {
    async fn current_session(&self) -> Result<Option<SessionUser>, SessionError> {
        let state = self.lock();
        if !state.reachable {
            return Err(SessionError::Unreachable("memory gateway offline".into()));
        }
        Ok(state.session.clone())
    }
}
