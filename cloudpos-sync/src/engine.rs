//! Sync engine: pushes the outbox, then pulls and merges remote snapshots.
//!
//! Storage work runs on the blocking pool against the shared store handle;
//! every gateway call is bounded by the configured timeout. One run at a
//! time per engine.

use crate::conflict::{self, MergeDecision};
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::report::{SyncReport, SyncStatus, WarmFailure, WarmReport};
use cloudpos_store::{
    LastSync, LocalStore, Outbox, OutboxEntry, StorageResult, SyncMetaStore, apply_remote,
    local_updated_at,
};
use cloudpos_types::{EntityType, OutboxOp, RemoteRow, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Entity types pulled on every run, in order.
    pub tracked: Vec<EntityType>,
    /// Timeout for each remote call (ms).
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tracked: EntityType::ALL.to_vec(),
            timeout_ms: 30_000,
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Merges remote rows into one table inside a single transaction.
/// Returns the number of rows written.
///
/// A remote row that wins also discards the row's queued local edits it
/// outranks; pushing them later would overwrite the newer remote version.
fn merge_snapshot(store: &LocalStore, rows: &[RemoteRow]) -> StorageResult<usize> {
    store.transaction(|tx| {
        let mut written = 0;
        for row in rows {
            let local = local_updated_at(tx, row.entity_type(), row.id)?;
            match conflict::decide(row.updated_at, local) {
                MergeDecision::ApplyRemote => {
                    apply_remote(tx, row)?;
                    if let Some(remote_at) = row.updated_at {
                        Outbox::supersede(tx, row.entity_type(), row.id, remote_at)?;
                    }
                    written += 1;
                }
                MergeDecision::KeepLocal => {
                    trace!("Keeping local {} {}", row.entity_type(), row.id);
                }
            }
        }
        Ok(written)
    })
}

/// Offline-first synchronizer between the local store and a remote gateway.
pub struct SyncEngine {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    config: SyncConfig,
    /// Held for the duration of a sync or warm-up run.
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, config: SyncConfig) -> Self {
        Self {
            store,
            gateway,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs `f` on the blocking pool with a clone of the store handle.
    async fn blocking<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(LocalStore) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| SyncError::Internal(format!("storage task failed: {e}")))?
            .map_err(SyncError::from)
    }

    /// Awaits a gateway call, giving up after the configured timeout.
    async fn remote<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.config.timeout(), call)
            .await
            .map_err(|_| SyncError::Timeout)?
    }

    /// Pushes pending mutations, then pulls every tracked type.
    ///
    /// Per-entry and per-type failures are collected in the report; an `Err`
    /// means the run could not start (already running, unreadable outbox).
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        let _running = self.running.try_lock().map_err(|_| SyncError::AlreadyRunning)?;

        if let Err(e) = self.remote(self.gateway.ping()).await {
            info!("Skipping sync, {} unreachable: {}", self.gateway.name(), e);
            return Ok(SyncReport::network_unavailable());
        }

        let mut report = SyncReport::default();
        self.push(&mut report).await?;
        self.pull(&mut report).await;
        report.ok = report.errors.is_empty();

        let last = LastSync {
            at: Some(Timestamp::now()),
            pushed: report.pushed,
            pulled: report.pulled,
            error_count: report.errors.len(),
        };
        if let Err(e) = self
            .blocking(move |store| SyncMetaStore::new(store).record(&last))
            .await
        {
            warn!("Failed to record sync metadata: {}", e);
        }

        info!(
            "Sync finished: pushed={} pulled={} errors={}",
            report.pushed,
            report.pulled,
            report.errors.len()
        );
        Ok(report)
    }

    async fn push(&self, report: &mut SyncReport) -> SyncResult<()> {
        let entries = self.blocking(|store| Outbox::new(store).peek_all()).await?;
        if entries.is_empty() {
            debug!("Outbox empty, nothing to push");
            return Ok(());
        }

        let mut blocked: HashSet<EntityType> = HashSet::new();
        for entry in entries {
            if blocked.contains(&entry.entity_type) {
                continue;
            }
            if let Err(e) = self.push_entry(&entry).await {
                warn!(
                    "Push of {} {} (#{}) failed, holding back later {} entries: {}",
                    entry.op, entry.entity_type, entry.sequence_id, entry.entity_type, e
                );
                report.errors.push(format!(
                    "push {} {} {}: {}",
                    entry.op, entry.entity_type, entry.entity_id, e
                ));
                blocked.insert(entry.entity_type);
                continue;
            }
            report.pushed += 1;
        }
        Ok(())
    }

    /// Sends one entry and acknowledges it once the remote has accepted it.
    async fn push_entry(&self, entry: &OutboxEntry) -> SyncResult<()> {
        match entry.op {
            OutboxOp::Upsert => {
                self.remote(
                    self.gateway
                        .upsert(entry.entity_id, &entry.payload, entry.created_at),
                )
                .await?
            }
            OutboxOp::Delete => {
                self.remote(self.gateway.soft_delete(
                    entry.entity_type,
                    entry.entity_id,
                    entry.created_at,
                ))
                .await?
            }
        }

        let acked = entry.clone();
        self.blocking(move |store| Outbox::new(store).ack_pushed(&acked, Timestamp::now()))
            .await?;
        debug!(
            "Pushed {} {} {} (#{})",
            entry.op, entry.entity_type, entry.entity_id, entry.sequence_id
        );
        Ok(())
    }

    async fn pull(&self, report: &mut SyncReport) {
        for &entity_type in &self.config.tracked {
            match self.pull_type(entity_type).await {
                Ok(written) => {
                    debug!("Pulled {} {} rows", written, entity_type);
                    report.pulled += written;
                }
                Err(e) => {
                    warn!("Pull of {} failed: {}", entity_type.table(), e);
                    report
                        .errors
                        .push(format!("pull {}: {}", entity_type.table(), e));
                }
            }
        }
    }

    async fn pull_type(&self, entity_type: EntityType) -> SyncResult<usize> {
        let rows = self.remote(self.gateway.fetch_all(entity_type)).await?;
        if let Some(stray) = rows.iter().find(|row| row.entity_type() != entity_type) {
            return Err(SyncError::Decode(format!(
                "{} snapshot contains a {} row ({})",
                entity_type.table(),
                stray.entity_type(),
                stray.id
            )));
        }
        self.blocking(move |store| merge_snapshot(&store, &rows)).await
    }

    /// Pre-loads remote snapshots into the local cache.
    ///
    /// Best effort per type with the same merge rule as `sync()`. Failures are
    /// returned in the report and never affect the outbox or sync metadata.
    pub async fn warm_cache(&self) -> SyncResult<WarmReport> {
        let _running = self.running.try_lock().map_err(|_| SyncError::AlreadyRunning)?;

        let mut report = WarmReport::default();
        for &entity_type in &self.config.tracked {
            match self.pull_type(entity_type).await {
                Ok(written) => report.warmed += written,
                Err(e) => {
                    debug!("Warm-up of {} failed: {}", entity_type.table(), e);
                    report.failures.push(WarmFailure {
                        entity_type,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            "Cache warm-up: {} rows, {} failures",
            report.warmed,
            report.failures.len()
        );
        Ok(report)
    }

    /// Pending outbox counts and the last run's metadata.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        self.blocking(|store| {
            let pending_by_type = Outbox::new(store.clone()).pending_by_type()?;
            let last = SyncMetaStore::new(store).load()?;
            Ok(SyncStatus {
                pending: pending_by_type.values().sum(),
                pending_by_type,
                last_synced_at: last.at,
                last_error_count: last.error_count,
            })
        })
        .await
    }
}
