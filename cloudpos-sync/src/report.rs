//! Outcomes of sync, status and warm-up calls.

use cloudpos_types::{EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message recorded when the pre-flight ping fails.
pub const NETWORK_UNAVAILABLE: &str = "network unavailable";

/// Result of one `sync()` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// True when every push and pull step succeeded.
    pub ok: bool,
    /// Outbox entries acknowledged by the remote.
    pub pushed: usize,
    /// Remote rows written locally.
    pub pulled: usize,
    /// One message per failed step, in the order they happened.
    pub errors: Vec<String>,
}

impl SyncReport {
    /// The report for a run that could not reach the remote.
    pub fn network_unavailable() -> Self {
        Self {
            ok: false,
            pushed: 0,
            pulled: 0,
            errors: vec![NETWORK_UNAVAILABLE.to_string()],
        }
    }
}

/// Snapshot of pending work and the last run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub pending: usize,
    pub pending_by_type: BTreeMap<EntityType, usize>,
    pub last_synced_at: Option<Timestamp>,
    pub last_error_count: usize,
}

/// A cache warm-up step that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmFailure {
    pub entity_type: EntityType,
    pub error: String,
}

/// Result of `warm_cache()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Remote rows written locally.
    pub warmed: usize,
    pub failures: Vec<WarmFailure>,
}

impl WarmReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
