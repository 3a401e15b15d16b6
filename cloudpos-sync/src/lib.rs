//! Offline-first sync engine for CloudPOS.
//!
//! Local mutations are written to the store and queued in the outbox while
//! the terminal is offline. When the remote is reachable the engine drains
//! the outbox and then merges remote snapshots back into the local tables.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Gateway**: Abstracts the remote store (PostgREST over HTTP, or in memory)
//! - **Conflict**: The last-write-wins merge rule
//! - **Engine**: Orchestrates push, pull and cache warm-up
//!
//! ## Sync Process
//!
//! 1. **Ping**: Skip the run entirely when the remote is unreachable
//! 2. **Push**: Replay outbox entries in FIFO order per entity type
//! 3. **Pull**: Fetch each tracked table, tombstones included
//! 4. **Merge**: Apply rows whose remote timestamp is strictly newer
//!
//! # Example
//!
//! ```
//! use cloudpos_store::LocalStore;
//! use cloudpos_sync::{MemoryGateway, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! let store = LocalStore::open_in_memory().unwrap();
//! let engine = SyncEngine::new(store, Arc::new(MemoryGateway::new()), SyncConfig::default());
//! assert_eq!(engine.config().timeout_ms, 30_000);
//! ```

pub mod conflict;
mod engine;
mod error;
pub mod gateway;
mod report;

pub use conflict::{MergeDecision, remote_wins};
pub use engine::{SyncConfig, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use gateway::RemoteGateway;
pub use gateway::memory::{MemoryGateway, PushRecord, ScriptedFailure};
pub use gateway::rest::{RestGateway, RestGatewayConfig};
pub use report::{NETWORK_UNAVAILABLE, SyncReport, SyncStatus, WarmFailure, WarmReport};
