//! The local SQLite database handle.

use crate::error::{StorageError, StorageResult};
use crate::migrations::{self, MigrationReport};
use rusqlite::{Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Maps a result row onto a typed value.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Handle to the on-device database.
///
/// Cloning is cheap and every clone shares the same connection, so a single
/// handle can be injected into the outbox, the vault and the sync engine.
/// All writes are serialized through the connection mutex.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Opens (or creates) the database at `path` and applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened {} (journal_mode={})", path.display(), mode);

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        let report = store.migrate()?;
        info!(
            "Local store ready at {} (schema v{})",
            path.display(),
            report.to_version
        );
        Ok(store)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true if both handles share one connection.
    pub fn same_handle(&self, other: &LocalStore) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Applies every migration above the persisted schema version in one
    /// transaction. Running it again is a no-op.
    pub fn migrate(&self) -> StorageResult<MigrationReport> {
        let mut conn = self.lock()?;
        migrations::run(&mut conn, migrations::MIGRATIONS)
    }

    /// The persisted schema version.
    pub fn schema_version(&self) -> StorageResult<u32> {
        let conn = self.lock()?;
        migrations::read_version(&conn)
    }

    /// Executes one statement and returns the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> StorageResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(sql, params)?)
    }

    /// Executes several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        Ok(conn.execute_batch(sql)?)
    }

    /// Runs a query and maps every row through [`FromRow`].
    pub fn query<T: FromRow, P: Params>(&self, sql: &str, params: P) -> StorageResult<Vec<T>> {
        self.query_map(sql, params, T::from_row)
    }

    /// Runs a query and maps every row through `f`.
    pub fn query_map<T, P, F>(&self, sql: &str, params: P, f: F) -> StorageResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Runs a query expected to return at most one row.
    pub fn query_opt<T: FromRow, P: Params>(&self, sql: &str, params: P) -> StorageResult<Option<T>> {
        let conn = self.lock()?;
        Ok(conn.query_row(sql, params, T::from_row).optional()?)
    }

    /// Runs `f` inside an immediate transaction.
    ///
    /// Commits only when `f` returns `Ok`; any error (or panic) drops the
    /// transaction, which rolls every statement back.
    pub fn transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StorageResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Lazily opens one [`LocalStore`] and hands out clones of it.
///
/// Owned by the application and passed to whoever needs the database; every
/// `open()` after the first returns the same live handle.
#[derive(Debug)]
pub struct StoreOpener {
    path: PathBuf,
    handle: Mutex<Option<LocalStore>>,
}

impl StoreOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: Mutex::new(None),
        }
    }

    /// Returns the shared handle, opening and migrating the database on first use.
    pub fn open(&self) -> StorageResult<LocalStore> {
        let mut slot = self.handle.lock().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let store = LocalStore::open(&self.path)?;
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Whether the database has been opened yet.
    pub fn is_open(&self) -> StorageResult<bool> {
        let slot = self.handle.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(slot.is_some())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
