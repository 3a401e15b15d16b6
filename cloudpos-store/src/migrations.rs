//! Versioned schema migrations.
//!
//! The schema version lives in SQLite's `user_version` header field. Pending
//! migrations run in a single transaction together with the version bump, so
//! a failure anywhere leaves both the schema and the version untouched.

use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{info, warn};

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// The schema, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE categories (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                local_updated_at TEXT NOT NULL,
                remote_updated_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1))
            );

            CREATE TABLE products (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                price REAL NOT NULL CHECK (price >= 0),
                stock_quantity INTEGER NOT NULL DEFAULT 0 CHECK (stock_quantity >= 0),
                category_id TEXT,
                barcode TEXT,
                sku TEXT,
                production_date TEXT,
                expiration_date TEXT,
                created_at TEXT NOT NULL,
                local_updated_at TEXT NOT NULL,
                remote_updated_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1))
            );

            CREATE TABLE customers (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                email TEXT,
                address TEXT,
                total_debt REAL NOT NULL DEFAULT 0 CHECK (total_debt >= 0),
                created_at TEXT NOT NULL,
                local_updated_at TEXT NOT NULL,
                remote_updated_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1))
            );

            CREATE TABLE outbox (
                sequence_id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                op TEXT NOT NULL CHECK (op IN ('upsert', 'delete')),
                entity_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_outbox_entity_type ON outbox(entity_type, sequence_id);

            CREATE TABLE local_profile (
                user_id TEXT PRIMARY KEY NOT NULL,
                email TEXT NOT NULL,
                role TEXT NOT NULL,
                full_name TEXT,
                device_id TEXT NOT NULL,
                pin_hash TEXT NOT NULL,
                last_login_at TEXT NOT NULL
            );
            CREATE INDEX idx_local_profile_email ON local_profile(email);
        "#,
    },
    Migration {
        version: 2,
        name: "sync_meta_and_name_indexes",
        sql: r#"
            CREATE TABLE sync_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_synced_at TEXT,
                last_pushed INTEGER NOT NULL DEFAULT 0,
                last_pulled INTEGER NOT NULL DEFAULT 0,
                last_error_count INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO sync_meta (id) VALUES (1);

            CREATE INDEX idx_categories_name ON categories(name) WHERE is_deleted = 0;
            CREATE INDEX idx_products_name ON products(name) WHERE is_deleted = 0;
            CREATE INDEX idx_customers_name ON customers(name) WHERE is_deleted = 0;
        "#,
    },
];

/// Reads the persisted schema version.
pub(crate) fn read_version(conn: &Connection) -> StorageResult<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Applies every migration newer than the persisted version.
pub(crate) fn run(conn: &mut Connection, migrations: &[Migration]) -> StorageResult<MigrationReport> {
    if let Some(pair) = migrations.windows(2).find(|w| w[1].version <= w[0].version) {
        return Err(StorageError::Migration {
            version: pair[1].version,
            reason: format!("out of order after version {}", pair[0].version),
        });
    }

    let from_version = read_version(conn)?;
    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| m.version > from_version)
        .collect();

    let Some(last) = pending.last() else {
        return Ok(MigrationReport {
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        });
    };
    let to_version = last.version;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for migration in &pending {
        if let Err(e) = tx.execute_batch(migration.sql) {
            warn!(
                "Migration {} ({}) failed, rolling back: {}",
                migration.version, migration.name, e
            );
            return Err(StorageError::Migration {
                version: migration.version,
                reason: e.to_string(),
            });
        }
    }
    tx.pragma_update(None, "user_version", to_version)
        .map_err(|e| StorageError::Migration {
            version: to_version,
            reason: e.to_string(),
        })?;
    tx.commit()?;

    let applied: Vec<&'static str> = pending.iter().map(|m| m.name).collect();
    info!(
        "Migrated schema v{} -> v{} ({})",
        from_version,
        to_version,
        applied.join(", ")
    );
    Ok(MigrationReport {
        from_version,
        to_version,
        applied,
    })
}
