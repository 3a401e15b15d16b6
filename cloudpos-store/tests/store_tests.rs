use cloudpos_store::{LocalStore, MIGRATIONS, StorageError, StoreOpener};
use tempfile::TempDir;

fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap()
}

// ── Open and migrate ─────────────────────────────────────────────

#[test]
fn open_in_memory_is_fully_migrated() {
    let store = LocalStore::open_in_memory().unwrap();
    assert_eq!(store.schema_version().unwrap(), latest_version());
    assert!(store.path().is_none());
}

#[test]
fn open_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pos.db");
    let store = LocalStore::open(&path).unwrap();
    assert!(path.exists());
    assert_eq!(store.path(), Some(path.as_path()));
}

#[test]
fn migrate_twice_is_noop() {
    let store = LocalStore::open_in_memory().unwrap();
    let report = store.migrate().unwrap();
    assert!(report.is_noop());
    assert_eq!(report.from_version, latest_version());
    assert_eq!(report.to_version, latest_version());
}

#[test]
fn reopen_keeps_data_and_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pos.db");
    {
        let store = LocalStore::open(&path).unwrap();
        store
            .execute(
                "INSERT INTO categories (id, name, created_at, local_updated_at)
                 VALUES ('c1', 'Drinks', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();
    }
    let store = LocalStore::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), latest_version());
    let names = store
        .query_map("SELECT name FROM categories", [], |row| row.get::<_, String>(0))
        .unwrap();
    assert_eq!(names, vec!["Drinks".to_string()]);
}

#[test]
fn expected_tables_exist() {
    let store = LocalStore::open_in_memory().unwrap();
    let tables = store
        .query_map(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            [],
            |row| row.get::<_, String>(0),
        )
        .unwrap();
    assert_eq!(
        tables,
        vec!["categories", "customers", "local_profile", "outbox", "products", "sync_meta"]
    );
}

// ── Transactions ─────────────────────────────────────────────────

#[test]
fn transaction_commits_on_ok() {
    let store = LocalStore::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            tx.execute("UPDATE sync_meta SET last_pushed = 7 WHERE id = 1", [])?;
            Ok(())
        })
        .unwrap();
    let pushed = store
        .query_map("SELECT last_pushed FROM sync_meta", [], |row| row.get::<_, i64>(0))
        .unwrap();
    assert_eq!(pushed, vec![7]);
}

#[test]
fn transaction_rolls_back_on_err() {
    let store = LocalStore::open_in_memory().unwrap();
    let result: Result<(), _> = store.transaction(|tx| {
        tx.execute("UPDATE sync_meta SET last_pushed = 7 WHERE id = 1", [])?;
        Err(StorageError::InvalidData("abort".into()))
    });
    assert!(matches!(result, Err(StorageError::InvalidData(_))));
    let pushed = store
        .query_map("SELECT last_pushed FROM sync_meta", [], |row| row.get::<_, i64>(0))
        .unwrap();
    assert_eq!(pushed, vec![0]);
}

#[test]
fn check_constraint_maps_to_constraint_error() {
    let store = LocalStore::open_in_memory().unwrap();
    let err = store
        .execute(
            "INSERT INTO products (id, name, price, created_at, local_updated_at)
             VALUES ('p1', 'Bad', -1.0, 'x', 'x')",
            [],
        )
        .unwrap_err();
    assert!(matches!(err, StorageError::Constraint(_)));
}

#[test]
fn clones_share_one_connection() {
    let store = LocalStore::open_in_memory().unwrap();
    let clone = store.clone();
    assert!(store.same_handle(&clone));
    assert!(!store.same_handle(&LocalStore::open_in_memory().unwrap()));
}

// ── StoreOpener ──────────────────────────────────────────────────

#[test]
fn opener_is_lazy_and_returns_same_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pos.db");
    let opener = StoreOpener::new(&path);
    assert!(!opener.is_open().unwrap());
    assert!(!path.exists());

    let first = opener.open().unwrap();
    let second = opener.open().unwrap();
    assert!(opener.is_open().unwrap());
    assert!(first.same_handle(&second));
    assert_eq!(second.schema_version().unwrap(), latest_version());
}

#[test]
fn opener_shared_across_threads() {
    let dir = TempDir::new().unwrap();
    let opener = std::sync::Arc::new(StoreOpener::new(dir.path().join("pos.db")));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let opener = opener.clone();
            std::thread::spawn(move || opener.open().unwrap())
        })
        .collect();
    let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for store in &stores[1..] {
        assert!(stores[0].same_handle(store));
    }
}
