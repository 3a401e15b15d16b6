use cloudpos_cli::{
    CliConfig, DEFAULT_DB_FILE, ENV_ACCESS_TOKEN, ENV_API_KEY, ENV_URL, Workspace, resolve_db_path,
};
use cloudpos_sync::{RestGatewayConfig, SyncConfig};
use cloudpos_types::{CategoryFields, EntityType};
use cloudpos_vault::{AuthState, SessionUser};
use std::collections::HashMap;
use std::path::PathBuf;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

/// Config that never reaches a server: no access token means no session.
fn offline_config() -> CliConfig {
    CliConfig {
        gateway: RestGatewayConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
            ..Default::default()
        },
        sync: SyncConfig::default(),
    }
}

// ── Config loading ──────────────────────────────────────────────

#[test]
fn config_file_with_partial_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloudpos.json");
    std::fs::write(
        &path,
        r#"{
            "gateway": { "base_url": "https://shop.example", "api_key": "anon" },
            "sync": { "tracked": ["product"], "timeout_ms": 500 }
        }"#,
    )
    .unwrap();

    let config = CliConfig::from_file(&path).unwrap();
    assert_eq!(config.gateway.base_url, "https://shop.example");
    assert_eq!(config.gateway.api_key, "anon");
    assert_eq!(config.gateway.timeout_secs, 30);
    assert_eq!(config.sync.tracked, vec![EntityType::Product]);
    assert_eq!(config.sync.timeout_ms, 500);
}

#[test]
fn empty_config_file_is_all_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "{}").unwrap();
    assert_eq!(CliConfig::from_file(&path).unwrap(), CliConfig::default());
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CliConfig::from_file(&dir.path().join("nope.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = CliConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn env_overrides_gateway_settings() {
    let mut config = CliConfig::default();
    config.apply_env(env(&[
        (ENV_URL, "https://pos.example"),
        (ENV_API_KEY, "key-1"),
        (ENV_ACCESS_TOKEN, "token-1"),
    ]));
    assert_eq!(config.gateway.base_url, "https://pos.example");
    assert_eq!(config.gateway.api_key, "key-1");
    assert_eq!(config.gateway.access_token.as_deref(), Some("token-1"));
}

#[test]
fn empty_env_values_are_ignored() {
    let mut config = CliConfig::default();
    config.gateway.api_key = "from-file".to_string();
    config.apply_env(env(&[(ENV_API_KEY, "  "), (ENV_ACCESS_TOKEN, "")]));
    assert_eq!(config.gateway.api_key, "from-file");
    assert!(config.gateway.access_token.is_none());
}

#[test]
fn default_db_path() {
    assert_eq!(resolve_db_path(None), PathBuf::from(DEFAULT_DB_FILE));
    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/tmp/x.db"))),
        PathBuf::from("/tmp/x.db")
    );
}

// ── Workspace ───────────────────────────────────────────────────

#[test]
fn open_creates_and_migrates_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("shop.db");
    let workspace = Workspace::open(&db, offline_config()).unwrap();
    assert!(db.exists());
    assert_eq!(workspace.store().schema_version().unwrap(), 2);
}

#[test]
fn local_writes_queue_outbox_entries() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(&dir.path().join("shop.db"), offline_config()).unwrap();

    workspace.entities().create(CategoryFields::new("Bakery")).unwrap();
    let entries = workspace.outbox().peek_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_type, EntityType::Category);
}

#[tokio::test]
async fn sync_against_unreachable_remote_reports_network_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(&dir.path().join("shop.db"), offline_config()).unwrap();
    workspace.entities().create(CategoryFields::new("Bakery")).unwrap();

    let report = workspace.engine().unwrap().sync().await.unwrap();
    assert!(!report.ok);
    assert_eq!(report.errors, vec!["network unavailable".to_string()]);
    assert_eq!(workspace.outbox().len().unwrap(), 1);
}

#[tokio::test]
async fn provision_without_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(&dir.path().join("shop.db"), offline_config()).unwrap();
    let err = workspace.provision("1234").await.unwrap_err();
    assert!(err.to_string().contains("No remote session"));
    assert!(workspace.vault().profiles().unwrap().is_empty());
}

#[tokio::test]
async fn unlock_uses_provisioned_offline_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(&dir.path().join("shop.db"), offline_config()).unwrap();
    workspace
        .vault()
        .provision(
            &SessionUser {
                user_id: "cashier-1".to_string(),
                email: "cashier@shop.test".to_string(),
                role: "cashier".to_string(),
                full_name: Some("Casey".to_string()),
            },
            "4321",
        )
        .unwrap();

    match workspace.unlock("cashier@shop.test", "4321").await.unwrap() {
        AuthState::OfflineAuthenticated(principal) => {
            assert_eq!(principal.user_id, "cashier-1");
            assert_eq!(principal.role, "cashier");
        }
        other => panic!("expected offline sign-in, got {other:?}"),
    }

    assert!(workspace.unlock("cashier@shop.test", "0000").await.is_err());
}

#[tokio::test]
async fn unlock_without_credentials_on_device_fails() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(&dir.path().join("shop.db"), offline_config()).unwrap();
    assert!(workspace.unlock("nobody@shop.test", "1234").await.is_err());
}
