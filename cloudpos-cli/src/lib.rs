//! Shared plumbing for the `cloudpos` binary.
//!
//! Loads the JSON configuration (with environment overrides) and wires the
//! store, vault, gateway and sync engine together for a single database file.

use anyhow::{Context, Result, bail};
use cloudpos_store::{EntityStore, LocalStore, Outbox};
use cloudpos_sync::{RestGateway, RestGatewayConfig, SyncConfig, SyncEngine};
use cloudpos_vault::{AuthGate, AuthState, CredentialVault, OfflineCredentials, OfflineProfile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Overrides `gateway.base_url`.
pub const ENV_URL: &str = "CLOUDPOS_URL";
/// Overrides `gateway.api_key`.
pub const ENV_API_KEY: &str = "CLOUDPOS_API_KEY";
/// Overrides `gateway.access_token`.
pub const ENV_ACCESS_TOKEN: &str = "CLOUDPOS_ACCESS_TOKEN";

/// Database file used when `--db` is not given.
pub const DEFAULT_DB_FILE: &str = "cloudpos.db";

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub gateway: RestGatewayConfig,
    pub sync: SyncConfig,
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Reads `path` (or starts from defaults) and applies the process
    /// environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `CLOUDPOS_*` overrides. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_URL) {
            self.gateway.base_url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.gateway.api_key = key;
        }
        if let Some(token) = get(ENV_ACCESS_TOKEN) {
            self.gateway.access_token = Some(token);
        }
    }
}

/// An open database plus the configuration the commands run with.
pub struct Workspace {
    store: LocalStore,
    config: CliConfig,
}

impl Workspace {
    /// Opens (creating if needed) and migrates the database at `db`.
    pub fn open(db: &Path, config: CliConfig) -> Result<Self> {
        let store = LocalStore::open(db)
            .with_context(|| format!("Failed to open database {}", db.display()))?;
        debug!("Opened {}", db.display());
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    pub fn entities(&self) -> EntityStore {
        EntityStore::new(self.store.clone())
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.store.clone())
    }

    pub fn vault(&self) -> CredentialVault {
        CredentialVault::new(self.store.clone())
    }

    pub fn gateway(&self) -> Result<Arc<RestGateway>> {
        let gateway = RestGateway::new(self.config.gateway.clone())
            .context("Failed to build REST gateway")?;
        Ok(Arc::new(gateway))
    }

    pub fn engine(&self) -> Result<SyncEngine> {
        Ok(SyncEngine::new(
            self.store.clone(),
            self.gateway()?,
            self.config.sync.clone(),
        ))
    }

    pub fn auth_gate(&self) -> Result<AuthGate> {
        Ok(AuthGate::new(self.gateway()?, self.vault()))
    }

    /// Stores offline credentials for the user of the current remote session.
    pub async fn provision(&self, pin: &str) -> Result<OfflineProfile> {
        let mut gate = self.auth_gate()?;
        let user = match gate.resolve(None).await? {
            AuthState::OnlineAuthenticated(user) => user.clone(),
            _ => bail!("No remote session; set {ENV_ACCESS_TOKEN} and sign in online first"),
        };
        let profile = gate
            .login_online(user, Some(pin))
            .await
            .context("Failed to provision offline credentials")?;
        let Some(profile) = profile else {
            bail!("Provisioning returned no profile");
        };
        info!("Provisioned offline access for {}", profile.email);
        Ok(profile)
    }

    /// Signs in, online when a session exists, otherwise with the PIN.
    pub async fn unlock(&self, identifier: &str, pin: &str) -> Result<AuthState> {
        let mut gate = self.auth_gate()?;
        let credentials = OfflineCredentials::new(identifier, pin);
        let state = gate.resolve(Some(&credentials)).await?.clone();
        if !state.is_authenticated() {
            bail!("Not signed in");
        }
        Ok(state)
    }
}

/// `--db` if given, else `cloudpos.db` in the working directory.
pub fn resolve_db_path(db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}
