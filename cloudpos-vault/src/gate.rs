//! Authentication state machine with offline fallback.

use crate::error::{SessionError, VaultError, VaultResult};
use crate::vault::{CredentialVault, OfflinePrincipal, OfflineProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A user as reported by the remote identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Source of the current remote session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The signed-in user, or `None` when there is no valid session.
    async fn current_session(&self) -> Result<Option<SessionUser>, SessionError>;
}

/// Identifier (email or user id) and PIN typed at the lock screen.
#[derive(Debug, Clone)]
pub struct OfflineCredentials {
    pub identifier: String,
    pub pin: String,
}

impl OfflineCredentials {
    pub fn new(identifier: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            pin: pin.into(),
        }
    }
}

/// Who is using the terminal, and how they were authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "mode", content = "principal", rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Unauthenticated,
    OnlineAuthenticated(SessionUser),
    OfflineAuthenticated(OfflinePrincipal),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, AuthState::Unauthenticated)
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, AuthState::OfflineAuthenticated(_))
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::Unauthenticated => None,
            AuthState::OnlineAuthenticated(user) => Some(&user.user_id),
            AuthState::OfflineAuthenticated(principal) => Some(&principal.user_id),
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            AuthState::Unauthenticated => None,
            AuthState::OnlineAuthenticated(user) => Some(&user.role),
            AuthState::OfflineAuthenticated(principal) => Some(&principal.role),
        }
    }
}

/// Decides between a live session and the offline vault.
///
/// Once authenticated the state only changes through [`AuthGate::sign_out`]
/// or an explicit [`AuthGate::login_online`]; an offline session is not
/// silently upgraded when connectivity comes back.
pub struct AuthGate {
    sessions: Arc<dyn SessionProvider>,
    vault: CredentialVault,
    state: AuthState,
}

impl AuthGate {
    pub fn new(sessions: Arc<dyn SessionProvider>, vault: CredentialVault) -> Self {
        Self {
            sessions,
            vault,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Establishes who is signed in.
    ///
    /// Tries the remote session first. If there is none, or the identity
    /// service is unreachable, falls back to verifying `offline` against the
    /// vault. A vault failure is returned and the gate stays unauthenticated.
    pub async fn resolve(&mut self, offline: Option<&OfflineCredentials>) -> VaultResult<&AuthState> {
        if self.state.is_authenticated() {
            return Ok(&self.state);
        }

        match self.sessions.current_session().await {
            Ok(Some(user)) => {
                info!("Online session for {}", user.email);
                self.state = AuthState::OnlineAuthenticated(user);
                return Ok(&self.state);
            }
            Ok(None) => debug!("No remote session"),
            Err(e) => warn!("Session lookup failed, trying offline unlock: {}", e),
        }

        let Some(credentials) = offline else {
            return Ok(&self.state);
        };

        let vault = self.vault.clone();
        let identifier = credentials.identifier.clone();
        let pin = credentials.pin.clone();
        let principal = tokio::task::spawn_blocking(move || vault.verify(&identifier, &pin))
            .await
            .map_err(|e| VaultError::Internal(format!("unlock task failed: {e}")))??;

        info!("Offline session for {}", principal.email);
        self.state = AuthState::OfflineAuthenticated(principal);
        Ok(&self.state)
    }

    /// Records a fresh online login. With a PIN the device is provisioned for
    /// later offline use first; if that fails the state is left unchanged.
    pub async fn login_online(
        &mut self,
        user: SessionUser,
        pin: Option<&str>,
    ) -> VaultResult<Option<OfflineProfile>> {
        let profile = match pin {
            Some(pin) => {
                let vault = self.vault.clone();
                let identity = user.clone();
                let pin = pin.to_owned();
                let profile = tokio::task::spawn_blocking(move || vault.provision(&identity, &pin))
                    .await
                    .map_err(|e| VaultError::Internal(format!("provision task failed: {e}")))??;
                Some(profile)
            }
            None => None,
        };

        info!("Online login for {}", user.email);
        self.state = AuthState::OnlineAuthenticated(user);
        Ok(profile)
    }

    pub fn sign_out(&mut self) {
        if let Some(user_id) = self.state.user_id() {
            info!("Signed out {}", user_id);
        }
        self.state = AuthState::Unauthenticated;
    }
}
