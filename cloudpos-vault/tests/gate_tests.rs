use async_trait::async_trait;
use cloudpos_store::LocalStore;
use cloudpos_vault::{
    AuthGate, AuthState, CredentialVault, OfflineCredentials, SessionError, SessionProvider,
    SessionUser, VaultError,
};
use std::sync::{Arc, Mutex};

/// Session provider whose answer can be changed between calls.
struct ScriptedSessions {
    answer: Mutex<Result<Option<SessionUser>, SessionError>>,
}

impl ScriptedSessions {
    fn new(answer: Result<Option<SessionUser>, SessionError>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer),
        })
    }

    fn set(&self, answer: Result<Option<SessionUser>, SessionError>) {
        *self.answer.lock().unwrap() = answer;
    }
}

#[async_trait]
impl SessionProvider for ScriptedSessions {
    async fn current_session(&self) -> Result<Option<SessionUser>, SessionError> {
        self.answer.lock().unwrap().clone()
    }
}

fn manager() -> SessionUser {
    SessionUser {
        user_id: "user-1".into(),
        email: "manager@shop.test".into(),
        role: "manager".into(),
        full_name: Some("Morgan Manager".into()),
    }
}

fn gate(sessions: Arc<ScriptedSessions>) -> AuthGate {
    AuthGate::new(sessions, CredentialVault::new(LocalStore::open_in_memory().unwrap()))
}

fn offline() -> Result<Option<SessionUser>, SessionError> {
    Err(SessionError::Unreachable("connection refused".into()))
}

// ── Online ───────────────────────────────────────────────────────

#[tokio::test]
async fn valid_session_goes_online() {
    let mut gate = gate(ScriptedSessions::new(Ok(Some(manager()))));
    let state = gate.resolve(None).await.unwrap();
    assert_eq!(state, &AuthState::OnlineAuthenticated(manager()));
    assert_eq!(gate.state().role(), Some("manager"));
}

#[tokio::test]
async fn no_session_and_no_credentials_stays_unauthenticated() {
    let mut gate = gate(ScriptedSessions::new(Ok(None)));
    assert_eq!(gate.resolve(None).await.unwrap(), &AuthState::Unauthenticated);
}

// ── Offline fallback ─────────────────────────────────────────────

#[tokio::test]
async fn unreachable_falls_back_to_vault() {
    let mut gate = gate(ScriptedSessions::new(offline()));
    gate.vault().provision(&manager(), "1357").unwrap();

    let creds = OfflineCredentials::new("manager@shop.test", "1357");
    let state = gate.resolve(Some(&creds)).await.unwrap().clone();
    match state {
        AuthState::OfflineAuthenticated(principal) => {
            assert_eq!(principal.role, "manager");
            assert_eq!(principal.full_name.as_deref(), Some("Morgan Manager"));
        }
        other => panic!("expected offline state, got {other:?}"),
    }
    assert!(gate.state().is_offline());
}

#[tokio::test]
async fn wrong_pin_stays_unauthenticated() {
    let mut gate = gate(ScriptedSessions::new(offline()));
    gate.vault().provision(&manager(), "1357").unwrap();

    let creds = OfflineCredentials::new("manager@shop.test", "0000");
    let err = gate.resolve(Some(&creds)).await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidCredential));
    assert_eq!(gate.state(), &AuthState::Unauthenticated);
}

#[tokio::test]
async fn unprovisioned_device_reports_not_provisioned() {
    let mut gate = gate(ScriptedSessions::new(Ok(None)));
    let creds = OfflineCredentials::new("manager@shop.test", "1357");
    assert!(matches!(
        gate.resolve(Some(&creds)).await,
        Err(VaultError::NotProvisioned)
    ));
}

#[tokio::test]
async fn offline_session_is_not_upgraded_automatically() {
    let sessions = ScriptedSessions::new(offline());
    let mut gate = gate(sessions.clone());
    gate.vault().provision(&manager(), "1357").unwrap();
    let creds = OfflineCredentials::new("user-1", "1357");
    gate.resolve(Some(&creds)).await.unwrap();

    sessions.set(Ok(Some(manager())));
    assert!(gate.resolve(None).await.unwrap().is_offline());
}

// ── Explicit login / sign out ────────────────────────────────────

#[tokio::test]
async fn login_online_with_pin_provisions_vault() {
    let mut gate = gate(ScriptedSessions::new(Ok(None)));
    let profile = gate.login_online(manager(), Some("2468")).await.unwrap();
    assert!(profile.is_some());
    assert_eq!(gate.state(), &AuthState::OnlineAuthenticated(manager()));
    assert!(gate.vault().verify("manager@shop.test", "2468").is_ok());
}

#[tokio::test]
async fn login_online_with_bad_pin_keeps_state() {
    let mut gate = gate(ScriptedSessions::new(Ok(None)));
    let err = gate.login_online(manager(), Some("12")).await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidPin(_)));
    assert_eq!(gate.state(), &AuthState::Unauthenticated);
}

#[tokio::test]
async fn sign_out_returns_to_unauthenticated() {
    let mut gate = gate(ScriptedSessions::new(Ok(Some(manager()))));
    gate.resolve(None).await.unwrap();
    gate.sign_out();
    assert_eq!(gate.state(), &AuthState::Unauthenticated);
    assert_eq!(gate.state().user_id(), None);
}
