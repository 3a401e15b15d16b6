//! PostgREST gateway.
//!
//! Talks to a Supabase-style backend: table rows under `/rest/v1/{table}` and
//! the signed-in user under `/auth/v1/user`.

use super::RemoteGateway;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use cloudpos_types::{EntityId, EntityType, OutboxPayload, RemoteRow, Timestamp};
use cloudpos_vault::{SessionError, SessionProvider, SessionUser};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Role assumed when the user has no profile row.
const DEFAULT_ROLE: &str = "user";

/// Connection settings for [`RestGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestGatewayConfig {
    /// Project URL (e.g. `https://abc.supabase.co`).
    pub base_url: String,
    /// Public API key sent as `apikey`.
    pub api_key: String,
    /// User access token. Falls back to the API key when absent.
    pub access_token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RestGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            access_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

/// HTTP client for a PostgREST backend.
pub struct RestGateway {
    config: RestGatewayConfig,
    client: Client,
}

impl RestGateway {
    pub fn new(config: RestGatewayConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RestGatewayConfig {
        &self.config
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn table_url(&self, entity_type: EntityType) -> String {
        format!("{}/rest/v1/{}", self.base(), entity_type.table())
    }

    fn bearer(&self) -> &str {
        self.config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer())
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> SyncResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("{what} failed: {e}")))?;
        check_status(response, what).await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, SessionError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/rest/v1/profiles", self.base()))
                    .query(&[("id", format!("eq.{user_id}")), ("select", "role,full_name".into())]),
            )
            .send()
            .await
            .map_err(|e| SessionError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Failed(format!(
                "profile lookup returned {}",
                response.status()
            )));
        }
        let rows: Vec<ProfileRow> = response
            .json()
            .await
            .map_err(|e| SessionError::Failed(format!("failed to parse profile: {e}")))?;
        Ok(rows.into_iter().next())
    }
}

/// Maps non-success statuses onto [`SyncError`].
async fn check_status(response: Response, what: &str) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::CONFLICT => SyncError::Conflict(format!("{what}: {body}")),
        s if s.is_client_error() => SyncError::RemoteRejected {
            status: s.as_u16(),
            message: format!("{what}: {body}"),
        },
        s => SyncError::Network(format!("{what} returned {s}: {body}")),
    })
}

#[async_trait]
impl RemoteGateway for RestGateway {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    async fn ping(&self) -> SyncResult<()> {
        let response = self
            .authorized(self.client.get(format!("{}/rest/v1/", self.base())))
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("ping failed: {e}")))?;
        if response.status().is_server_error() {
            return Err(SyncError::Network(format!(
                "ping returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch_all(&self, entity_type: EntityType) -> SyncResult<Vec<RemoteRow>> {
        let response = self
            .send(
                self.client
                    .get(self.table_url(entity_type))
                    .query(&[("select", "*")]),
                &format!("fetch {}", entity_type.table()),
            )
            .await?;
        let values: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| SyncError::Decode(format!("{}: {e}", entity_type.table())))?;

        let rows = values
            .into_iter()
            .map(|value| RemoteRow::from_json(entity_type, value))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Fetched {} {} rows", rows.len(), entity_type);
        Ok(rows)
    }

    async fn upsert(
        &self,
        entity_id: EntityId,
        payload: &OutboxPayload,
        updated_at: Timestamp,
    ) -> SyncResult<()> {
        let entity_type = payload.entity_type();
        let mut body = payload.fields_json()?;
        body.insert("id".into(), serde_json::json!(entity_id));
        body.insert("updated_at".into(), serde_json::json!(updated_at));
        body.insert("is_deleted".into(), serde_json::Value::Bool(false));

        self.send(
            self.client
                .post(self.table_url(entity_type))
                .query(&[("on_conflict", "id")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&body),
            &format!("upsert {entity_type} {entity_id}"),
        )
        .await?;
        Ok(())
    }

    async fn soft_delete(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        deleted_at: Timestamp,
    ) -> SyncResult<()> {
        self.send(
            self.client
                .patch(self.table_url(entity_type))
                .query(&[("id", format!("eq.{entity_id}"))])
                .header("Prefer", "return=minimal")
                .json(&serde_json::json!({
                    "is_deleted": true,
                    "updated_at": deleted_at,
                })),
            &format!("delete {entity_type} {entity_id}"),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for RestGateway {
    async fn current_session(&self) -> Result<Option<SessionUser>, SessionError> {
        if self.config.access_token.is_none() {
            return Ok(None);
        }

        let response = self
            .authorized(self.client.get(format!("{}/auth/v1/user", self.base())))
            .send()
            .await
            .map_err(|e| SessionError::Unreachable(e.to_string()))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            s if !s.is_success() => {
                return Err(SessionError::Failed(format!("user lookup returned {s}")));
            }
            _ => {}
        }
        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| SessionError::Failed(format!("failed to parse user: {e}")))?;

        let profile = self.fetch_profile(&user.id).await?;
        let (role, full_name) = match profile {
            Some(p) => (p.role.unwrap_or_else(|| DEFAULT_ROLE.into()), p.full_name),
            None => (DEFAULT_ROLE.to_string(), None),
        };
        info!("Remote session active for {}", user.id);
        Ok(Some(SessionUser {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            role,
            full_name,
        }))
    }
}
