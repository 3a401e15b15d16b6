//! Rows as the remote store reports them.

use serde::{Deserialize, Serialize};

use crate::{EntityId, EntityType, OutboxPayload, Result, Timestamp};

/// One row of a remote snapshot, live or tombstoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: EntityId,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Last modification time according to the remote store. A row without
    /// one can never win a merge.
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub is_deleted: bool,
    pub payload: OutboxPayload,
}

impl RemoteRow {
    /// The entity type of the row.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.payload.entity_type()
    }

    /// Decodes a flat JSON object as served by a PostgREST table endpoint:
    /// `id`, `created_at`, `updated_at`, `is_deleted` next to the domain columns.
    pub fn from_json(entity_type: EntityType, value: serde_json::Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            id: EntityId,
            #[serde(default)]
            created_at: Option<Timestamp>,
            #[serde(default)]
            updated_at: Option<Timestamp>,
            #[serde(default)]
            is_deleted: Option<bool>,
        }

        let envelope: Envelope = serde_json::from_value(value.clone())?;
        let payload = OutboxPayload::from_fields_json(entity_type, value)?;
        Ok(Self {
            id: envelope.id,
            created_at: envelope.created_at,
            updated_at: envelope.updated_at,
            is_deleted: envelope.is_deleted.unwrap_or(false),
            payload,
        })
    }
}
