use crate::error::{VaultError, VaultResult};
use crate::gate::SessionUser;
use cloudpos_store::rusqlite::types::Type;
use cloudpos_store::rusqlite::{self, Row, params};
use cloudpos_store::{LocalStore, StorageError};
use cloudpos_types::{DeviceId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Shortest accepted PIN, in characters.
pub const MIN_PIN_LEN: usize = 4;
/// Longest accepted PIN, in characters.
pub const MAX_PIN_LEN: usize = 12;

/// A provisioned identity as stored on the device. The PIN digest never
/// leaves the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineProfile {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
    pub device_id: DeviceId,
    pub last_login_at: Timestamp,
}

/// Identity returned by a successful offline unlock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflinePrincipal {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
    pub device_id: DeviceId,
}

/// Stored PIN verifiers keyed by user id.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    store: LocalStore,
}

const SELECT_PROFILE: &str =
    "SELECT user_id, email, role, full_name, device_id, last_login_at, pin_hash FROM local_profile";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<(OfflineProfile, String)> {
    let device_id: String = row.get(4)?;
    let device_id = device_id.parse::<DeviceId>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
    })?;
    let last_login: String = row.get(5)?;
    let last_login_at = last_login.parse::<Timestamp>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
    })?;
    Ok((
        OfflineProfile {
            user_id: row.get(0)?,
            email: row.get(1)?,
            role: row.get(2)?,
            full_name: row.get(3)?,
            device_id,
            last_login_at,
        },
        row.get(6)?,
    ))
}

/// Hex SHA-256 of `"{user_id}:{pin}"`.
fn pin_digest(user_id: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two strings without short-circuiting on the first mismatch.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn validate_pin(pin: &str) -> VaultResult<()> {
    let len = pin.chars().count();
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&len) {
        return Err(VaultError::InvalidPin(format!(
            "must be {MIN_PIN_LEN} to {MAX_PIN_LEN} characters, got {len}"
        )));
    }
    if pin.chars().any(char::is_whitespace) {
        return Err(VaultError::InvalidPin("must not contain whitespace".into()));
    }
    Ok(())
}

impl CredentialVault {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Stores (or replaces) the offline verifier for `identity`.
    ///
    /// Every call assigns a fresh device id.
    pub fn provision(&self, identity: &SessionUser, pin: &str) -> VaultResult<OfflineProfile> {
        validate_pin(pin)?;
        if identity.user_id.trim().is_empty() {
            return Err(StorageError::InvalidData("user id must not be empty".into()).into());
        }

        let profile = OfflineProfile {
            user_id: identity.user_id.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            full_name: identity.full_name.clone(),
            device_id: DeviceId::new(),
            last_login_at: Timestamp::now(),
        };
        let digest = pin_digest(&profile.user_id, pin);

        self.store.execute(
            "INSERT OR REPLACE INTO local_profile
                (user_id, email, role, full_name, device_id, pin_hash, last_login_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                profile.user_id,
                profile.email,
                profile.role,
                profile.full_name,
                profile.device_id.to_string(),
                digest,
                profile.last_login_at.to_rfc3339()
            ],
        )?;
        info!(
            "Provisioned offline access for {} on device {}",
            profile.email, profile.device_id
        );
        Ok(profile)
    }

    /// Checks a PIN against the profile found by email or user id.
    ///
    /// An email match is preferred over a user id match. The stored record
    /// is never modified.
    pub fn verify(&self, identifier: &str, pin: &str) -> VaultResult<OfflinePrincipal> {
        let identifier = identifier.trim();
        let (profile, stored_digest) = self
            .lookup(identifier)?
            .ok_or(VaultError::NotProvisioned)?;

        let digest = pin_digest(&profile.user_id, pin);
        if !constant_time_eq(&digest, &stored_digest) {
            debug!("Offline unlock rejected for {}", profile.user_id);
            return Err(VaultError::InvalidCredential);
        }

        debug!("Offline unlock accepted for {}", profile.user_id);
        Ok(OfflinePrincipal {
            user_id: profile.user_id,
            email: profile.email,
            role: profile.role,
            full_name: profile.full_name,
            device_id: profile.device_id,
        })
    }

    /// The stored profile for `user_id`, if any.
    pub fn profile(&self, user_id: &str) -> VaultResult<Option<OfflineProfile>> {
        let rows = self.store.query_map(
            &format!("{SELECT_PROFILE} WHERE user_id = ?1"),
            [user_id],
            profile_from_row,
        )?;
        Ok(rows.into_iter().next().map(|(profile, _)| profile))
    }

    /// Every provisioned profile, most recent login first.
    pub fn profiles(&self) -> VaultResult<Vec<OfflineProfile>> {
        let rows = self.store.query_map(
            &format!("{SELECT_PROFILE} ORDER BY last_login_at DESC"),
            [],
            profile_from_row,
        )?;
        Ok(rows.into_iter().map(|(profile, _)| profile).collect())
    }

    /// Removes the profile for `user_id`. Returns whether one existed.
    pub fn forget(&self, user_id: &str) -> VaultResult<bool> {
        let removed = self
            .store
            .execute("DELETE FROM local_profile WHERE user_id = ?1", [user_id])?;
        if removed > 0 {
            info!("Removed offline access for {}", user_id);
        }
        Ok(removed > 0)
    }

    fn lookup(&self, identifier: &str) -> VaultResult<Option<(OfflineProfile, String)>> {
        let rows = self.store.query_map(
            &format!(
                "{SELECT_PROFILE} WHERE email = ?1 OR user_id = ?1
                 ORDER BY (email = ?1) DESC, last_login_at DESC LIMIT 1"
            ),
            [identifier],
            profile_from_row,
        )?;
        Ok(rows.into_iter().next())
    }
}
