//! Offline credentials and authentication state for CloudPOS.
//!
//! After a successful online login the user can provision the device with a
//! PIN. The [`CredentialVault`] keeps a salted digest of that PIN next to the
//! user's identity, and the [`AuthGate`] falls back to it whenever no remote
//! session can be established.

mod error;
mod gate;
mod vault;

pub use error::{SessionError, VaultError, VaultResult};
pub use gate::{AuthGate, AuthState, OfflineCredentials, SessionProvider, SessionUser};
pub use vault::{CredentialVault, MAX_PIN_LEN, MIN_PIN_LEN, OfflinePrincipal, OfflineProfile};
