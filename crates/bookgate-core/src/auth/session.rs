use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::storage::{DurableStorage, MemoryStorage};

/// Storage key holding the raw credential string
pub const TOKEN_KEY: &str = "token";

/// Storage key holding the JSON-serialized identity
pub const IDENTITY_KEY: &str = "user_info";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("credential is empty or cannot be carried in an Authorization header")]
pub struct InvalidCredential;

/// Opaque bearer token issued by the authentication endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    header: HeaderValue,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Result<Self, InvalidCredential> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(InvalidCredential);
        }
        let mut header =
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| InvalidCredential)?;
        header.set_sensitive(true);
        Ok(Self { token, header })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The value of the `Authorization` header carrying this credential
    pub fn bearer_header(&self) -> HeaderValue {
        self.header.clone()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Coarse-grained authorization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Role {
    #[serde(rename = "USER", alias = "MEMBER")]
    Member,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" | "MEMBER" => Ok(Role::Member),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Profile of the authenticated user, as returned by the identity endpoint.
///
/// Identities are replaced wholesale on every fetch; the store never patches
/// individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    #[serde(alias = "name")]
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            email: None,
            id: None,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    credential: Option<Credential>,
    identity: Option<Identity>,
}

/// Point-in-time copy of the session, safe to hold across awaits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    credential: Option<Credential>,
    identity: Option<Identity>,
}

impl SessionSnapshot {
    /// A snapshot with no credential and no identity
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A snapshot holding a credential and, optionally, its identity.
    pub fn authenticated(credential: Credential, identity: Option<Identity>) -> Self {
        Self {
            credential: Some(credential),
            identity,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Exact role match; there is no role hierarchy.
    pub fn has_role(&self, role: Role) -> bool {
        self.identity.as_ref().map(|i| i.role == role).unwrap_or(false)
    }
}

struct SessionCell {
    state: RwLock<Session>,
    storage: Arc<dyn DurableStorage>,
}

/// Shared handle to the one session of the process.
///
/// Anyone may read; only the session store and the request pipeline (both in
/// this crate) may write. Every write is mirrored to durable storage, and a
/// failed mirror write is logged and otherwise ignored.
#[derive(Clone)]
pub struct SessionHandle {
    cell: Arc<SessionCell>,
}

impl SessionHandle {
    /// Build the session from whatever durable storage holds.
    pub fn hydrate(storage: Arc<dyn DurableStorage>) -> Self {
        let credential = storage.get(TOKEN_KEY).and_then(|raw| match Credential::new(raw) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "Discarding stored credential");
                if let Err(e) = storage.remove(TOKEN_KEY) {
                    warn!(error = %e, "Failed to remove unusable credential");
                }
                None
            }
        });

        let identity = match (&credential, storage.get(IDENTITY_KEY)) {
            (Some(_), Some(raw)) => match serde_json::from_str::<Identity>(&raw) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable stored identity");
                    None
                }
            },
            (None, Some(_)) => {
                debug!("Removing stored identity without a credential");
                if let Err(e) = storage.remove(IDENTITY_KEY) {
                    warn!(error = %e, "Failed to remove stale identity");
                }
                None
            }
            (_, None) => None,
        };

        debug!(
            authenticated = credential.is_some(),
            has_identity = identity.is_some(),
            "Session hydrated"
        );

        Self {
            cell: Arc::new(SessionCell {
                state: RwLock::new(Session {
                    credential,
                    identity,
                }),
                storage,
            }),
        }
    }

    /// An empty session backed by process memory only.
    pub fn in_memory() -> Self {
        Self::hydrate(Arc::new(MemoryStorage::new()))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            credential: state.credential.clone(),
            identity: state.identity.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().credential.is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.read().identity.as_ref().map(|i| i.role == role).unwrap_or(false)
    }

    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    /// Replace the credential. Any previous identity belonged to the old
    /// credential and is dropped with it.
    pub(crate) fn install_credential(&self, credential: Credential) {
        let mut state = self.write();
        self.mirror_set(TOKEN_KEY, credential.as_str());
        self.mirror_remove(IDENTITY_KEY);
        state.credential = Some(credential);
        state.identity = None;
    }

    /// Store `identity` only if `expected` is still the session's credential.
    /// Returns false when the session moved on and the identity was discarded.
    pub(crate) fn install_identity(&self, expected: &Credential, identity: Identity) -> bool {
        let mut state = self.write();
        if state.credential.as_ref() != Some(expected) {
            return false;
        }
        match serde_json::to_string(&identity) {
            Ok(json) => self.mirror_set(IDENTITY_KEY, &json),
            Err(e) => warn!(error = %e, "Failed to serialize identity"),
        }
        state.identity = Some(identity);
        true
    }

    /// Drop credential, identity and their durable copies.
    pub(crate) fn clear(&self) {
        let mut state = self.write();
        Self::clear_locked(&mut state, self);
    }

    /// Clear the session if its credential is still `expected` (absent
    /// included). Returns false if a different credential has been installed
    /// since, in which case nothing changes.
    pub(crate) fn clear_if_current(&self, expected: Option<&Credential>) -> bool {
        let mut state = self.write();
        if state.credential.as_ref() != expected {
            return false;
        }
        Self::clear_locked(&mut state, self);
        true
    }

    fn clear_locked(state: &mut Session, handle: &SessionHandle) {
        state.credential = None;
        state.identity = None;
        handle.mirror_remove(TOKEN_KEY);
        handle.mirror_remove(IDENTITY_KEY);
    }

    fn mirror_set(&self, key: &str, value: &str) {
        if let Err(e) = self.cell.storage.set(key, value) {
            warn!(key, error = %e, "Failed to write session to durable storage");
        }
    }

    fn mirror_remove(&self, key: &str) {
        if let Err(e) = self.cell.storage.remove(key) {
            warn!(key, error = %e, "Failed to remove session key from durable storage");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.cell.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.cell.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &*self.read())
            .finish()
    }
}
