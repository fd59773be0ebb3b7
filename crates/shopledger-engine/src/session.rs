//! # Session Store
//!
//! Persistent session and identity cache over a pluggable key-value store,
//! plus the refresh protocol against an auth exchange.
//!
//! ## Fail-Closed Refresh
//!
//! `ensure_fresh` has exactly two outcomes: a verified-fresh session, or a
//! fully cleared one. Any failure along the refresh path - expired token,
//! revoked token, unreachable auth service, malformed stored state - clears
//! the session and reports invalid. A stale session is never left behind to
//! be mistaken for a live one.
//!
//! ## Concurrency
//!
//! The key-value store sits behind a sync mutex that is never held across an
//! await point. A separate async mutex serializes refresh attempts so
//! concurrent callers produce at most one network round-trip.

use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use shopledger_core::{validate_email, Capability, Identity, Role, Session, ValidationError};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Storage Keys
// =============================================================================

mod keys {
    pub const ACCESS_TOKEN: &str = "session.access_token";
    pub const REFRESH_TOKEN: &str = "session.refresh_token";
    pub const EXPIRES_AT: &str = "session.expires_at";
    pub const USER_ID: &str = "session.user_id";
    pub const USER_EMAIL: &str = "session.user_email";
    pub const USERNAME: &str = "identity.username";
    pub const ROLE: &str = "identity.role";
    pub const SHOP_ID: &str = "identity.shop_id";
    pub const SHOP_NAME: &str = "identity.shop_name";
    pub const PERMISSIONS: &str = "identity.permissions";
}

// =============================================================================
// Key-Value Store
// =============================================================================

/// Backing storage for session state. Implementations are plain synchronous
/// string maps; durability is their concern, not the session store's.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
    fn clear(&mut self);
}

/// In-memory store. The default for tests and for hosts without a durable
/// preference store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

// =============================================================================
// Auth Exchange
// =============================================================================

/// Token material returned by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds.
    pub expires_at: i64,
    pub user_id: String,
    pub user_email: String,
}

/// Failures from the auth exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Refresh token expired")]
    Expired,
    #[error("Refresh token revoked")]
    Revoked,
    #[error("Auth service unavailable: {0}")]
    Unavailable(String),
}

/// The remote credential/token exchange. The engine never inspects token
/// contents; it only trades them through this boundary.
pub trait AuthExchange {
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<SessionTokens, AuthError>> + Send;

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<SessionTokens, AuthError>> + Send;
}

// =============================================================================
// Session Store
// =============================================================================

/// Verdict of [`SessionStore::ensure_fresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The session is valid (possibly after a successful refresh).
    Valid,
    /// No usable session remains; the store has been cleared.
    Invalid,
}

/// Owner of all session and identity state.
pub struct SessionStore {
    kv: StdMutex<Box<dyn KeyValueStore>>,
    /// Serializes refresh attempts; concurrent `ensure_fresh` callers wait
    /// on the first one's outcome instead of racing the auth service.
    refresh_lock: AsyncMutex<()>,
}

impl SessionStore {
    /// Creates a session store over the given backing storage.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        SessionStore {
            kv: StdMutex::new(store),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    /// Creates a session store over a fresh in-memory map.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryKeyValueStore::new()))
    }

    fn with<R>(&self, f: impl FnOnce(&dyn KeyValueStore) -> R) -> R {
        let guard = self.kv.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(guard.as_ref())
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut dyn KeyValueStore) -> R) -> R {
        let mut guard = self.kv.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(guard.as_mut())
    }

    // =========================================================================
    // Session Fields
    // =========================================================================

    /// Persists a token set. Rejects material without a user id; a session
    /// that cannot be attributed is worse than no session.
    pub fn save_session(&self, tokens: &SessionTokens) -> EngineResult<()> {
        if tokens.user_id.trim().is_empty() {
            return Err(EngineError::Validation(ValidationError::Required {
                field: "user_id".to_string(),
            }));
        }

        self.with_mut(|kv| {
            kv.set(keys::ACCESS_TOKEN, &tokens.access_token);
            kv.set(keys::REFRESH_TOKEN, &tokens.refresh_token);
            kv.set(keys::EXPIRES_AT, &tokens.expires_at.to_string());
            kv.set(keys::USER_ID, &tokens.user_id);
            kv.set(keys::USER_EMAIL, &tokens.user_email);
        });
        debug!(user_id = %tokens.user_id, "Session saved");
        Ok(())
    }

    /// Reads the full session, or None when any field is absent or
    /// malformed. Partial state is treated as no session.
    pub fn session(&self) -> Option<Session> {
        self.with(|kv| {
            let expires_at: i64 = kv.get(keys::EXPIRES_AT)?.parse().ok()?;
            Some(Session {
                access_token: kv.get(keys::ACCESS_TOKEN)?,
                refresh_token: kv.get(keys::REFRESH_TOKEN)?,
                expires_at,
                user_id: kv.get(keys::USER_ID)?,
                user_email: kv.get(keys::USER_EMAIL)?,
            })
        })
    }

    /// True iff a complete session exists and its expiry is in the future.
    pub fn is_session_valid(&self) -> bool {
        match self.session() {
            Some(session) => session.is_valid_at(Utc::now().timestamp()),
            None => false,
        }
    }

    /// The stored refresh token, if any.
    pub fn refresh_token(&self) -> Option<String> {
        self.with(|kv| kv.get(keys::REFRESH_TOKEN))
    }

    /// Removes all session and identity fields.
    pub fn clear_session(&self) {
        self.with_mut(|kv| kv.clear());
        debug!("Session cleared");
    }

    // =========================================================================
    // Identity Fields
    // =========================================================================

    /// Caches the profile fields fetched after login.
    pub fn save_basic_info(&self, username: &str, role: Role) {
        self.with_mut(|kv| {
            kv.set(keys::USERNAME, username);
            kv.set(keys::ROLE, role.as_str());
        });
    }

    /// Caches the shop the user belongs to.
    pub fn save_shop(&self, shop_id: &str, shop_name: &str) {
        self.with_mut(|kv| {
            kv.set(keys::SHOP_ID, shop_id);
            kv.set(keys::SHOP_NAME, shop_name);
        });
    }

    /// Caches explicit capability overrides. `None` (role defaults apply) is
    /// stored as key absence, so it stays distinguishable from an empty
    /// override set.
    pub fn save_permissions(&self, permissions: Option<&[Capability]>) -> EngineResult<()> {
        match permissions {
            Some(caps) => {
                let json = serde_json::to_string(caps)
                    .map_err(|e| EngineError::RemoteUnavailable(e.to_string()))?;
                self.with_mut(|kv| kv.set(keys::PERMISSIONS, &json));
            }
            None => self.with_mut(|kv| kv.remove(keys::PERMISSIONS)),
        }
        Ok(())
    }

    /// Assembles the acting identity from cached fields. None until both the
    /// session and the profile fields have been saved.
    pub fn identity(&self) -> Option<Identity> {
        self.with(|kv| {
            let permissions: Option<HashSet<Capability>> = match kv.get(keys::PERMISSIONS) {
                Some(json) => Some(serde_json::from_str(&json).ok()?),
                None => None,
            };
            Some(Identity {
                user_id: kv.get(keys::USER_ID)?,
                username: kv.get(keys::USERNAME)?,
                role: Role::parse(&kv.get(keys::ROLE)?),
                shop_id: kv.get(keys::SHOP_ID)?,
                shop_name: kv.get(keys::SHOP_NAME).unwrap_or_default(),
                permissions,
            })
        })
    }

    // =========================================================================
    // Auth Protocol
    // =========================================================================

    /// Exchanges credentials for a session and persists it.
    pub async fn login<A: AuthExchange>(
        &self,
        auth: &A,
        email: &str,
        password: &str,
    ) -> EngineResult<()> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(EngineError::Validation(ValidationError::Required {
                field: "password".to_string(),
            }));
        }

        let tokens = auth.login(email, password).await.map_err(|err| match err {
            AuthError::InvalidCredentials => EngineError::InvalidCredentials,
            AuthError::Unavailable(msg) => EngineError::RemoteUnavailable(msg),
            AuthError::Expired | AuthError::Revoked => EngineError::AuthRevoked,
        })?;

        self.save_session(&tokens)?;
        info!(user_id = %tokens.user_id, "Logged in");
        Ok(())
    }

    /// Logs out: clears every session and identity field.
    pub fn logout(&self) {
        self.clear_session();
        info!("Logged out");
    }

    /// Ensures a valid session, refreshing through the auth exchange when
    /// the stored one has gone stale.
    ///
    /// Fail-closed: every failure path clears the session before reporting
    /// [`SessionStatus::Invalid`]. With no refresh token on hand the verdict
    /// is immediate, without touching the network.
    pub async fn ensure_fresh<A: AuthExchange>(&self, auth: &A) -> SessionStatus {
        let _refresh = self.refresh_lock.lock().await;

        // A prior caller may have refreshed while we waited for the lock.
        if self.is_session_valid() {
            return SessionStatus::Valid;
        }

        let Some(refresh_token) = self.refresh_token() else {
            debug!("No refresh token; session invalid");
            return SessionStatus::Invalid;
        };

        match auth.refresh(&refresh_token).await {
            Ok(tokens) => match self.save_session(&tokens) {
                Ok(()) => {
                    info!(user_id = %tokens.user_id, "Session refreshed");
                    SessionStatus::Valid
                }
                Err(err) => {
                    warn!(error = %err, "Refreshed token material unusable; clearing session");
                    self.clear_session();
                    SessionStatus::Invalid
                }
            },
            Err(err) => {
                warn!(error = %err, "Session refresh failed; clearing session");
                self.clear_session();
                SessionStatus::Invalid
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
