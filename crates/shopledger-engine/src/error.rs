//! # Engine Error Types
//!
//! One taxonomy for everything the orchestration layer can report, so
//! callers can route each failure: re-prompt on validation, re-authenticate
//! on expiry, retry on unavailability, surface the rest.

use thiserror::Error;

use shopledger_core::{AuditAction, Capability, CoreError, ValidationError};
use shopledger_db::DbError;

/// Errors produced by the engine's orchestration layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input, recoverable by correcting it locally.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A domain rule rejected the operation (oversized sale, bad quantity).
    #[error("{0}")]
    Rule(CoreError),

    /// Requested quantity exceeds what the ledger holds.
    #[error("Insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    /// The supplied credentials were rejected at login.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The session expired and could not be refreshed.
    #[error("Session expired, sign in again")]
    AuthExpired,

    /// The refresh token was revoked server-side.
    #[error("Session revoked, sign in again")]
    AuthRevoked,

    /// The backing store or auth service could not be reached.
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The identity lacks the capability the operation requires.
    #[error("Missing capability: {capability:?}")]
    Forbidden { capability: Capability },

    /// A referenced entity does not exist (or is outside the caller's shop).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The audit entry was already undone; undo applies at most once.
    #[error("Audit entry already undone: {entry_id}")]
    AlreadyUndone { entry_id: String },

    /// The audit entry's action has no recorded inverse.
    #[error("Undo is not supported for {action:?} entries")]
    UndoNotSupported { action: AuditAction },

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(DbError),
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::InsufficientStock {
                item_id,
                available,
                requested,
            } => EngineError::InsufficientStock {
                item_id,
                available,
                requested,
            },
            DbError::ConnectionFailed(msg) => EngineError::RemoteUnavailable(msg),
            DbError::PoolExhausted => {
                EngineError::RemoteUnavailable("connection pool exhausted".to_string())
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => EngineError::Validation(v),
            CoreError::InsufficientStock {
                item_id,
                available,
                requested,
            } => EngineError::InsufficientStock {
                item_id,
                available,
                requested,
            },
            CoreError::ItemNotFound(id) => EngineError::NotFound {
                entity: "Item".to_string(),
                id,
            },
            other => EngineError::Rule(other),
        }
    }
}

/// Convenience result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================
