//! # shopledger-engine: Orchestration Layer for ShopLedger
//!
//! The inventory transaction & audit engine proper: everything between the
//! pure logic in `shopledger-core` and the SQLite store in `shopledger-db`.
//!
//! ## Components
//!
//! - [`session`] - Session store: token cache over a pluggable key-value
//!   store, login, and the fail-closed refresh protocol
//! - [`ledger`] - Inventory ledger: stock movement primitives plus audited,
//!   capability-gated catalog mutations
//! - [`users`] - User directory: audited user management
//! - [`audit`] - Audit trail: append-only record of privileged mutations and
//!   the claim-replay-record undo protocol
//! - [`sale`] - Sale coordinator: the validate/commit protocol that turns a
//!   cart draft into a committed sale or a clean rejection
//!
//! ## The Commit Discipline
//!
//! Aggregates are mutated through independent repository calls rather than
//! one large store transaction, so every multi-step mutation follows the
//! same shape: apply steps in order, and compensate already-applied steps
//! when a later one fails. The stock decrement is the only step that can lose a race, and it
//! loses atomically; everything after it either succeeds or is unwound.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shopledger_db::{Database, DbConfig};
//! use shopledger_engine::{SaleCoordinator, SessionStore};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let session = Arc::new(SessionStore::in_memory());
//! let sales = SaleCoordinator::new(&db, Arc::clone(&session));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

mod access;
pub mod audit;
pub mod error;
pub mod ledger;
pub mod sale;
pub mod session;
pub mod users;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::AuditTrail;
pub use error::{EngineError, EngineResult};
pub use ledger::InventoryLedger;
pub use sale::{
    CommitOutcome, PricedSale, RejectReason, SaleCoordinator, ValidationOutcome,
};
pub use session::{
    AuthError, AuthExchange, KeyValueStore, MemoryKeyValueStore, SessionStatus, SessionStore,
    SessionTokens,
};
pub use users::UserDirectory;
