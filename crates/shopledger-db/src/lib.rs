//! # shopledger-db: Store Layer for ShopLedger
//!
//! SQLite access for the inventory transaction & audit engine.
//!
//! ## Architecture Position
//! ```text
//!   shopledger-engine (session, ledger, audit, sale coordinator)
//!        |
//!        v
//!   shopledger-db (THIS CRATE)
//!     pool | migrations | repositories (item, category, sale, audit, user)
//!        |
//!        v
//!   SQLite database
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded migrations
//! - [`error`] - Store error types
//! - [`repository`] - Repositories (item, category, sale, audit, user)
//!
//! ## The One Contended Resource
//!
//! InventoryItem.quantity is the only value with true write contention.
//! Its mutations go through a conditional decrement that either applies in
//! full or not at all; sales and audit entries are append-only and
//! contention-free by construction.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopledger_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/ledger.db")).await?;
//! let item = db.items().get("shop-1", "item-a").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::audit::AuditRepository;
pub use repository::category::CategoryRepository;
pub use repository::item::ItemRepository;
pub use repository::sale::SaleRepository;
pub use repository::user::UserRepository;
