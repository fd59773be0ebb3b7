//! # shopledger-core: Pure Business Logic for ShopLedger
//!
//! The heart of the inventory transaction & audit engine: every rule that
//! can be expressed as a pure function over plain data lives here.
//!
//! ## Architecture Position
//! ```text
//!   engine (session, ledger, audit, sale coordinator)
//!        |
//!        v
//!   shopledger-core (THIS CRATE)
//!     types | money | cart | permissions | validation
//!     NO I/O - NO STORE - NO NETWORK - PURE FUNCTIONS
//!        ^
//!        |
//!   shopledger-db (SQLite repositories)
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (InventoryItem, SaleRecord, AuditLogEntry, ...)
//! - [`money`] - Integer-cent money, basis-point tax rates, discounts
//! - [`cart`] - Sale drafts and the validation-stage pricing math
//! - [`permissions`] - The pure permission evaluator
//! - [`validation`] - Field-level input checks
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: same input, same output, no side effects
//! 2. **Integer money**: all monetary values are cents (i64), never floats
//! 3. **Explicit errors**: typed enums via thiserror, never strings or panics
//! 4. **Tenant scoping**: every mutating entity carries exactly one shop_id

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod permissions;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{price_line, sale_totals, CartLine, LinePricing, SaleDraft};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Discount, Money, TaxRate};
pub use permissions::{can, role_grants, Capability};
pub use types::*;
pub use validation::{validate_email, validate_item_name, validate_quantity, validate_sku};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale draft.
///
/// Prevents runaway carts; can become a per-shop setting later.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against typo-sized orders (1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;
