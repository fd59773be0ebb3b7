//! # Domain Types
//!
//! Core domain types for the inventory transaction & audit engine.
//!
//! ## Dual-Key Identity Pattern
//! Every persisted entity has:
//! - `id`: UUID v4 - immutable, used for store relations
//! - `shop_id`: the tenant partition key; no entity is ever read or written
//!   across shop boundaries without the platform-admin capability
//!
//! ## Snapshot Pattern
//! Sale lines freeze the selling price and discount at commit time, so sale
//! history stays correct even when the catalog changes afterwards.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Discount, Money, TaxRate};
use crate::permissions::Capability;

// =============================================================================
// Inventory Item
// =============================================================================

/// A stocked item owned by exactly one shop.
///
/// `quantity` is a non-negative integer; the store layer enforces this with
/// a conditional decrement so it can never underflow, not even under races
/// between two clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Shop this item belongs to (tenant partition key).
    pub shop_id: String,

    /// Display name.
    pub name: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Optional category reference.
    pub category_id: Option<String>,

    /// User who created the item.
    pub creator_id: String,

    /// Current stock level. Never negative.
    pub quantity: i64,

    /// Acquisition cost in cents (margin reporting).
    pub cost_cents: i64,

    /// Selling price in cents. Tax and discount are stored raw alongside,
    /// never pre-applied to this value.
    pub price_cents: i64,

    /// Tax rate in basis points (1000 = 10%).
    pub tax_rate_bps: u32,

    /// Catalog discount, applied when a cart line carries no override.
    pub discount: Discount,

    /// Image URLs (stored as JSON in the store layer).
    pub image_urls: Vec<String>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Returns the selling price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Checks whether the requested quantity is currently in stock.
    #[inline]
    pub fn in_stock(&self, requested: i64) -> bool {
        self.quantity >= requested
    }
}

// =============================================================================
// Category
// =============================================================================

/// Reference data used to label items. No special lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub shop_id: String,
    pub name: String,
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a persisted sale record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale committed successfully with its stock decrements and audit entry.
    Completed,
    /// Commit failed after the record was written; kept only until
    /// compensation removes it.
    Failed,
}

/// A line of a persisted sale. Price and discount are frozen at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    /// Item sold.
    pub item_id: String,

    /// Selling price in cents at the moment of sale (frozen).
    pub price_cents_at_sale: i64,

    /// Quantity sold. Always positive.
    pub quantity: i64,

    /// Discount applied to this line (frozen).
    pub discount: Discount,
}

/// A committed sale. Immutable once written: corrections happen via new
/// sales or via undo of the originating audit entry, never in-place edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Unique identifier (UUID v4). Doubles as the idempotency token for the
    /// commit attempt: a retried insert of the same id is deduplicated by
    /// the store's primary-key constraint.
    pub id: String,

    /// Shop this sale belongs to.
    pub shop_id: String,

    /// User who recorded the sale.
    pub creator_id: String,

    /// Username snapshot at commit time.
    pub creator_name: String,

    pub status: SaleStatus,

    /// Grand total in cents (sum of line totals including tax).
    pub total_cents: i64,

    pub created_at: DateTime<Utc>,

    /// Ordered line items.
    pub lines: Vec<SaleLine>,
}

// =============================================================================
// Audit Trail
// =============================================================================

/// The kind of privileged mutation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateUser,
    DeleteUser,
    RoleChange,
    Sale,
    InventoryEdit,
    /// A compensating undo of an earlier entry.
    Undo,
    Other,
}

impl AuditAction {
    /// Whether entries of this action type can be undone.
    ///
    /// The undoable set is explicit: Sale (re-increment stock), DeleteUser
    /// (reinstate the prior record), InventoryEdit (restore the prior item
    /// state). CreateUser, RoleChange, Undo, and Other are informational.
    pub const fn is_undoable(&self) -> bool {
        matches!(
            self,
            AuditAction::Sale | AuditAction::DeleteUser | AuditAction::InventoryEdit
        )
    }
}

/// A user reference embedded in audit entries (id plus username snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRef {
    pub user_id: String,
    pub username: String,
}

/// One reversed stock movement inside a sale reversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalLine {
    pub item_id: String,
    pub quantity: i64,
}

/// Typed reversal payload, sufficient to compute and apply the inverse of
/// the original mutation. One variant per undoable action type instead of a
/// free-form blob, so undo stays type-safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReversalPayload {
    /// Re-increment each affected item by its sold quantity.
    Sale { lines: Vec<ReversalLine> },
    /// Reinstate the user record captured at delete time.
    UserDelete { prior: UserEntity },
    /// Restore the item state captured before the edit.
    InventoryEdit { prior: InventoryItem },
    /// Informational entry; nothing to invert.
    None,
}

/// An immutable audit log entry.
///
/// Append-only: undo creates a compensating mutation and flips `undone`,
/// but never deletes or rewrites the original entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub shop_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub performed_by: ActorRef,
    pub target: Option<ActorRef>,
    pub description: String,
    pub reversal: ReversalPayload,
    pub undone: bool,
}

// =============================================================================
// Session & Identity
// =============================================================================

/// The access/refresh token pair plus cached owner fields.
///
/// Owned exclusively by the session store; mutated only by login, refresh,
/// and logout. `expires_at` (epoch seconds) is the authoritative validity
/// bound: a session past it is stale, not valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds.
    pub expires_at: i64,
    pub user_id: String,
    pub user_email: String,
}

impl Session {
    /// True iff the session is still valid at the given epoch-second instant.
    #[inline]
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// A user's role within a shop. Role defaults form strict supersets:
/// Admin > Manager > Cashier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
    /// Unrecognized role string: denied all mutating capabilities, allowed
    /// read-only ones.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Stable string form used by the session key-value store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
            Role::Unknown => "unknown",
        }
    }

    /// Parses a stored role string; anything unrecognized maps to Unknown.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            "cashier" => Role::Cashier,
            _ => Role::Unknown,
        }
    }
}

/// The acting identity derived from the session plus the fetched profile.
/// Cached alongside the session, same lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub shop_id: String,
    pub shop_name: String,
    /// Explicit capability overrides. `None` means "use role defaults";
    /// `Some` is exhaustive - a capability absent from the set is denied
    /// even if the role would normally grant it.
    pub permissions: Option<HashSet<Capability>>,
}

// =============================================================================
// User Entity
// =============================================================================

/// A user record in the shop's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntity {
    pub id: String,
    pub shop_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Explicit capability overrides, same semantics as [`Identity`].
    pub permissions: Option<Vec<Capability>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
