//! # Permission Evaluator
//!
//! Maps a role plus explicit permission overrides to an allow/deny decision
//! for a named capability. Pure functions, no I/O.
//!
//! ## Evaluation Order
//! ```text
//! can(identity, capability)
//!      |
//!      +-- identity.permissions is Some(set)?
//!      |        -> capability must appear in the set (exhaustive override,
//!      |           NOT additive to role defaults; empty set denies all)
//!      |
//!      +-- identity.permissions is None?
//!               -> static role table: Admin > Manager > Cashier, each a
//!                  strict superset of the next; Unknown gets read-only
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{Identity, Role};

// =============================================================================
// Capability
// =============================================================================

/// A named permission checked before privileged operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Browse the shop's catalog and stock levels.
    ViewInventory,
    /// Read sales and audit history.
    ViewReports,
    /// Commit sales (and the stock decrements they imply).
    RecordSale,
    /// Create and update inventory items.
    EditInventory,
    /// Remove inventory items.
    DeleteInventory,
    /// Create, delete, and change roles of users.
    ManageUsers,
    /// Replay the inverse of a sale audit entry.
    UndoAudit,
    /// Cross-shop access. Never granted by a role default; explicit
    /// override only.
    PlatformAdmin,
}

impl Capability {
    /// Read-only capabilities stay available to unknown roles; everything
    /// else is mutating and denied.
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Capability::ViewInventory | Capability::ViewReports)
    }
}

// =============================================================================
// Role Defaults
// =============================================================================

/// The static role -> capability table used when no explicit override set
/// is present. Each role is a strict superset of the one below it.
pub fn role_grants(role: Role, capability: Capability) -> bool {
    match role {
        // Admin: everything a Manager has, plus user management.
        Role::Admin => !matches!(capability, Capability::PlatformAdmin),
        // Manager: everything a Cashier has, plus inventory control and undo.
        Role::Manager => matches!(
            capability,
            Capability::ViewInventory
                | Capability::ViewReports
                | Capability::RecordSale
                | Capability::EditInventory
                | Capability::DeleteInventory
                | Capability::UndoAudit
        ),
        // Cashier: sell and look around.
        Role::Cashier => matches!(
            capability,
            Capability::ViewInventory | Capability::ViewReports | Capability::RecordSale
        ),
        // Unknown role: read-only.
        Role::Unknown => !capability.is_mutating(),
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Decides whether `identity` holds `capability`.
///
/// When an explicit override set is present it is exhaustive: the capability
/// must appear in it, and role defaults do not apply. An empty set therefore
/// denies everything regardless of role.
pub fn can(identity: &Identity, capability: Capability) -> bool {
    match &identity.permissions {
        Some(explicit) => explicit.contains(&capability),
        None => role_grants(identity.role, capability),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn identity(role: Role, permissions: Option<HashSet<Capability>>) -> Identity {
        Identity {
            user_id: "u1".to_string(),
            username: "clerk".to_string(),
            role,
            shop_id: "shop-1".to_string(),
            shop_name: "Main Street".to_string(),
            permissions,
        }
    }

    #[test]
    fn test_role_defaults_are_strict_supersets() {
        let caps = [
            Capability::ViewInventory,
            Capability::ViewReports,
            Capability::RecordSale,
            Capability::EditInventory,
            Capability::DeleteInventory,
            Capability::ManageUsers,
            Capability::UndoAudit,
        ];

        for cap in caps {
            if role_grants(Role::Cashier, cap) {
                assert!(role_grants(Role::Manager, cap), "{cap:?}");
            }
            if role_grants(Role::Manager, cap) {
                assert!(role_grants(Role::Admin, cap), "{cap:?}");
            }
        }
        // And strictly bigger at each step.
        assert!(role_grants(Role::Manager, Capability::EditInventory));
        assert!(!role_grants(Role::Cashier, Capability::EditInventory));
        assert!(role_grants(Role::Admin, Capability::ManageUsers));
        assert!(!role_grants(Role::Manager, Capability::ManageUsers));
    }

    #[test]
    fn test_role_without_capability_denied() {
        let cashier = identity(Role::Cashier, None);
        assert!(!can(&cashier, Capability::DeleteInventory));
        assert!(!can(&cashier, Capability::ManageUsers));
        assert!(can(&cashier, Capability::RecordSale));
    }

    #[test]
    fn test_explicit_empty_set_denies_everything() {
        let admin = identity(Role::Admin, Some(HashSet::new()));
        assert!(!can(&admin, Capability::ViewInventory));
        assert!(!can(&admin, Capability::RecordSale));
        assert!(!can(&admin, Capability::ManageUsers));
    }

    #[test]
    fn test_explicit_overrides_are_exhaustive_not_additive() {
        let mut set = HashSet::new();
        set.insert(Capability::ViewInventory);
        // An Admin whose override set only grants ViewInventory loses all
        // role defaults.
        let admin = identity(Role::Admin, Some(set));
        assert!(can(&admin, Capability::ViewInventory));
        assert!(!can(&admin, Capability::RecordSale));
        assert!(!can(&admin, Capability::ManageUsers));
    }

    #[test]
    fn test_unknown_role_is_read_only() {
        let mystery = identity(Role::Unknown, None);
        assert!(can(&mystery, Capability::ViewInventory));
        assert!(can(&mystery, Capability::ViewReports));
        assert!(!can(&mystery, Capability::RecordSale));
        assert!(!can(&mystery, Capability::EditInventory));
    }

    #[test]
    fn test_platform_admin_never_granted_by_role() {
        for role in [Role::Admin, Role::Manager, Role::Cashier, Role::Unknown] {
            assert!(!role_grants(role, Capability::PlatformAdmin));
        }
        // Only an explicit override grants it.
        let mut set = HashSet::new();
        set.insert(Capability::PlatformAdmin);
        let platform = identity(Role::Cashier, Some(set));
        assert!(can(&platform, Capability::PlatformAdmin));
    }
}
