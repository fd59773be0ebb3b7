//! # Inventory Ledger
//!
//! Shop-scoped inventory operations over the item repository.
//!
//! Two layers live here. The stock movement primitives (`decrement_stock`,
//! `increment_stock`) are thin validated passthroughs to the store's atomic
//! conditional update; the sale coordinator and the audit trail drive them
//! directly. The catalog mutations (`edit_item`, `delete_item`) are
//! capability-gated and audited: each one appends an audit entry carrying
//! the prior item state, and rolls the mutation back if the entry cannot be
//! written. A privileged edit either happens with its audit record or not
//! at all.

use tracing::{info, warn};

use shopledger_core::{
    validate_item_name, validate_quantity, validate_sku, AuditAction, Capability, Identity,
    InventoryItem, ReversalPayload, ValidationError,
};
use shopledger_db::{Database, ItemRepository};

use crate::access::{actor, require_capability, require_shop_access};
use crate::audit::AuditTrail;
use crate::error::{EngineError, EngineResult};

/// Shop-scoped inventory operations.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    items: ItemRepository,
}

impl InventoryLedger {
    /// Creates a ledger over the database's item repository.
    pub fn new(db: &Database) -> Self {
        InventoryLedger { items: db.items() }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an item, failing with NotFound when absent.
    pub async fn item(&self, shop_id: &str, item_id: &str) -> EngineResult<InventoryItem> {
        self.items
            .get(shop_id, item_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Item".to_string(),
                id: item_id.to_string(),
            })
    }

    /// Gets an item if it exists.
    pub async fn find_item(&self, shop_id: &str, item_id: &str) -> EngineResult<Option<InventoryItem>> {
        Ok(self.items.get(shop_id, item_id).await?)
    }

    /// Lists the caller's shop catalog.
    pub async fn list(&self, identity: &Identity) -> EngineResult<Vec<InventoryItem>> {
        require_capability(identity, Capability::ViewInventory)?;
        Ok(self.items.list_for_shop(&identity.shop_id).await?)
    }

    // =========================================================================
    // Stock Movement Primitives
    // =========================================================================

    /// Atomically removes `amount` from stock; all-or-nothing under races.
    pub async fn decrement_stock(
        &self,
        shop_id: &str,
        item_id: &str,
        amount: i64,
    ) -> EngineResult<()> {
        validate_quantity(amount)?;
        Ok(self.items.decrement_stock(shop_id, item_id, amount).await?)
    }

    /// Adds `amount` back to stock (restock, compensation, undo).
    pub async fn increment_stock(
        &self,
        shop_id: &str,
        item_id: &str,
        amount: i64,
    ) -> EngineResult<()> {
        validate_quantity(amount)?;
        Ok(self.items.increment_stock(shop_id, item_id, amount).await?)
    }

    /// Writes an item state verbatim. Reserved for undo and compensation
    /// paths that restore a previously captured state; no gating, no audit.
    pub(crate) async fn restore_item(&self, item: &InventoryItem) -> EngineResult<()> {
        Ok(self.items.upsert(item).await?)
    }

    /// Removes an item verbatim. Counterpart of [`Self::restore_item`] for
    /// rolling back a restore.
    pub(crate) async fn remove_item(&self, shop_id: &str, item_id: &str) -> EngineResult<()> {
        Ok(self.items.delete(shop_id, item_id).await?)
    }

    // =========================================================================
    // Audited Catalog Mutations
    // =========================================================================

    /// Creates or edits a catalog item. Requires the edit-inventory
    /// capability; the mutation and its audit entry share fate.
    pub async fn edit_item(
        &self,
        identity: &Identity,
        item: &InventoryItem,
        audit: &AuditTrail,
    ) -> EngineResult<()> {
        require_capability(identity, Capability::EditInventory)?;
        require_shop_access(identity, &item.shop_id)?;
        validate_item_name(&item.name)?;
        validate_sku(&item.sku)?;
        if item.quantity < 0 {
            return Err(EngineError::Validation(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }));
        }

        let prior = self.items.get(&item.shop_id, &item.id).await?;
        self.items.upsert(item).await?;

        let reversal = match &prior {
            Some(prior) => ReversalPayload::InventoryEdit {
                prior: prior.clone(),
            },
            // A brand-new item has no prior state to restore.
            None => ReversalPayload::None,
        };
        let description = format!("Edited item {} ({})", item.name, item.sku);

        if let Err(err) = audit
            .record(
                AuditAction::InventoryEdit,
                &item.shop_id,
                actor(identity),
                None,
                description,
                reversal,
            )
            .await
        {
            warn!(item_id = %item.id, error = %err, "Audit append failed; rolling back edit");
            let rollback = match prior {
                Some(prior) => self.items.upsert(&prior).await,
                None => self.items.delete(&item.shop_id, &item.id).await,
            };
            if let Err(rollback_err) = rollback {
                warn!(item_id = %item.id, error = %rollback_err, "Edit rollback failed");
            }
            return Err(err);
        }

        info!(item_id = %item.id, shop_id = %item.shop_id, "Item edited");
        Ok(())
    }

    /// Deletes a catalog item. Requires the delete-inventory capability; the
    /// audit entry captures the full prior state so the delete can be undone.
    pub async fn delete_item(
        &self,
        identity: &Identity,
        shop_id: &str,
        item_id: &str,
        audit: &AuditTrail,
    ) -> EngineResult<()> {
        require_capability(identity, Capability::DeleteInventory)?;
        require_shop_access(identity, shop_id)?;

        let prior = self.item(shop_id, item_id).await?;
        self.items.delete(shop_id, item_id).await?;

        let description = format!("Deleted item {} ({})", prior.name, prior.sku);
        if let Err(err) = audit
            .record(
                AuditAction::InventoryEdit,
                shop_id,
                actor(identity),
                None,
                description,
                ReversalPayload::InventoryEdit {
                    prior: prior.clone(),
                },
            )
            .await
        {
            warn!(item_id = %item_id, error = %err, "Audit append failed; reinstating item");
            if let Err(rollback_err) = self.items.upsert(&prior).await {
                warn!(item_id = %item_id, error = %rollback_err, "Delete rollback failed");
            }
            return Err(err);
        }

        info!(item_id = %item_id, shop_id = %shop_id, "Item deleted");
        Ok(())
    }
}
