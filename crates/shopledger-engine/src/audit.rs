//! # Audit Trail
//!
//! Append-only record of privileged mutations, plus the undo protocol.
//!
//! ## Undo Protocol
//!
//! 1. Load the entry; reject non-undoable actions and already-undone ones.
//! 2. Gate on the capability matching the entry's action type.
//! 3. Claim the entry with the store's conditional `undone` flip. The claim
//!    is what makes double-undo lose cleanly under races: whoever flips the
//!    flag first owns the replay, everyone else gets AlreadyUndone.
//! 4. Replay the typed inverse against the owning store. A failed replay
//!    releases the claim so the entry can be retried.
//! 5. Append a compensating Undo entry referencing the original. If that
//!    append fails the inverse is rolled back and the claim released; an
//!    undo without its own audit record never survives.
//!
//! The original entry itself is never deleted or rewritten.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopledger_core::{
    ActorRef, AuditAction, AuditLogEntry, Capability, Identity, InventoryItem, ReversalLine,
    ReversalPayload, UserEntity,
};
use shopledger_db::{AuditRepository, Database, UserRepository};

use crate::access::{actor, require_capability, require_shop_access};
use crate::error::{EngineError, EngineResult};
use crate::ledger::InventoryLedger;

/// Default page size for audit listings.
const DEFAULT_AUDIT_PAGE: u32 = 100;

/// What `rollback_inverse` needs to put the world back if the undo cannot
/// be recorded.
enum InverseRollback {
    Sale {
        lines: Vec<ReversalLine>,
    },
    UserDelete {
        user_id: String,
    },
    InventoryEdit {
        item_id: String,
        /// Item state captured just before the restore; None when the item
        /// row did not exist at that point.
        before: Option<InventoryItem>,
    },
}

/// The append-only audit log and its undo machinery.
#[derive(Clone)]
pub struct AuditTrail {
    repo: AuditRepository,
    ledger: InventoryLedger,
    users: UserRepository,
}

impl AuditTrail {
    /// Creates an audit trail over the database.
    pub fn new(db: &Database) -> Self {
        AuditTrail {
            repo: db.audit(),
            ledger: InventoryLedger::new(db),
            users: db.users(),
        }
    }

    /// The capability required to undo an entry of the given action type.
    /// Undoing a mutation is gated like performing its inverse would be.
    fn undo_capability(action: AuditAction) -> Capability {
        match action {
            AuditAction::Sale => Capability::UndoAudit,
            AuditAction::DeleteUser => Capability::ManageUsers,
            AuditAction::InventoryEdit => Capability::EditInventory,
            // Non-undoable actions never reach the gate; UndoAudit is the
            // strictest sensible fallback.
            _ => Capability::UndoAudit,
        }
    }

    // =========================================================================
    // Recording & Listing
    // =========================================================================

    /// Appends a new entry and returns it.
    pub async fn record(
        &self,
        action: AuditAction,
        shop_id: &str,
        performed_by: ActorRef,
        target: Option<ActorRef>,
        description: String,
        reversal: ReversalPayload,
    ) -> EngineResult<AuditLogEntry> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            shop_id: shop_id.to_string(),
            timestamp: Utc::now(),
            action,
            performed_by,
            target,
            description,
            reversal,
            undone: false,
        };
        self.repo.append(&entry).await?;
        debug!(entry_id = %entry.id, action = ?action, "Audit entry recorded");
        Ok(entry)
    }

    /// Lists the caller's shop trail, newest first.
    pub async fn list_for_user(&self, identity: &Identity) -> EngineResult<Vec<AuditLogEntry>> {
        require_capability(identity, Capability::ViewReports)?;
        Ok(self
            .repo
            .list_for_shop(&identity.shop_id, DEFAULT_AUDIT_PAGE)
            .await?)
    }

    /// Gets a single entry from the caller's shop.
    pub async fn entry(&self, identity: &Identity, entry_id: &str) -> EngineResult<AuditLogEntry> {
        require_capability(identity, Capability::ViewReports)?;
        self.repo
            .get(&identity.shop_id, entry_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Audit entry".to_string(),
                id: entry_id.to_string(),
            })
    }

    // =========================================================================
    // Undo
    // =========================================================================

    /// Undoes an entry by replaying its typed inverse, at most once.
    pub async fn undo(&self, identity: &Identity, entry_id: &str) -> EngineResult<()> {
        let entry = self
            .repo
            .get(&identity.shop_id, entry_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Audit entry".to_string(),
                id: entry_id.to_string(),
            })?;
        require_shop_access(identity, &entry.shop_id)?;

        if !entry.action.is_undoable() {
            return Err(EngineError::UndoNotSupported {
                action: entry.action,
            });
        }
        require_capability(identity, Self::undo_capability(entry.action))?;

        if entry.undone {
            return Err(EngineError::AlreadyUndone {
                entry_id: entry.id.clone(),
            });
        }

        // Claim the entry; the losing side of a double-undo race stops here.
        if !self.repo.mark_undone(&entry.shop_id, &entry.id).await? {
            return Err(EngineError::AlreadyUndone {
                entry_id: entry.id.clone(),
            });
        }

        let rollback = match self.apply_inverse(&entry).await {
            Ok(rollback) => rollback,
            Err(err) => {
                warn!(entry_id = %entry.id, error = %err, "Inverse replay failed; releasing claim");
                if let Err(release_err) = self.repo.clear_undone(&entry.shop_id, &entry.id).await {
                    warn!(entry_id = %entry.id, error = %release_err, "Failed to release undo claim");
                }
                return Err(err);
            }
        };

        let recorded = self
            .record(
                AuditAction::Undo,
                &entry.shop_id,
                actor(identity),
                Some(entry.performed_by.clone()),
                format!("Undo of {:?} entry {}", entry.action, entry.id),
                ReversalPayload::None,
            )
            .await;

        if let Err(err) = recorded {
            warn!(entry_id = %entry.id, error = %err, "Undo record failed; rolling back inverse");
            self.rollback_inverse(&entry, rollback).await;
            if let Err(release_err) = self.repo.clear_undone(&entry.shop_id, &entry.id).await {
                warn!(entry_id = %entry.id, error = %release_err, "Failed to release undo claim");
            }
            return Err(err);
        }

        info!(entry_id = %entry.id, action = ?entry.action, "Audit entry undone");
        Ok(())
    }

    /// Applies the inverse of an entry's mutation, returning what a rollback
    /// of that inverse would need.
    async fn apply_inverse(&self, entry: &AuditLogEntry) -> EngineResult<InverseRollback> {
        match &entry.reversal {
            ReversalPayload::Sale { lines } => {
                let mut applied: Vec<ReversalLine> = Vec::new();
                for line in lines {
                    if let Err(err) = self
                        .ledger
                        .increment_stock(&entry.shop_id, &line.item_id, line.quantity)
                        .await
                    {
                        // Re-remove what was already restored.
                        for done in &applied {
                            if let Err(comp_err) = self
                                .ledger
                                .decrement_stock(&entry.shop_id, &done.item_id, done.quantity)
                                .await
                            {
                                warn!(
                                    item_id = %done.item_id,
                                    error = %comp_err,
                                    "Partial sale-undo compensation failed"
                                );
                            }
                        }
                        return Err(err);
                    }
                    applied.push(line.clone());
                }
                Ok(InverseRollback::Sale { lines: applied })
            }
            ReversalPayload::UserDelete { prior } => {
                self.reinstate_user(prior).await?;
                Ok(InverseRollback::UserDelete {
                    user_id: prior.id.clone(),
                })
            }
            ReversalPayload::InventoryEdit { prior } => {
                let before = self.ledger.find_item(&entry.shop_id, &prior.id).await?;
                self.ledger.restore_item(prior).await?;
                Ok(InverseRollback::InventoryEdit {
                    item_id: prior.id.clone(),
                    before,
                })
            }
            ReversalPayload::None => Err(EngineError::UndoNotSupported {
                action: entry.action,
            }),
        }
    }

    /// Best-effort rollback of a replayed inverse after the Undo entry could
    /// not be appended. Failures are logged; the claim release that follows
    /// keeps the entry retryable either way.
    async fn rollback_inverse(&self, entry: &AuditLogEntry, rollback: InverseRollback) {
        match rollback {
            InverseRollback::Sale { lines } => {
                for line in &lines {
                    if let Err(err) = self
                        .ledger
                        .decrement_stock(&entry.shop_id, &line.item_id, line.quantity)
                        .await
                    {
                        warn!(item_id = %line.item_id, error = %err, "Sale-undo rollback failed");
                    }
                }
            }
            InverseRollback::UserDelete { user_id } => {
                if let Err(err) = self.users.delete(&entry.shop_id, &user_id).await {
                    warn!(user_id = %user_id, error = %err, "User-undo rollback failed");
                }
            }
            InverseRollback::InventoryEdit { item_id, before } => {
                let result = match before {
                    Some(before) => self.ledger.restore_item(&before).await,
                    None => self.ledger.remove_item(&entry.shop_id, &item_id).await,
                };
                if let Err(err) = result {
                    warn!(item_id = %item_id, error = %err, "Item-undo rollback failed");
                }
            }
        }
    }

    /// Writes a previously captured user record back verbatim.
    async fn reinstate_user(&self, prior: &UserEntity) -> EngineResult<()> {
        Ok(self.users.upsert(prior).await?)
    }
}
