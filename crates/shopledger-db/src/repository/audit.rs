//! # Audit Repository
//!
//! Store operations for the append-only audit log.
//!
//! The only mutable column is `undone`, and it only moves 0 -> 1 through the
//! conditional `mark_undone` (the undo "claim"). `clear_undone` exists so a
//! failed inverse replay can release the claim; original entries are never
//! deleted or rewritten.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopledger_core::{ActorRef, AuditAction, AuditLogEntry, ReversalPayload};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    shop_id: String,
    timestamp: DateTime<Utc>,
    action: AuditAction,
    performed_by_id: String,
    performed_by_name: String,
    target_id: Option<String>,
    target_name: Option<String>,
    description: String,
    reversal: String,
    undone: bool,
}

impl AuditRow {
    fn into_entry(self) -> DbResult<AuditLogEntry> {
        let reversal: ReversalPayload = serde_json::from_str(&self.reversal)?;
        let target = match (self.target_id, self.target_name) {
            (Some(user_id), Some(username)) => Some(ActorRef { user_id, username }),
            _ => None,
        };
        Ok(AuditLogEntry {
            id: self.id,
            shop_id: self.shop_id,
            timestamp: self.timestamp,
            action: self.action,
            performed_by: ActorRef {
                user_id: self.performed_by_id,
                username: self.performed_by_name,
            },
            target,
            description: self.description,
            reversal,
            undone: self.undone,
        })
    }
}

const SELECT_ENTRY: &str = "SELECT id, shop_id, timestamp, action, performed_by_id, \
     performed_by_name, target_id, target_name, description, reversal, undone FROM audit_log";

/// Repository for audit log store operations.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Appends an entry.
    pub async fn append(&self, entry: &AuditLogEntry) -> DbResult<()> {
        debug!(id = %entry.id, action = ?entry.action, "Appending audit entry");

        let reversal = serde_json::to_string(&entry.reversal)?;
        let (target_id, target_name) = match &entry.target {
            Some(actor) => (Some(&actor.user_id), Some(&actor.username)),
            None => (None, None),
        };

        sqlx::query(
            "INSERT INTO audit_log (id, shop_id, timestamp, action, performed_by_id, \
             performed_by_name, target_id, target_name, description, reversal, undone) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&entry.id)
        .bind(&entry.shop_id)
        .bind(entry.timestamp)
        .bind(entry.action)
        .bind(&entry.performed_by.user_id)
        .bind(&entry.performed_by.username)
        .bind(target_id)
        .bind(target_name)
        .bind(&entry.description)
        .bind(reversal)
        .bind(entry.undone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an entry by id, scoped to a shop.
    pub async fn get(&self, shop_id: &str, entry_id: &str) -> DbResult<Option<AuditLogEntry>> {
        let row: Option<AuditRow> =
            sqlx::query_as(&format!("{SELECT_ENTRY} WHERE id = ?1 AND shop_id = ?2"))
                .bind(entry_id)
                .bind(shop_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(AuditRow::into_entry).transpose()
    }

    /// Lists a shop's entries, newest first.
    pub async fn list_for_shop(&self, shop_id: &str, limit: u32) -> DbResult<Vec<AuditLogEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(&format!(
            "{SELECT_ENTRY} WHERE shop_id = ?1 ORDER BY timestamp DESC LIMIT ?2"
        ))
        .bind(shop_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }

    /// Claims an entry for undo. Returns false when it was already claimed;
    /// the conditional update makes a double-undo race lose cleanly.
    pub async fn mark_undone(&self, shop_id: &str, entry_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE audit_log SET undone = 1 WHERE id = ?1 AND shop_id = ?2 AND undone = 0",
        )
        .bind(entry_id)
        .bind(shop_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Releases an undo claim after a failed inverse replay.
    pub async fn clear_undone(&self, shop_id: &str, entry_id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE audit_log SET undone = 0 WHERE id = ?1 AND shop_id = ?2")
                .bind(entry_id)
                .bind(shop_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Audit entry", entry_id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use shopledger_core::ReversalLine;

    fn test_entry(id: &str, shop_id: &str, action: AuditAction) -> AuditLogEntry {
        AuditLogEntry {
            id: id.to_string(),
            shop_id: shop_id.to_string(),
            timestamp: Utc::now(),
            action,
            performed_by: ActorRef {
                user_id: "u1".to_string(),
                username: "clerk".to_string(),
            },
            target: None,
            description: "test entry".to_string(),
            reversal: ReversalPayload::Sale {
                lines: vec![ReversalLine {
                    item_id: "item-a".to_string(),
                    quantity: 3,
                }],
            },
            undone: false,
        }
    }

    #[tokio::test]
    async fn test_append_and_get_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.audit();
        let entry = test_entry("e1", "shop-1", AuditAction::Sale);

        repo.append(&entry).await.unwrap();
        let loaded = repo.get("shop-1", "e1").await.unwrap().unwrap();

        assert_eq!(loaded.action, AuditAction::Sale);
        assert_eq!(loaded.reversal, entry.reversal);
        assert!(!loaded.undone);
    }

    #[tokio::test]
    async fn test_mark_undone_claims_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.audit();
        repo.append(&test_entry("e1", "shop-1", AuditAction::Sale))
            .await
            .unwrap();

        assert!(repo.mark_undone("shop-1", "e1").await.unwrap());
        // Second claim loses.
        assert!(!repo.mark_undone("shop-1", "e1").await.unwrap());

        // Release and re-claim.
        repo.clear_undone("shop-1", "e1").await.unwrap();
        assert!(repo.mark_undone("shop-1", "e1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_shop_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.audit();

        let mut older = test_entry("e1", "shop-1", AuditAction::Sale);
        older.timestamp = Utc::now() - chrono::Duration::minutes(5);
        repo.append(&older).await.unwrap();
        repo.append(&test_entry("e2", "shop-1", AuditAction::InventoryEdit))
            .await
            .unwrap();
        repo.append(&test_entry("e3", "shop-2", AuditAction::Sale))
            .await
            .unwrap();

        let entries = repo.list_for_shop("shop-1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "e2");
        assert_eq!(entries[1].id, "e1");
    }
}
