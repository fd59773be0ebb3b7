//! # Item Repository
//!
//! Store operations for inventory items, including the two stock movement
//! primitives the rest of the engine is built on.
//!
//! ## The Conditional Decrement
//! ```text
//! UPDATE items
//!    SET quantity = quantity - :amount
//!  WHERE id = :id AND shop_id = :shop AND quantity >= :amount
//! ```
//! A single atomic statement: either the full amount comes off, or nothing
//! does. Zero rows affected means the item is missing or a racing client
//! got the stock first - the caller receives NotFound or InsufficientStock,
//! never a partial effect. This is the server-side arbiter of the
//! no-oversell guarantee; the engine's validation pass is only optimistic.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopledger_core::{Discount, InventoryItem};

/// Row shape for the items table; converted to the domain type after JSON
/// columns are parsed.
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    shop_id: String,
    name: String,
    sku: String,
    category_id: Option<String>,
    creator_id: String,
    quantity: i64,
    cost_cents: i64,
    price_cents: i64,
    tax_rate_bps: u32,
    discount_value: i64,
    discount_is_percentage: bool,
    image_urls: String,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> DbResult<InventoryItem> {
        let image_urls: Vec<String> = serde_json::from_str(&self.image_urls)?;
        Ok(InventoryItem {
            id: self.id,
            shop_id: self.shop_id,
            name: self.name,
            sku: self.sku,
            category_id: self.category_id,
            creator_id: self.creator_id,
            quantity: self.quantity,
            cost_cents: self.cost_cents,
            price_cents: self.price_cents,
            tax_rate_bps: self.tax_rate_bps,
            discount: Discount {
                value: self.discount_value,
                is_percentage: self.discount_is_percentage,
            },
            image_urls,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_ITEM: &str = "SELECT id, shop_id, name, sku, category_id, creator_id, quantity, \
     cost_cents, price_cents, tax_rate_bps, discount_value, discount_is_percentage, \
     image_urls, updated_at FROM items";

/// Repository for inventory item store operations.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    /// Creates a new ItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    /// Gets an item by id, scoped to a shop.
    pub async fn get(&self, shop_id: &str, item_id: &str) -> DbResult<Option<InventoryItem>> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("{SELECT_ITEM} WHERE id = ?1 AND shop_id = ?2"))
                .bind(item_id)
                .bind(shop_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(ItemRow::into_item).transpose()
    }

    /// Lists a shop's items ordered by name.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<InventoryItem>> {
        let rows: Vec<ItemRow> =
            sqlx::query_as(&format!("{SELECT_ITEM} WHERE shop_id = ?1 ORDER BY name"))
                .bind(shop_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    /// Inserts or fully replaces an item. The shop_id of an existing row
    /// never changes: an upsert from another shop is a no-op on conflict.
    pub async fn upsert(&self, item: &InventoryItem) -> DbResult<()> {
        debug!(id = %item.id, shop_id = %item.shop_id, "Upserting item");

        let image_urls = serde_json::to_string(&item.image_urls)?;

        sqlx::query(
            "INSERT INTO items (id, shop_id, name, sku, category_id, creator_id, quantity, \
             cost_cents, price_cents, tax_rate_bps, discount_value, discount_is_percentage, \
             image_urls, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
             ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, sku = excluded.sku, category_id = excluded.category_id, \
             quantity = excluded.quantity, cost_cents = excluded.cost_cents, \
             price_cents = excluded.price_cents, tax_rate_bps = excluded.tax_rate_bps, \
             discount_value = excluded.discount_value, \
             discount_is_percentage = excluded.discount_is_percentage, \
             image_urls = excluded.image_urls, updated_at = excluded.updated_at \
             WHERE items.shop_id = excluded.shop_id",
        )
        .bind(&item.id)
        .bind(&item.shop_id)
        .bind(&item.name)
        .bind(&item.sku)
        .bind(&item.category_id)
        .bind(&item.creator_id)
        .bind(item.quantity)
        .bind(item.cost_cents)
        .bind(item.price_cents)
        .bind(item.tax_rate_bps)
        .bind(item.discount.value)
        .bind(item.discount.is_percentage)
        .bind(image_urls)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes an item, scoped to a shop.
    pub async fn delete(&self, shop_id: &str, item_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?1 AND shop_id = ?2")
            .bind(item_id)
            .bind(shop_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", item_id));
        }
        Ok(())
    }

    /// Atomically decrements stock, failing without partial effect when the
    /// item is missing or holds less than `amount`.
    pub async fn decrement_stock(&self, shop_id: &str, item_id: &str, amount: i64) -> DbResult<()> {
        debug!(item_id = %item_id, amount = %amount, "Decrementing stock");

        let result = sqlx::query(
            "UPDATE items SET quantity = quantity - ?1, updated_at = ?2 \
             WHERE id = ?3 AND shop_id = ?4 AND quantity >= ?1",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(item_id)
        .bind(shop_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Zero rows: distinguish a missing item from short stock.
            return match self.get(shop_id, item_id).await? {
                Some(item) => Err(DbError::InsufficientStock {
                    item_id: item_id.to_string(),
                    available: item.quantity,
                    requested: amount,
                }),
                None => Err(DbError::not_found("Item", item_id)),
            };
        }

        Ok(())
    }

    /// Increments stock. Used for restock and for undo compensation; no
    /// upper bound check.
    pub async fn increment_stock(&self, shop_id: &str, item_id: &str, amount: i64) -> DbResult<()> {
        debug!(item_id = %item_id, amount = %amount, "Incrementing stock");

        let result = sqlx::query(
            "UPDATE items SET quantity = quantity + ?1, updated_at = ?2 \
             WHERE id = ?3 AND shop_id = ?4",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(item_id)
        .bind(shop_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", item_id));
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
    use chrono::Utc;

    fn test_item(id: &str, shop_id: &str, quantity: i64) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            shop_id: shop_id.to_string(),
            name: format!("Item {id}"),
            sku: format!("SKU-{id}"),
            category_id: None,
            creator_id: "u1".to_string(),
            quantity,
            cost_cents: 500,
            price_cents: 1000,
            tax_rate_bps: 1000,
            discount: Discount::none(),
            image_urls: vec!["https://cdn.test/a.png".to_string()],
            updated_at: Utc::now(),
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let db = test_db().await;
        let repo = db.items();
        let item = test_item("a", "shop-1", 5);

        repo.upsert(&item).await.unwrap();
        let loaded = repo.get("shop-1", "a").await.unwrap().unwrap();

        assert_eq!(loaded.name, item.name);
        assert_eq!(loaded.quantity, 5);
        assert_eq!(loaded.image_urls, item.image_urls);
    }

    #[tokio::test]
    async fn test_get_is_shop_scoped() {
        let db = test_db().await;
        let repo = db.items();
        repo.upsert(&test_item("a", "shop-1", 5)).await.unwrap();

        assert!(repo.get("shop-2", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrement_happy_path() {
        let db = test_db().await;
        let repo = db.items();
        repo.upsert(&test_item("a", "shop-1", 5)).await.unwrap();

        repo.decrement_stock("shop-1", "a", 3).await.unwrap();

        let item = repo.get("shop-1", "a").await.unwrap().unwrap();
        assert_eq!(item.quantity, 2);
    }

    #[tokio::test]
    async fn test_decrement_insufficient_stock_has_no_effect() {
        let db = test_db().await;
        let repo = db.items();
        repo.upsert(&test_item("a", "shop-1", 2)).await.unwrap();

        let err = repo.decrement_stock("shop-1", "a", 3).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }
        ));

        // Stock untouched.
        let item = repo.get("shop-1", "a").await.unwrap().unwrap();
        assert_eq!(item.quantity, 2);
    }

    #[tokio::test]
    async fn test_decrement_missing_item_is_not_found() {
        let db = test_db().await;
        let err = db
            .items()
            .decrement_stock("shop-1", "ghost", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_increment_has_no_upper_bound() {
        let db = test_db().await;
        let repo = db.items();
        repo.upsert(&test_item("a", "shop-1", 1)).await.unwrap();

        repo.increment_stock("shop-1", "a", 1_000_000).await.unwrap();

        let item = repo.get("shop-1", "a").await.unwrap().unwrap();
        assert_eq!(item.quantity, 1_000_001);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = test_db().await;
        let err = db.items().delete("shop-1", "ghost").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
