//! # Category Repository
//!
//! Store operations for the reference data used to label items. Categories
//! have no special lifecycle and no audit trail.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use shopledger_core::Category;

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: String,
    shop_id: String,
    name: String,
}

impl CategoryRow {
    fn into_category(self) -> Category {
        Category {
            id: self.id,
            shop_id: self.shop_id,
            name: self.name,
        }
    }
}

/// Repository for category store operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    /// Creates a new CategoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Inserts or renames a category. The shop_id of an existing row never
    /// changes: an upsert from another shop is a no-op on conflict.
    pub async fn upsert(&self, category: &Category) -> DbResult<()> {
        debug!(id = %category.id, shop_id = %category.shop_id, "Upserting category");

        sqlx::query(
            "INSERT INTO categories (id, shop_id, name) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name \
             WHERE categories.shop_id = excluded.shop_id",
        )
        .bind(&category.id)
        .bind(&category.shop_id)
        .bind(&category.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a category by id, scoped to a shop.
    pub async fn get(&self, shop_id: &str, category_id: &str) -> DbResult<Option<Category>> {
        let row: Option<CategoryRow> = sqlx::query_as(
            "SELECT id, shop_id, name FROM categories WHERE id = ?1 AND shop_id = ?2",
        )
        .bind(category_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CategoryRow::into_category))
    }

    /// Lists a shop's categories ordered by name.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<Category>> {
        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, shop_id, name FROM categories WHERE shop_id = ?1 ORDER BY name")
                .bind(shop_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(CategoryRow::into_category).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
