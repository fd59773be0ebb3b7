//! # Sale Repository
//!
//! Store operations for sale records and their lines.
//!
//! Sales are append-only: there is no update path. The record plus all of
//! its lines are written in one transaction, keyed by the client-generated
//! sale id, which doubles as the commit attempt's idempotency token - a
//! retried insert of the same id hits the primary key and surfaces as a
//! UniqueViolation instead of a second sale. The delete path exists solely
//! for commit compensation.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopledger_core::{Discount, SaleLine, SaleRecord, SaleStatus};

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    shop_id: String,
    creator_id: String,
    creator_name: String,
    status: SaleStatus,
    total_cents: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleLineRow {
    item_id: String,
    price_cents_at_sale: i64,
    quantity: i64,
    discount_value: i64,
    discount_is_percentage: bool,
}

impl SaleLineRow {
    fn into_line(self) -> SaleLine {
        SaleLine {
            item_id: self.item_id,
            price_cents_at_sale: self.price_cents_at_sale,
            quantity: self.quantity,
            discount: Discount {
                value: self.discount_value,
                is_percentage: self.discount_is_percentage,
            },
        }
    }
}

/// Repository for sale store operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a sale and all of its lines in one transaction.
    pub async fn insert(&self, sale: &SaleRecord) -> DbResult<()> {
        debug!(id = %sale.id, lines = sale.lines.len(), "Inserting sale");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sales (id, shop_id, creator_id, creator_name, status, total_cents, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&sale.id)
        .bind(&sale.shop_id)
        .bind(&sale.creator_id)
        .bind(&sale.creator_name)
        .bind(sale.status)
        .bind(sale.total_cents)
        .bind(sale.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, line) in sale.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sale_lines (id, sale_id, item_id, price_cents_at_sale, quantity, \
                 discount_value, discount_is_percentage, position) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&sale.id)
            .bind(&line.item_id)
            .bind(line.price_cents_at_sale)
            .bind(line.quantity)
            .bind(line.discount.value)
            .bind(line.discount.is_percentage)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a sale with its lines, scoped to a shop.
    pub async fn get(&self, shop_id: &str, sale_id: &str) -> DbResult<Option<SaleRecord>> {
        let row: Option<SaleRow> = sqlx::query_as(
            "SELECT id, shop_id, creator_id, creator_name, status, total_cents, created_at \
             FROM sales WHERE id = ?1 AND shop_id = ?2",
        )
        .bind(sale_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines: Vec<SaleLineRow> = sqlx::query_as(
            "SELECT item_id, price_cents_at_sale, quantity, discount_value, discount_is_percentage \
             FROM sale_lines WHERE sale_id = ?1 ORDER BY position",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(SaleRecord {
            id: row.id,
            shop_id: row.shop_id,
            creator_id: row.creator_id,
            creator_name: row.creator_name,
            status: row.status,
            total_cents: row.total_cents,
            created_at: row.created_at,
            lines: lines.into_iter().map(SaleLineRow::into_line).collect(),
        }))
    }

    /// Lists a shop's sales, newest first, without lines.
    pub async fn list_for_shop(&self, shop_id: &str, limit: u32) -> DbResult<Vec<SaleRecord>> {
        let rows: Vec<SaleRow> = sqlx::query_as(
            "SELECT id, shop_id, creator_id, creator_name, status, total_cents, created_at \
             FROM sales WHERE shop_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(shop_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SaleRecord {
                id: row.id,
                shop_id: row.shop_id,
                creator_id: row.creator_id,
                creator_name: row.creator_name,
                status: row.status,
                total_cents: row.total_cents,
                created_at: row.created_at,
                lines: Vec::new(),
            })
            .collect())
    }

    /// Deletes a sale (lines cascade). Compensation only - committed sales
    /// are never removed through normal operation.
    pub async fn delete(&self, shop_id: &str, sale_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?1 AND shop_id = ?2")
            .bind(sale_id)
            .bind(shop_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }
        Ok(())
    }

    /// Counts sales in a shop. Used by atomicity checks in tests and
    /// reporting.
    pub async fn count_for_shop(&self, shop_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE shop_id = ?1")
            .bind(shop_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
