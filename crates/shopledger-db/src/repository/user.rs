//! # User Repository
//!
//! Store operations for the shop's user directory. The upsert path doubles
//! as the reinstate primitive used when a DeleteUser audit entry is undone.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopledger_core::{Capability, Role, UserEntity};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    shop_id: String,
    username: String,
    email: String,
    role: Role,
    permissions: Option<String>,
}

impl UserRow {
    fn into_user(self) -> DbResult<UserEntity> {
        let permissions: Option<Vec<Capability>> = match self.permissions {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(UserEntity {
            id: self.id,
            shop_id: self.shop_id,
            username: self.username,
            email: self.email,
            role: self.role,
            permissions,
        })
    }
}

/// Repository for user store operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts or fully replaces a user record.
    pub async fn upsert(&self, user: &UserEntity) -> DbResult<()> {
        debug!(id = %user.id, shop_id = %user.shop_id, "Upserting user");

        let permissions = match &user.permissions {
            Some(caps) => Some(serde_json::to_string(caps)?),
            None => None,
        };

        sqlx::query(
            "INSERT INTO users (id, shop_id, username, email, role, permissions) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
             username = excluded.username, email = excluded.email, role = excluded.role, \
             permissions = excluded.permissions \
             WHERE users.shop_id = excluded.shop_id",
        )
        .bind(&user.id)
        .bind(&user.shop_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role)
        .bind(permissions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a user by id, scoped to a shop.
    pub async fn get(&self, shop_id: &str, user_id: &str) -> DbResult<Option<UserEntity>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, shop_id, username, email, role, permissions \
             FROM users WHERE id = ?1 AND shop_id = ?2",
        )
        .bind(user_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Lists a shop's users ordered by username.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<UserEntity>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, shop_id, username, email, role, permissions \
             FROM users WHERE shop_id = ?1 ORDER BY username",
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Deletes a user, scoped to a shop.
    pub async fn delete(&self, shop_id: &str, user_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1 AND shop_id = ?2")
            .bind(user_id)
            .bind(shop_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", user_id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
