//! # User Directory
//!
//! Shop-scoped user management. Every mutation is gated on the manage-users
//! capability and audited; a user delete captures the full prior record so
//! the audit trail can reinstate it on undo.

use tracing::{info, warn};

use shopledger_core::{
    validate_email, ActorRef, AuditAction, Capability, Identity, ReversalPayload, Role, UserEntity,
    ValidationError,
};
use shopledger_db::{Database, UserRepository};

use crate::access::{actor, require_capability, require_shop_access};
use crate::audit::AuditTrail;
use crate::error::{EngineError, EngineResult};

/// Shop-scoped user management operations.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: UserRepository,
}

impl UserDirectory {
    /// Creates a directory over the database's user repository.
    pub fn new(db: &Database) -> Self {
        UserDirectory { users: db.users() }
    }

    /// Gets a user from the caller's shop.
    pub async fn user(&self, identity: &Identity, user_id: &str) -> EngineResult<UserEntity> {
        require_capability(identity, Capability::ManageUsers)?;
        self.users
            .get(&identity.shop_id, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "User".to_string(),
                id: user_id.to_string(),
            })
    }

    /// Lists the caller's shop users.
    pub async fn list(&self, identity: &Identity) -> EngineResult<Vec<UserEntity>> {
        require_capability(identity, Capability::ManageUsers)?;
        Ok(self.users.list_for_shop(&identity.shop_id).await?)
    }

    /// Creates a user. Informational audit entry; account creation is
    /// reversed by an explicit delete, not by undo.
    pub async fn create_user(
        &self,
        identity: &Identity,
        user: &UserEntity,
        audit: &AuditTrail,
    ) -> EngineResult<()> {
        require_capability(identity, Capability::ManageUsers)?;
        require_shop_access(identity, &user.shop_id)?;
        validate_email(&user.email)?;
        if user.username.trim().is_empty() {
            return Err(EngineError::Validation(ValidationError::Required {
                field: "username".to_string(),
            }));
        }

        self.users.upsert(user).await?;

        if let Err(err) = audit
            .record(
                AuditAction::CreateUser,
                &user.shop_id,
                actor(identity),
                Some(ActorRef {
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                }),
                format!("Created user {}", user.username),
                ReversalPayload::None,
            )
            .await
        {
            warn!(user_id = %user.id, error = %err, "Audit append failed; removing created user");
            if let Err(rollback_err) = self.users.delete(&user.shop_id, &user.id).await {
                warn!(user_id = %user.id, error = %rollback_err, "Create rollback failed");
            }
            return Err(err);
        }

        info!(user_id = %user.id, shop_id = %user.shop_id, "User created");
        Ok(())
    }

    /// Deletes a user. The audit entry carries the prior record; undoing it
    /// reinstates the user exactly as deleted.
    pub async fn delete_user(
        &self,
        identity: &Identity,
        shop_id: &str,
        user_id: &str,
        audit: &AuditTrail,
    ) -> EngineResult<()> {
        require_capability(identity, Capability::ManageUsers)?;
        require_shop_access(identity, shop_id)?;

        let prior = self
            .users
            .get(shop_id, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "User".to_string(),
                id: user_id.to_string(),
            })?;
        self.users.delete(shop_id, user_id).await?;

        if let Err(err) = audit
            .record(
                AuditAction::DeleteUser,
                shop_id,
                actor(identity),
                Some(ActorRef {
                    user_id: prior.id.clone(),
                    username: prior.username.clone(),
                }),
                format!("Deleted user {}", prior.username),
                ReversalPayload::UserDelete {
                    prior: prior.clone(),
                },
            )
            .await
        {
            warn!(user_id = %user_id, error = %err, "Audit append failed; reinstating user");
            if let Err(rollback_err) = self.users.upsert(&prior).await {
                warn!(user_id = %user_id, error = %rollback_err, "Delete rollback failed");
            }
            return Err(err);
        }

        info!(user_id = %user_id, shop_id = %shop_id, "User deleted");
        Ok(())
    }

    /// Changes a user's role. Informational audit entry.
    pub async fn change_role(
        &self,
        identity: &Identity,
        shop_id: &str,
        user_id: &str,
        new_role: Role,
        audit: &AuditTrail,
    ) -> EngineResult<()> {
        require_capability(identity, Capability::ManageUsers)?;
        require_shop_access(identity, shop_id)?;

        let prior = self
            .users
            .get(shop_id, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "User".to_string(),
                id: user_id.to_string(),
            })?;

        let mut updated = prior.clone();
        updated.role = new_role;
        self.users.upsert(&updated).await?;

        if let Err(err) = audit
            .record(
                AuditAction::RoleChange,
                shop_id,
                actor(identity),
                Some(ActorRef {
                    user_id: prior.id.clone(),
                    username: prior.username.clone(),
                }),
                format!(
                    "Changed role of {} from {} to {}",
                    prior.username,
                    prior.role.as_str(),
                    new_role.as_str()
                ),
                ReversalPayload::None,
            )
            .await
        {
            warn!(user_id = %user_id, error = %err, "Audit append failed; restoring prior role");
            if let Err(rollback_err) = self.users.upsert(&prior).await {
                warn!(user_id = %user_id, error = %rollback_err, "Role rollback failed");
            }
            return Err(err);
        }

        info!(user_id = %user_id, role = new_role.as_str(), "Role changed");
        Ok(())
    }
}
