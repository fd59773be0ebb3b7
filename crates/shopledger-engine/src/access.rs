//! # Access Checks
//!
//! Small helpers shared by every mutating entry point: capability gating and
//! the tenant boundary. Cross-shop access is only ever granted through the
//! explicit platform-admin capability, never through role defaults.

use shopledger_core::{can, ActorRef, Capability, Identity};

use crate::error::{EngineError, EngineResult};

/// Fails with [`EngineError::Forbidden`] unless the identity holds the
/// capability under the override-then-role evaluation rules.
pub(crate) fn require_capability(identity: &Identity, capability: Capability) -> EngineResult<()> {
    if can(identity, capability) {
        Ok(())
    } else {
        Err(EngineError::Forbidden { capability })
    }
}

/// Fails unless the identity may operate on the given shop: either it is the
/// identity's own shop, or the identity carries the platform-admin override.
pub(crate) fn require_shop_access(identity: &Identity, shop_id: &str) -> EngineResult<()> {
    if identity.shop_id == shop_id || can(identity, Capability::PlatformAdmin) {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            capability: Capability::PlatformAdmin,
        })
    }
}

/// The identity as an audit actor snapshot.
pub(crate) fn actor(identity: &Identity) -> ActorRef {
    ActorRef {
        user_id: identity.user_id.clone(),
        username: identity.username.clone(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
