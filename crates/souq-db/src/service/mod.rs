//! # Pipeline Services
//!
//! Orchestration layer: one service per lifecycle area, one atomic
//! transaction per operation.
//!
//! ## Request Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate payload + authorize actor   (no lock taken yet)           │
//! │  2. begin transaction                                                  │
//! │  3. guarded ledger mutations via repository functions                  │
//! │  4. commit  ─ or any error rolls the whole request back                │
//! │  5. post-commit: fire-and-forget notification, best-effort bookkeeping │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services never hold mutable in-memory ledger state; the database is the
//! synchronization point (see [`crate::pool`]).

pub mod orders;
pub mod returns;
pub mod tokens;

use souq_core::{is_registered_user, CoreError, CoreResult, Role};

/// Bounded attempts when regenerating a colliding order/return code.
/// Exhaustion is an internal error, never an unbounded loop.
pub(crate) const CODE_ATTEMPTS: u32 = 5;

/// The already-authenticated caller of an operation.
///
/// Authentication is an external collaborator; services receive identity
/// plus role and enforce capability and ownership checks only.
#[derive(Debug, Clone)]
pub struct Actor {
    /// `None` or a `guest_`-prefixed id for guest checkout.
    pub user_id: Option<String>,
    pub role: Role,
}

impl Actor {
    /// A registered customer.
    pub fn customer(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: Some(user_id.into()),
            role: Role::Customer,
        }
    }

    /// An anonymous guest-checkout caller.
    pub fn guest() -> Self {
        Actor {
            user_id: None,
            role: Role::Customer,
        }
    }

    /// A staff member (fulfillment capability).
    pub fn staff(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: Some(user_id.into()),
            role: Role::Staff,
        }
    }

    /// An administrator.
    pub fn admin(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: Some(user_id.into()),
            role: Role::Admin,
        }
    }

    /// True for actors with a registered (non-guest) user id.
    pub fn is_registered(&self) -> bool {
        is_registered_user(self.user_id.as_deref())
    }

    /// The registered user id, or an authorization error for guests.
    pub fn registered_user_id(&self, resource: &'static str) -> CoreResult<&str> {
        match self.user_id.as_deref() {
            Some(id) if is_registered_user(Some(id)) => Ok(id),
            _ => Err(CoreError::NotOwner { resource }),
        }
    }

    /// Fails unless the actor carries the staff/admin capability.
    pub fn require_staff(&self, action: &'static str) -> CoreResult<()> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(CoreError::AdminRequired { action })
        }
    }

    /// Fails unless the actor owns the resource (staff bypasses).
    pub fn require_owner(
        &self,
        resource_user_id: Option<&str>,
        resource: &'static str,
    ) -> CoreResult<()> {
        if self.role.is_staff() {
            return Ok(());
        }
        match (self.user_id.as_deref(), resource_user_id) {
            (Some(actor), Some(owner)) if actor == owner => Ok(()),
            _ => Err(CoreError::NotOwner { resource }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_capabilities() {
        assert!(Actor::staff("s1").require_staff("x").is_ok());
        assert!(Actor::admin("a1").require_staff("x").is_ok());
        assert!(Actor::customer("u1").require_staff("x").is_err());
    }

    #[test]
    fn test_ownership() {
        let actor = Actor::customer("u1");
        assert!(actor.require_owner(Some("u1"), "order").is_ok());
        assert!(actor.require_owner(Some("u2"), "order").is_err());
        assert!(actor.require_owner(None, "order").is_err());

        // Staff bypasses ownership
        assert!(Actor::staff("s1").require_owner(Some("u2"), "order").is_ok());
    }

    #[test]
    fn test_guest_is_not_registered() {
        assert!(!Actor::guest().is_registered());
        assert!(!Actor::customer("guest_abc").is_registered());
        assert!(Actor::customer("u1").is_registered());
    }
}
