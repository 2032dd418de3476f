//! # Error Types
//!
//! Domain-specific error types for souq-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  souq-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule failures, machine-checkable kind │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  souq-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ← DbError (converted in souq-db)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every error maps to a machine-checkable [`ErrorKind`]
//! 3. Conflict errors carry the blocking fact (available stock, used-at
//!    timestamp, current balance) so callers can render a precise message
//! 4. Errors are enum variants, never String

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{OrderStatus, ReturnStatus};

// =============================================================================
// Error Kind
// =============================================================================

/// Machine-checkable error classification.
///
/// Every error response carries one of these kinds alongside the
/// human-readable message. The kind decides transactional behavior:
/// `Validation` and `Authorization` abort before any lock is taken,
/// `Conflict` rolls back the surrounding transaction, `Internal` always
/// rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input. Caller error; no mutation attempted.
    Validation,
    /// Referenced order/token/return/user does not exist.
    NotFound,
    /// Precondition failed under lock (stock, slot, token state, window).
    Conflict,
    /// Actor lacks rights over the resource.
    Authorization,
    /// Actor has been auto-blocked by the suspicious-cancellation policy.
    AccountBlocked,
    /// Unexpected failure. Always triggers rollback.
    Internal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations in the order, stock,
/// loyalty, token and return ledgers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Order cannot be found.
    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    /// Redemption token cannot be found.
    #[error("Redemption token not found: {0}")]
    TokenNotFound(String),

    /// Return request cannot be found.
    #[error("Return not found: {0}")]
    ReturnNotFound(i64),

    /// User account cannot be found.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Delivery slot cannot be found.
    #[error("Delivery slot not found: {0}")]
    SlotNotFound(String),

    /// Insufficient stock to reserve.
    ///
    /// ## When This Occurs
    /// - Two orders compete for the last units of a branch-product; the
    ///   loser of the row serialization observes this error
    /// - `available` is `stock_quantity - reserved_quantity` at check time
    #[error("Insufficient stock for product {product_id} at branch {branch_id}: available {available}, requested {requested}")]
    InsufficientStock {
        branch_id: String,
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Loyalty balance too low for the requested debit.
    #[error("Insufficient loyalty points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },

    /// Delivery slot has reached its capacity.
    #[error("Delivery slot {slot_id} is full ({max_orders} orders)")]
    SlotFull { slot_id: String, max_orders: i64 },

    /// Token was already consumed.
    ///
    /// Carries the consumption timestamp so the client can say *when*.
    #[error("Redemption token {code} was already used")]
    TokenAlreadyUsed {
        code: String,
        used_at: Option<DateTime<Utc>>,
    },

    /// Token is past its expiry date.
    #[error("Redemption token {code} expired at {expired_at}")]
    TokenExpired {
        code: String,
        expired_at: DateTime<Utc>,
    },

    /// Token was cancelled by its owner.
    #[error("Redemption token {code} was cancelled")]
    TokenCancelled { code: String },

    /// Order status does not allow customer cancellation.
    #[error("Order in status {status:?} cannot be cancelled")]
    NotCancellable { status: OrderStatus },

    /// Requested status change is not in the transition table.
    #[error("Invalid order status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Return window has elapsed.
    #[error("Return window of {window_days} days elapsed (delivered at {delivered_at})")]
    ReturnWindowElapsed {
        delivered_at: DateTime<Utc>,
        window_days: i64,
    },

    /// Order is not in a returnable status.
    #[error("Order in status {status:?} cannot be returned")]
    NotReturnable { status: OrderStatus },

    /// Return was already approved or rejected.
    #[error("Return is already {status:?}")]
    ReturnAlreadyResolved { status: ReturnStatus },

    /// Actor does not own the resource they are acting on.
    #[error("Not authorized to act on this {resource}")]
    NotOwner { resource: &'static str },

    /// Action requires admin or staff capability.
    #[error("Action '{action}' requires admin capability")]
    AdminRequired { action: &'static str },

    /// Account was auto-blocked by the suspicious-cancellation policy.
    #[error("Account {user_id} is blocked")]
    AccountBlocked { user_id: String },

    /// Unexpected failure; the surrounding transaction was rolled back.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns the machine-checkable kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::OrderNotFound(_)
            | CoreError::TokenNotFound(_)
            | CoreError::ReturnNotFound(_)
            | CoreError::UserNotFound(_)
            | CoreError::SlotNotFound(_) => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. }
            | CoreError::InsufficientPoints { .. }
            | CoreError::SlotFull { .. }
            | CoreError::TokenAlreadyUsed { .. }
            | CoreError::TokenExpired { .. }
            | CoreError::TokenCancelled { .. }
            | CoreError::NotCancellable { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::ReturnWindowElapsed { .. }
            | CoreError::NotReturnable { .. }
            | CoreError::ReturnAlreadyResolved { .. } => ErrorKind::Conflict,
            CoreError::NotOwner { .. } | CoreError::AdminRequired { .. } => {
                ErrorKind::Authorization
            }
            CoreError::AccountBlocked { .. } => ErrorKind::AccountBlocked,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a request payload doesn't meet requirements.
/// Detected before any lock is taken; no mutation is attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be a multiple of a fixed unit (e.g. 1000 points).
    #[error("{field} must be a multiple of {multiple}")]
    NotMultipleOf { field: String, multiple: i64 },

    /// Invalid format (e.g., malformed code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Returned item is not part of the order, or quantity exceeds
    /// the ordered quantity.
    #[error("Returned item {product_id} does not match the order (ordered {ordered}, returned {returned})")]
    ItemNotInOrder {
        product_id: String,
        ordered: i64,
        returned: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            branch_id: "cairo-01".to_string(),
            product_id: "p-42".to_string(),
            available: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-42 at branch cairo-01: available 1, requested 2"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CoreError::OrderNotFound(7).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::SlotFull {
                slot_id: "morning".into(),
                max_orders: 10
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::AccountBlocked {
                user_id: "u1".into()
            }
            .kind(),
            ErrorKind::AccountBlocked
        );
        assert_eq!(
            CoreError::NotOwner { resource: "order" }.kind(),
            ErrorKind::Authorization
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }
}
