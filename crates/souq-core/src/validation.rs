//! # Validation Module
//!
//! Payload validation for the order pipeline.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Transport/API layer (outside this workspace)                 │
//! │  ├── Shape validation, authentication, rate limiting                   │
//! │  └── Hands the core `(user_id, role)` + typed payloads                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Runs before any lock is taken; failures abort with no mutation    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE / FK constraints, CHECK on quantities           │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::policy::TokenPolicy;
use crate::types::OrderItem;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Order Payload Validators
// =============================================================================

/// Validates a line-item quantity.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price or order total in piastres.
///
/// Zero is allowed (fully discounted orders); negative is not.
pub fn validate_amount_piastres(field: &str, piastres: i64) -> ValidationResult<()> {
    if piastres < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates the item list of a create-order payload.
pub fn validate_item_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if count > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates the opaque payment-method string.
pub fn validate_payment_method(method: &str) -> ValidationResult<()> {
    let method = method.trim();

    if method.is_empty() {
        return Err(ValidationError::Required {
            field: "payment_method".to_string(),
        });
    }

    if method.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "payment_method".to_string(),
            max: 50,
        });
    }

    Ok(())
}

/// Validates a free-text reason (return reason, cancellation reason).
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Loyalty / Token Validators
// =============================================================================

/// Validates a point amount for token creation or checkout spend.
///
/// ## Rules
/// - At least one full block (1000 points by default)
/// - A whole multiple of the block size
pub fn validate_redeem_points(points: i64, policy: &TokenPolicy) -> ValidationResult<()> {
    if points < policy.block_points {
        return Err(ValidationError::OutOfRange {
            field: "points".to_string(),
            min: policy.block_points,
            max: i64::MAX,
        });
    }

    if points % policy.block_points != 0 {
        return Err(ValidationError::NotMultipleOf {
            field: "points".to_string(),
            multiple: policy.block_points,
        });
    }

    Ok(())
}

// =============================================================================
// Return Validators
// =============================================================================

/// Validates that returned items are a subset of the order's items.
///
/// Each returned `(product_id, quantity)` must reference a product in the
/// order with a returned quantity between 1 and the ordered quantity.
pub fn validate_return_items(
    order_items: &[OrderItem],
    returned: &[(String, i64)],
) -> ValidationResult<()> {
    if returned.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    for (product_id, quantity) in returned {
        let ordered = order_items
            .iter()
            .find(|i| &i.product_id == product_id)
            .map(|i| i.quantity)
            .unwrap_or(0);

        if *quantity <= 0 || *quantity > ordered {
            return Err(ValidationError::ItemNotInOrder {
                product_id: product_id.clone(),
                ordered,
                returned: *quantity,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
