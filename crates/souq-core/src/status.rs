//! # Status Transition Tables
//!
//! The single source of truth for every status move in the pipeline.
//! Mutators never compare statuses ad hoc; they ask this module.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Order Status Graph                                 │
//! │                                                                         │
//! │  pending ──┬──► confirmed ──► preparing ──► ready ──► out_for_delivery │
//! │     │      │        │            ▲                          │          │
//! │     │      └────────┼────────────┘                          ▼          │
//! │     │               │                                   delivered      │
//! │     ▼               ▼                                    │   │  │      │
//! │  payment_pending  cancelled ◄────────────────────────────┘   │  │      │
//! │     │   │                                                    │  │      │
//! │     │   └──► cancelled              return_requested ◄───────┘  │      │
//! │     └──► confirmed                    │        │                │      │
//! │                                       ▼        ▼                ▼      │
//! │                                   returned  delivered       returned   │
//! │                                            (reject path)               │
//! │                                                                         │
//! │  Terminal: cancelled, returned                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Customer cancellation is narrower than the admin transition table: once
//! an order is in preparation it can only be undone through the return flow.

use crate::types::{OrderStatus, ReturnStatus, TokenStatus};

// =============================================================================
// Order Transitions
// =============================================================================

/// Returns the statuses reachable from `from` in one legal move.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        PaymentPending => &[Pending, Confirmed, Cancelled],
        Pending => &[PaymentPending, Confirmed, Preparing, Cancelled],
        Confirmed => &[Preparing, Cancelled],
        Preparing => &[Ready],
        Ready => &[OutForDelivery],
        OutForDelivery => &[Delivered],
        Delivered => &[ReturnRequested, Returned, Cancelled],
        ReturnRequested => &[Returned, Delivered],
        Cancelled => &[],
        Returned => &[],
    }
}

/// True when `from -> to` is in the transition table.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// True when the status admits customer-initiated cancellation.
///
/// Orders already committed to fulfillment (`preparing` onward) cannot be
/// cancelled; delivered orders must go through the return flow.
pub fn customer_cancellable(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::PaymentPending | OrderStatus::Pending | OrderStatus::Confirmed
    )
}

/// True while stock for the order is merely reserved, not yet committed.
///
/// Cancelling in these statuses releases the reservation; cancelling after
/// commit must restock instead.
pub fn holds_reservation(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::PaymentPending | OrderStatus::Pending)
}

/// True when stock commit happens on this move (order leaves the
/// reservation-holding statuses into active fulfillment).
pub fn commits_stock(from: OrderStatus, to: OrderStatus) -> bool {
    holds_reservation(from)
        && matches!(to, OrderStatus::Confirmed | OrderStatus::Preparing)
}

/// True for statuses with no outgoing transitions.
pub fn is_terminal(status: OrderStatus) -> bool {
    allowed_transitions(status).is_empty()
}

/// Transitions in or out of `return_requested` belong to the return
/// coordinator; the generic admin transition endpoint rejects them so
/// return bookkeeping (restock, wallet credit, point deduction) cannot
/// be bypassed.
pub fn reserved_for_return_flow(from: OrderStatus, to: OrderStatus) -> bool {
    from == OrderStatus::ReturnRequested || to == OrderStatus::ReturnRequested
}

// =============================================================================
// Token / Return Transitions
// =============================================================================

/// A token leaves `active` at most once; `used` and `cancelled` are terminal.
pub fn token_is_terminal(status: TokenStatus) -> bool {
    matches!(status, TokenStatus::Used | TokenStatus::Cancelled)
}

/// A return is resolved at most once; `approved` and `rejected` are terminal.
pub fn return_is_resolved(status: ReturnStatus) -> bool {
    matches!(status, ReturnStatus::Approved | ReturnStatus::Rejected)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderStatus::*;

    #[test]
    fn test_happy_path_is_legal() {
        assert!(can_transition(Pending, Confirmed));
        assert!(can_transition(Confirmed, Preparing));
        assert!(can_transition(Preparing, Ready));
        assert!(can_transition(Ready, OutForDelivery));
        assert!(can_transition(OutForDelivery, Delivered));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        assert!(is_terminal(Cancelled));
        assert!(is_terminal(Returned));
        assert!(!can_transition(Cancelled, Pending));
        assert!(!can_transition(Returned, Delivered));
    }

    #[test]
    fn test_no_skipping_fulfillment() {
        assert!(!can_transition(Pending, Delivered));
        assert!(!can_transition(Confirmed, OutForDelivery));
        assert!(!can_transition(Preparing, Cancelled));
    }

    #[test]
    fn test_customer_cancellable_set() {
        assert!(customer_cancellable(PaymentPending));
        assert!(customer_cancellable(Pending));
        assert!(customer_cancellable(Confirmed));

        assert!(!customer_cancellable(Preparing));
        assert!(!customer_cancellable(Ready));
        assert!(!customer_cancellable(OutForDelivery));
        assert!(!customer_cancellable(Delivered));
        assert!(!customer_cancellable(Cancelled));
        assert!(!customer_cancellable(Returned));
    }

    #[test]
    fn test_commit_vs_release() {
        assert!(commits_stock(Pending, Confirmed));
        assert!(commits_stock(Pending, Preparing));
        assert!(commits_stock(PaymentPending, Confirmed));
        assert!(!commits_stock(Confirmed, Preparing));

        assert!(holds_reservation(Pending));
        assert!(!holds_reservation(Confirmed));
    }

    #[test]
    fn test_return_flow_reservation() {
        assert!(reserved_for_return_flow(Delivered, ReturnRequested));
        assert!(reserved_for_return_flow(ReturnRequested, Returned));
        assert!(!reserved_for_return_flow(Delivered, Returned));
    }
}
