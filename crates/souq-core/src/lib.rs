//! # souq-core: Pure Business Logic for the Souq Order Pipeline
//!
//! This crate is the **heart** of the order lifecycle & reservation engine.
//! It contains all business rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Souq Backend Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Transport/API layer (out of scope)                 │   │
//! │  │    authenticates, validates shape, hands over (userId, role)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ★ souq-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  status   │  │  policy   │  │   codes   │  │   │
//! │  │   │  Order    │  │transition │  │ windows,  │  │ ORD-/BRC- │  │   │
//! │  │   │  Token    │  │  tables   │  │thresholds │  │ suffixes  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  souq-db (Ledger Layer)                         │   │
//! │  │   Stock / Loyalty / Token / Slot ledgers, one tx per request   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, StockRow, RedemptionToken, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`status`] - The centralized status transition tables
//! - [`policy`] - Configurable business policy (windows, thresholds, rates)
//! - [`codes`] - Human-readable business code generation
//! - [`error`] - Domain error taxonomy with machine-checkable kinds
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic given its inputs
//!    (code generation excepted, which is explicitly random)
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are piastres (i64), never floats
//! 4. **Closed Statuses**: Transition logic lives in one table, not in
//!    string comparisons scattered across handlers

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codes;
pub mod error;
pub mod money;
pub mod policy;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use souq_core::Money` instead of
// `use souq_core::money::Money`

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use policy::Policies;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single order.
///
/// ## Business Reason
/// Prevents runaway payloads and keeps reservation transactions short.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
