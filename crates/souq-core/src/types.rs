//! # Domain Types
//!
//! Core domain types for the Souq order pipeline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │    StockRow     │   │ RedemptionToken │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (numeric)   │   │  branch_id      │   │  code (unique)  │       │
//! │  │  code (human)   │   │  product_id     │   │  points_value   │       │
//! │  │  status         │   │  stock_quantity │   │  status         │       │
//! │  │  total_piastres │   │  reserved_qty   │   │  expires_at     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  UserAccount    │   │ LoyaltyTx (log) │   │  ReturnRequest  │       │
//! │  │  loyalty_points │   │  signed amount  │   │  refund, items  │       │
//! │  │  wallet, block  │   │  append-only    │   │  pending→a/r    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Orders and returns carry both:
//! - `id`: numeric primary key - immutable, used for database relations
//! - `code`: human-readable business id (date prefix + unambiguous suffix)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Actor Role
// =============================================================================

/// Role attached to every already-authenticated request.
///
/// Authentication itself is an external collaborator; the core only
/// receives `(user_id, role)` and enforces capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

impl Role {
    /// Staff and admin hold the fulfillment/resolution capability.
    #[inline]
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// True when the id belongs to a registered (non-guest) user.
///
/// Guest checkout carries either no user id or a `guest_`-prefixed one;
/// guests earn no points, spend no points, and cannot hold tokens.
pub fn is_registered_user(user_id: Option<&str>) -> bool {
    match user_id {
        Some(id) => !id.is_empty() && !id.starts_with("guest_"),
        None => false,
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order.
///
/// The only legal moves are the ones listed in the transition table in
/// [`crate::status`]; every mutator consults that table, never this enum
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting payment confirmation.
    PaymentPending,
    /// Created; stock is reserved but not yet committed.
    Pending,
    /// Accepted; stock committed.
    Confirmed,
    /// In preparation; stock committed.
    Preparing,
    /// Packed and ready for pickup/courier.
    Ready,
    /// Handed to the courier.
    OutForDelivery,
    /// Delivered to the customer. Points are earned here, once.
    Delivered,
    /// A return was requested and is awaiting resolution.
    ReturnRequested,
    /// Return approved; terminal.
    Returned,
    /// Cancelled; terminal.
    Cancelled,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order.
///
/// `items` live in their own table (`OrderItem`) and are immutable after
/// creation except through the return coordinator's bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    /// Human-readable code: date prefix + 5-character unambiguous suffix.
    pub code: String,
    /// Owning user; `None` or `guest_`-prefixed for guest checkout.
    pub user_id: Option<String>,
    pub branch_id: Option<String>,
    pub status: OrderStatus,
    /// Monetary total in piastres, after any token discount.
    pub total_piastres: i64,
    /// Shipping fee in piastres (deducted from return refunds).
    pub shipping_piastres: i64,
    /// Opaque payment method string; gateway integration is out of scope.
    pub payment_method: String,
    /// Redemption token consumed at creation, if any.
    pub token_code: Option<String>,
    /// Opaque coupon reference, if any.
    pub coupon_ref: Option<String>,
    pub delivery_slot_id: Option<String>,
    /// Points credited on first delivery (0 until then).
    pub points_earned: i64,
    /// Points spent at creation (refunded on cancellation).
    pub points_spent: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_piastres(self.total_piastres)
    }

    /// Returns the shipping fee as Money.
    #[inline]
    pub fn shipping(&self) -> Money {
        Money::from_piastres(self.shipping_piastres)
    }

    /// True when the order belongs to a registered (non-guest) user.
    #[inline]
    pub fn has_registered_user(&self) -> bool {
        is_registered_user(self.user_id.as_deref())
    }
}

/// A line item in an order.
///
/// Unit price is a snapshot taken at creation; later catalog changes do
/// not touch existing orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: i64,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_piastres: i64,
    /// Order of the line within the order (items are an ordered sequence).
    pub position: i64,
}

impl OrderItem {
    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_piastres(self.unit_price_piastres).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Stock
// =============================================================================

/// Per (branch, product) inventory record.
///
/// Invariant: `0 <= reserved_quantity` and
/// `reserved_quantity <= stock_quantity`. Available-to-sell is
/// `stock_quantity - reserved_quantity` and never goes negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockRow {
    pub branch_id: String,
    pub product_id: String,
    /// On-hand quantity.
    pub stock_quantity: i64,
    /// Held against pending orders.
    pub reserved_quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRow {
    /// Available-to-sell quantity.
    #[inline]
    pub fn available(&self) -> i64 {
        self.stock_quantity - self.reserved_quantity
    }
}

// =============================================================================
// Loyalty
// =============================================================================

/// Type tag on every loyalty ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTxType {
    /// Points credited on delivery.
    Earned,
    /// Points spent at checkout.
    Redemption,
    /// Points removed on return/cancellation of a delivered order.
    Deduct,
    /// Points given back (cancelled order, cancelled token).
    Refund,
    /// Points debited to create a redemption token.
    Debit,
    /// Zero-point audit entry written when a token is consumed.
    BarcodeUsed,
}

/// Append-only loyalty ledger entry.
///
/// Never mutated or deleted after insertion. The denormalized balance on
/// [`UserAccount`] is updated in the same atomic step as each insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LoyaltyTransaction {
    pub id: String,
    pub user_id: String,
    /// Signed point amount. Records the true requested amount even when the
    /// balance update was clamped at zero.
    pub amount: i64,
    pub tx_type: LoyaltyTxType,
    pub description: String,
    pub order_id: Option<i64>,
    pub token_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The user record fields the order pipeline owns.
///
/// `loyalty_points` is the denormalized balance of the loyalty ledger;
/// `wallet_piastres` receives return refunds; `cancel_warnings` and
/// `is_blocked` belong to the suspicious-cancellation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserAccount {
    pub id: String,
    pub loyalty_points: i64,
    pub wallet_piastres: i64,
    pub cancel_warnings: i64,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Redemption Token ("barcode")
// =============================================================================

/// Lifecycle state of a redemption token.
///
/// `active -> used` and `active -> cancelled` each happen at most once;
/// `used` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Used,
    Cancelled,
}

/// A single-use monetary redemption token, created by debiting loyalty
/// points. The "barcode" of the retail floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RedemptionToken {
    /// Unique alphanumeric code; the public identity of the token.
    pub code: String,
    pub user_id: String,
    /// Points debited at creation. Positive multiple of 1000.
    pub points_value: i64,
    /// Derived discount: `(points_value / 1000) * 35` EGP, in piastres.
    pub monetary_piastres: i64,
    pub status: TokenStatus,
    pub expires_at: DateTime<Utc>,
    pub used_by_user_id: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl RedemptionToken {
    /// Returns the discount value as Money.
    #[inline]
    pub fn monetary_value(&self) -> Money {
        Money::from_piastres(self.monetary_piastres)
    }

    /// True when the token is past its expiry at `now`.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// =============================================================================
// Delivery Slot
// =============================================================================

/// Per-slot capacity counter.
///
/// Invariant: `0 <= current_orders <= max_orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DeliverySlot {
    pub id: String,
    pub max_orders: i64,
    pub current_orders: i64,
}

// =============================================================================
// Returns
// =============================================================================

/// Resolution state of a return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
}

/// A customer return request against a delivered order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReturnRequest {
    pub id: i64,
    pub code: String,
    pub order_id: i64,
    pub user_id: String,
    pub reason: String,
    /// `order.total - border_fee - shipping_fee`, clamped at zero.
    pub refund_piastres: i64,
    /// Carried forward from `order.points_earned` at creation.
    pub points_to_deduct: i64,
    pub status: ReturnStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    /// Returns the refund as Money.
    #[inline]
    pub fn refund(&self) -> Money {
        Money::from_piastres(self.refund_piastres)
    }
}

/// A returned line item (subset of the order's items).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReturnItem {
    pub id: String,
    pub return_id: i64,
    pub product_id: String,
    pub quantity: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_user() {
        assert!(is_registered_user(Some("u-123")));
        assert!(!is_registered_user(Some("guest_9f2")));
        assert!(!is_registered_user(Some("")));
        assert!(!is_registered_user(None));
    }

    #[test]
    fn test_stock_available() {
        let row = StockRow {
            branch_id: "b1".into(),
            product_id: "p1".into(),
            stock_quantity: 10,
            reserved_quantity: 3,
            updated_at: Utc::now(),
        };
        assert_eq!(row.available(), 7);
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let token = RedemptionToken {
            code: "BRC-X".into(),
            user_id: "u1".into(),
            points_value: 2000,
            monetary_piastres: 7000,
            status: TokenStatus::Active,
            expires_at: now - chrono::Duration::days(1),
            used_by_user_id: None,
            used_at: None,
            order_id: None,
            created_at: now - chrono::Duration::days(31),
        };
        assert!(token.is_expired(now));
        assert_eq!(token.monetary_value().piastres(), 7000);
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            id: "i1".into(),
            order_id: 1,
            product_id: "p1".into(),
            quantity: 3,
            unit_price_piastres: 250,
            position: 0,
        };
        assert_eq!(item.line_total().piastres(), 750);
    }
}
