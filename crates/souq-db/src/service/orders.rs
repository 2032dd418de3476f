//! # Order Service
//!
//! The order lifecycle: creation with reservations, admin-driven status
//! moves, owner cancellation with the suspicious-cancellation policy, and
//! snapshot reads.
//!
//! ## Creation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate ── blocked check ── reserve stock (ascending product order)  │
//! │     ── acquire slot ── check token ── insert order + items             │
//! │     ── consume token ── spend points ── COMMIT                         │
//! │                                                                         │
//! │  Reservations are taken in ascending product id order so two orders    │
//! │  over the same products contend on rows in the same sequence.         │
//! │                                                                         │
//! │  The order total arrives already priced and discounted by the         │
//! │  upstream pricing step; this service moves the ledgers that total      │
//! │  implies, it does not re-price.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{info, warn};

use souq_core::{
    codes, policy, status, validation, CoreError, CoreResult, Order, OrderItem, OrderStatus,
    Policies, RedemptionToken, TokenStatus, ValidationError,
};

use crate::notify::{Notifier, NotifyEvent};
use crate::pool::Database;
use crate::repository::{account, loyalty, order, slot, stock, token};
use crate::service::{Actor, CODE_ATTEMPTS};

// =============================================================================
// Request / Response DTOs
// =============================================================================

/// One line item of a create-order payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_piastres: i64,
}

/// Create-order payload.
///
/// `total_piastres` is the upstream-priced total after every discount
/// (token, coupon, points) has been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub branch_id: Option<String>,
    pub items: Vec<CreateOrderItem>,
    pub total_piastres: i64,
    #[serde(default)]
    pub shipping_piastres: i64,
    pub payment_method: String,
    /// Redemption token to consume atomically with the order.
    pub token_code: Option<String>,
    /// Opaque coupon reference; usage bookkeeping is best-effort.
    pub coupon_ref: Option<String>,
    pub delivery_slot_id: Option<String>,
    /// Loyalty points to spend directly at checkout (registered users only).
    pub loyalty_points_to_spend: Option<i64>,
}

/// Order plus its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Outcome of an owner cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
    pub order_id: i64,
    /// `points_spent` given back by the cancellation.
    pub points_refunded: i64,
    pub warning_issued: bool,
    pub account_blocked: bool,
}

// =============================================================================
// Service
// =============================================================================

/// Order lifecycle orchestration.
#[derive(Clone)]
pub struct OrderService {
    db: Database,
    policies: Policies,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(db: Database, policies: Policies, notifier: Arc<dyn Notifier>) -> Self {
        OrderService {
            db,
            policies,
            notifier,
        }
    }

    // -------------------------------------------------------------------------
    // create_order
    // -------------------------------------------------------------------------

    /// Creates an order: reserves stock, takes a slot place, consumes the
    /// token and spends the points, all in one transaction.
    pub async fn create_order(
        &self,
        actor: &Actor,
        req: CreateOrderRequest,
    ) -> CoreResult<OrderSnapshot> {
        validate_create_order(actor, &req)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        if let Some(user_id) = registered_id(actor) {
            let user = account::require(&mut tx, user_id).await?;
            if user.is_blocked {
                return Err(CoreError::AccountBlocked {
                    user_id: user_id.to_string(),
                });
            }
        }

        // Ascending product order keeps row contention in one sequence.
        if let Some(branch_id) = req.branch_id.as_deref() {
            let mut sorted: Vec<&CreateOrderItem> = req.items.iter().collect();
            sorted.sort_by(|a, b| a.product_id.cmp(&b.product_id));
            for item in sorted {
                stock::reserve(&mut tx, branch_id, &item.product_id, item.quantity).await?;
            }
        }

        if let Some(slot_id) = req.delivery_slot_id.as_deref() {
            slot::acquire(&mut tx, slot_id).await?;
        }

        // Token pre-checks run before the order row exists; the guarded
        // consume below still decides the winner under concurrency.
        let checked_token = match req.token_code.as_deref() {
            Some(code) => Some(check_token_usable(&mut tx, code, now).await?),
            None => None,
        };

        let code = generate_order_code(&mut tx, now).await?;
        let order_id = order::insert(
            &mut tx,
            &order::NewOrder {
                code: &code,
                user_id: actor.user_id.as_deref(),
                branch_id: req.branch_id.as_deref(),
                status: OrderStatus::Pending,
                total_piastres: req.total_piastres,
                shipping_piastres: req.shipping_piastres,
                payment_method: req.payment_method.trim(),
                token_code: req.token_code.as_deref(),
                coupon_ref: req.coupon_ref.as_deref(),
                delivery_slot_id: req.delivery_slot_id.as_deref(),
                points_spent: req.loyalty_points_to_spend.unwrap_or(0),
                created_at: now,
            },
        )
        .await?;

        for (position, item) in req.items.iter().enumerate() {
            order::insert_item(
                &mut tx,
                order_id,
                &item.product_id,
                item.quantity,
                item.unit_price_piastres,
                position as i64,
            )
            .await?;
        }

        if let Some(tok) = &checked_token {
            consume_token(&mut tx, tok, actor.user_id.as_deref(), order_id, now).await?;
        }

        if let Some(points) = req.loyalty_points_to_spend.filter(|p| *p > 0) {
            let user_id = actor.registered_user_id("loyalty account")?;
            loyalty::spend(&mut tx, user_id, points, "Points spent at checkout", Some(order_id))
                .await?;
        }

        let snapshot = load_snapshot(&mut tx, order_id).await?;
        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(order_id, code = %snapshot.order.code, "Order created");

        if let Some(coupon_ref) = req.coupon_ref.as_deref() {
            self.record_coupon_usage(coupon_ref, order_id, actor.user_id.as_deref())
                .await;
        }

        self.notifier.notify(&NotifyEvent::OrderCreated {
            order_id,
            code: snapshot.order.code.clone(),
            user_id: snapshot.order.user_id.clone(),
        });

        Ok(snapshot)
    }

    // -------------------------------------------------------------------------
    // transition_status
    // -------------------------------------------------------------------------

    /// Moves an order along the status graph (staff capability).
    ///
    /// Side effects ride in the same transaction: leaving the reservation
    /// statuses commits stock, first arrival at `delivered` stamps
    /// `delivered_at` and credits loyalty points, cancellation and the
    /// direct `delivered -> returned` move reverse the appropriate ledgers.
    /// Moves in or out of `return_requested` belong to the return
    /// coordinator and are rejected here.
    pub async fn transition_status(
        &self,
        actor: &Actor,
        order_id: i64,
        to: OrderStatus,
    ) -> CoreResult<OrderSnapshot> {
        actor.require_staff("transition_status")?;

        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let current = order::get(&mut tx, order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(order_id))?;
        let from = current.status;

        if status::reserved_for_return_flow(from, to) || !status::can_transition(from, to) {
            return Err(CoreError::InvalidTransition { from, to });
        }

        let items = order::items(&mut tx, order_id).await?;

        let moved = if to == OrderStatus::Delivered {
            let points = if current.has_registered_user() {
                policy::points_for_delivery(current.total())
            } else {
                0
            };
            let moved = order::mark_delivered(&mut tx, order_id, from, points, now).await?;
            if moved && points > 0 {
                if let Some(user_id) = current.user_id.as_deref() {
                    loyalty::earn(
                        &mut tx,
                        user_id,
                        points,
                        "Points earned on delivery",
                        Some(order_id),
                    )
                    .await?;
                }
            }
            moved
        } else {
            order::set_status(&mut tx, order_id, from, to, now).await?
        };

        if !moved {
            // Lost the guard: someone else moved the order first.
            let actual = order::get(&mut tx, order_id)
                .await?
                .map(|o| o.status)
                .unwrap_or(from);
            return Err(CoreError::InvalidTransition { from: actual, to });
        }

        if status::commits_stock(from, to) {
            if let Some(branch_id) = current.branch_id.as_deref() {
                for item in &items {
                    stock::commit(&mut tx, branch_id, &item.product_id, item.quantity).await?;
                }
            }
        }

        match to {
            OrderStatus::Cancelled => {
                self.reverse_order_ledgers(&mut tx, &current, &items).await?;
            }
            OrderStatus::Returned => {
                // Direct delivered -> returned shortcut: restock and take
                // back the delivery credit.
                restock_items(&mut tx, &current, &items).await?;
                deduct_earned_points(&mut tx, &current).await?;
            }
            _ => {}
        }

        let snapshot = load_snapshot(&mut tx, order_id).await?;
        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(order_id, ?from, ?to, "Order status transitioned");
        self.notifier
            .notify(&NotifyEvent::OrderStatusChanged { order_id, from, to });

        Ok(snapshot)
    }

    // -------------------------------------------------------------------------
    // cancel_order
    // -------------------------------------------------------------------------

    /// Owner cancellation.
    ///
    /// Only orders not yet in preparation can be cancelled. Reservations
    /// (or committed stock), the slot place, spent points and defensively
    /// any earned points are all reversed, and the suspicious-cancellation
    /// policy is evaluated inside the same transaction.
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: i64,
    ) -> CoreResult<CancelOrderResponse> {
        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let current = order::get(&mut tx, order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(order_id))?;
        actor.require_owner(current.user_id.as_deref(), "order")?;

        if !status::customer_cancellable(current.status) {
            return Err(CoreError::NotCancellable {
                status: current.status,
            });
        }

        let moved =
            order::set_status(&mut tx, order_id, current.status, OrderStatus::Cancelled, now)
                .await?;
        if !moved {
            let actual = order::get(&mut tx, order_id)
                .await?
                .map(|o| o.status)
                .unwrap_or(current.status);
            return Err(CoreError::NotCancellable { status: actual });
        }

        let items = order::items(&mut tx, order_id).await?;
        self.reverse_order_ledgers(&mut tx, &current, &items).await?;

        // Suspicious-cancellation policy, inside the same transaction so the
        // block decision is consistent with the cancellation that caused it.
        let mut warning_issued = false;
        let mut account_blocked = false;
        if let Some(user_id) = current.user_id.as_deref().filter(|_| current.has_registered_user())
        {
            let cancellation = self.policies.cancellation;
            account::record_cancellation(&mut tx, user_id, order_id, now).await?;
            let recent =
                account::cancellations_since(&mut tx, user_id, cancellation.window_start(now))
                    .await?;

            if recent >= cancellation.flag_threshold {
                let warnings = account::add_warning(&mut tx, user_id).await?;
                warning_issued = true;
                if warnings >= cancellation.block_after_warnings {
                    account::block(&mut tx, user_id).await?;
                    account_blocked = true;
                }
            }
        }

        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(order_id, warning_issued, account_blocked, "Order cancelled by owner");
        self.notifier.notify(&NotifyEvent::OrderCancelled {
            order_id,
            points_refunded: current.points_spent,
            warning_issued,
        });
        if account_blocked {
            if let Some(user_id) = current.user_id.clone() {
                self.notifier.notify(&NotifyEvent::AccountBlocked { user_id });
            }
        }

        Ok(CancelOrderResponse {
            order_id,
            points_refunded: current.points_spent,
            warning_issued,
            account_blocked,
        })
    }

    // -------------------------------------------------------------------------
    // get_order
    // -------------------------------------------------------------------------

    /// Snapshot read: order plus items (owner or staff).
    pub async fn get_order(&self, actor: &Actor, order_id: i64) -> CoreResult<OrderSnapshot> {
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(crate::error::DbError::from)?;

        let current = order::get(&mut conn, order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(order_id))?;
        actor.require_owner(current.user_id.as_deref(), "order")?;

        let items = order::items(&mut conn, order_id).await?;
        Ok(OrderSnapshot {
            order: current,
            items,
        })
    }

    // -------------------------------------------------------------------------
    // Shared reversal bookkeeping
    // -------------------------------------------------------------------------

    /// Reverses the ledgers an order holds in its current status: the
    /// reservation or committed stock, the slot place, spent points, and
    /// defensively any earned points.
    async fn reverse_order_ledgers(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        current: &Order,
        items: &[OrderItem],
    ) -> CoreResult<()> {
        if let Some(branch_id) = current.branch_id.as_deref() {
            if status::holds_reservation(current.status) {
                for item in items {
                    stock::release(tx, branch_id, &item.product_id, item.quantity).await?;
                }
            } else {
                for item in items {
                    stock::restock(tx, branch_id, &item.product_id, item.quantity).await?;
                }
            }
        }

        if !matches!(current.status, OrderStatus::Delivered) {
            if let Some(slot_id) = current.delivery_slot_id.as_deref() {
                slot::release(tx, slot_id).await?;
            }
        }

        if current.has_registered_user() {
            if let Some(user_id) = current.user_id.as_deref() {
                if current.points_spent > 0 {
                    loyalty::refund(
                        tx,
                        user_id,
                        current.points_spent,
                        "Points refunded on cancellation",
                        Some(current.id),
                        None,
                    )
                    .await?;
                }
                deduct_earned_points(tx, current).await?;
            }
        }

        Ok(())
    }

    /// Best-effort post-commit coupon bookkeeping; failures are logged and
    /// swallowed, never surfaced.
    async fn record_coupon_usage(&self, coupon_ref: &str, order_id: i64, user_id: Option<&str>) {
        let result = async {
            let mut conn = self
                .db
                .pool()
                .acquire()
                .await
                .map_err(crate::error::DbError::from)?;
            order::record_coupon_usage(&mut conn, coupon_ref, order_id, user_id).await
        }
        .await;

        if let Err(err) = result {
            warn!(coupon_ref, order_id, error = %err, "Coupon usage bookkeeping failed");
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn registered_id(actor: &Actor) -> Option<&str> {
    actor.user_id.as_deref().filter(|_| actor.is_registered())
}

fn validate_create_order(actor: &Actor, req: &CreateOrderRequest) -> CoreResult<()> {
    validation::validate_item_count(req.items.len())?;
    for item in &req.items {
        validation::validate_quantity(item.quantity)?;
        validation::validate_amount_piastres("unitPricePiastres", item.unit_price_piastres)?;
    }
    validation::validate_amount_piastres("totalPiastres", req.total_piastres)?;
    validation::validate_amount_piastres("shippingPiastres", req.shipping_piastres)?;
    validation::validate_payment_method(&req.payment_method)?;

    if let Some(points) = req.loyalty_points_to_spend {
        if points < 0 {
            return Err(ValidationError::MustBePositive {
                field: "loyaltyPointsToSpend".to_string(),
            }
            .into());
        }
        if points > 0 && !actor.is_registered() {
            return Err(CoreError::NotOwner {
                resource: "loyalty account",
            });
        }
    }

    Ok(())
}

/// Generates an order code, regenerating on the rare same-day collision.
async fn generate_order_code(
    conn: &mut SqliteConnection,
    now: chrono::DateTime<Utc>,
) -> CoreResult<String> {
    for _ in 0..CODE_ATTEMPTS {
        let candidate = codes::generate_order_code(now);
        if !order::code_exists(conn, &candidate).await? {
            return Ok(candidate);
        }
    }
    Err(CoreError::Internal(
        "order code generation exhausted its attempts".to_string(),
    ))
}

/// Fetches a token and verifies it is usable right now.
async fn check_token_usable(
    conn: &mut SqliteConnection,
    code: &str,
    now: chrono::DateTime<Utc>,
) -> CoreResult<RedemptionToken> {
    let tok = token::get(conn, code)
        .await?
        .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;

    match tok.status {
        TokenStatus::Used => Err(CoreError::TokenAlreadyUsed {
            code: code.to_string(),
            used_at: tok.used_at,
        }),
        TokenStatus::Cancelled => Err(CoreError::TokenCancelled {
            code: code.to_string(),
        }),
        TokenStatus::Active if tok.is_expired(now) => Err(CoreError::TokenExpired {
            code: code.to_string(),
            expired_at: tok.expires_at,
        }),
        TokenStatus::Active => Ok(tok),
    }
}

/// Guarded consume plus the owner's zero-point audit entry. Losing the
/// guard means a concurrent use won; the conflict is reported against the
/// state actually found.
async fn consume_token(
    conn: &mut SqliteConnection,
    tok: &RedemptionToken,
    used_by: Option<&str>,
    order_id: i64,
    now: chrono::DateTime<Utc>,
) -> CoreResult<()> {
    let won = token::consume(conn, &tok.code, used_by, order_id, now).await?;
    if !won {
        let current = token::get(conn, &tok.code)
            .await?
            .ok_or_else(|| CoreError::TokenNotFound(tok.code.clone()))?;
        return Err(match current.status {
            TokenStatus::Cancelled => CoreError::TokenCancelled {
                code: tok.code.clone(),
            },
            _ => CoreError::TokenAlreadyUsed {
                code: tok.code.clone(),
                used_at: current.used_at,
            },
        });
    }

    loyalty::log_token_use(conn, &tok.user_id, &tok.code, Some(order_id)).await
}

async fn restock_items(
    conn: &mut SqliteConnection,
    current: &Order,
    items: &[OrderItem],
) -> CoreResult<()> {
    if let Some(branch_id) = current.branch_id.as_deref() {
        for item in items {
            stock::restock(conn, branch_id, &item.product_id, item.quantity).await?;
        }
    }
    Ok(())
}

/// Takes back the delivery credit, clamped at zero if already spent.
async fn deduct_earned_points(conn: &mut SqliteConnection, current: &Order) -> CoreResult<()> {
    if current.points_earned > 0 && current.has_registered_user() {
        if let Some(user_id) = current.user_id.as_deref() {
            loyalty::deduct(
                conn,
                user_id,
                current.points_earned,
                "Delivery points reversed",
                Some(current.id),
            )
            .await?;
        }
    }
    Ok(())
}

async fn load_snapshot(conn: &mut SqliteConnection, order_id: i64) -> CoreResult<OrderSnapshot> {
    let current = order::get(conn, order_id)
        .await?
        .ok_or(CoreError::OrderNotFound(order_id))?;
    let items = order::items(conn, order_id).await?;
    Ok(OrderSnapshot {
        order: current,
        items,
    })
}
