//! # Return Service
//!
//! The return/reversal coordinator: a customer requests a return of a
//! delivered order inside the window; an admin approves (wallet refund,
//! point deduction) or rejects (inventory put back the way it was).
//!
//! ## Two-Phase Bookkeeping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_return                resolution                               │
//! │  ─────────────                ──────────                               │
//! │  order: delivered             approve:                                 │
//! │    -> return_requested          return -> approved                     │
//! │  restock returned items         order  -> returned                     │
//! │  refund precomputed             wallet += refund                       │
//! │  (total - border - shipping)    points -= points_to_deduct (clamped)   │
//! │                                                                         │
//! │                               reject:                                  │
//! │                                 return -> rejected                     │
//! │                                 order  -> delivered (delivered_at      │
//! │                                           untouched, no re-earn)       │
//! │                                 un-restock returned items              │
//! │                                                                         │
//! │  Items restock at request time; rejection reverses that restock in    │
//! │  the rejection's own transaction.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

use souq_core::{
    codes, status, validation, CoreError, CoreResult, Order, OrderStatus, Policies, ReturnItem,
    ReturnRequest, ReturnStatus, ValidationError,
};

use crate::notify::{Notifier, NotifyEvent};
use crate::pool::Database;
use crate::repository::{account, loyalty, order, returns, stock};
use crate::service::{Actor, CODE_ATTEMPTS};

// =============================================================================
// DTOs
// =============================================================================

/// Create-return payload: reason plus the returned subset of the order's
/// items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReturnRequest {
    pub order_id: i64,
    pub reason: String,
    pub items: Vec<ReturnItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Return request plus its item list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnSnapshot {
    pub request: ReturnRequest,
    pub items: Vec<ReturnItem>,
}

// =============================================================================
// Service
// =============================================================================

/// Return/reversal orchestration.
#[derive(Clone)]
pub struct ReturnService {
    db: Database,
    policies: Policies,
    notifier: Arc<dyn Notifier>,
}

impl ReturnService {
    pub fn new(db: Database, policies: Policies, notifier: Arc<dyn Notifier>) -> Self {
        ReturnService {
            db,
            policies,
            notifier,
        }
    }

    /// Opens a return for a delivered order (owner only, inside the window).
    ///
    /// The refund is computed and frozen here:
    /// `total - border fee - shipping`, never negative. Returned items go
    /// back on the shelf immediately; the order moves to
    /// `return_requested`.
    pub async fn create_return(
        &self,
        actor: &Actor,
        req: CreateReturnRequest,
    ) -> CoreResult<ReturnSnapshot> {
        validation::validate_reason(&req.reason)?;
        let returns_policy = self.policies.returns;

        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let current = order::get(&mut tx, req.order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(req.order_id))?;
        actor.require_owner(current.user_id.as_deref(), "order")?;

        // Refund and point deduction need an account to land on; guest
        // orders have none.
        let owner_id = current
            .user_id
            .clone()
            .filter(|_| current.has_registered_user())
            .ok_or(CoreError::NotOwner { resource: "order" })?;

        if current.status != OrderStatus::Delivered {
            return Err(CoreError::NotReturnable {
                status: current.status,
            });
        }
        let delivered_at = current.delivered_at.ok_or_else(|| {
            CoreError::Internal(format!("order {} delivered without timestamp", current.id))
        })?;
        if !returns_policy.within_window(delivered_at, now) {
            return Err(CoreError::ReturnWindowElapsed {
                delivered_at,
                window_days: returns_policy.window_days,
            });
        }

        let order_items = order::items(&mut tx, req.order_id).await?;
        let requested: Vec<(String, i64)> = req
            .items
            .iter()
            .map(|i| (i.product_id.clone(), i.quantity))
            .collect();
        validation::validate_return_items(&order_items, &requested)?;

        if returns::pending_for_order(&mut tx, req.order_id).await?.is_some() {
            return Err(CoreError::NotReturnable {
                status: OrderStatus::ReturnRequested,
            });
        }

        let refund = returns_policy.refund_for(current.total(), current.shipping());

        // Items go back on the shelf at request time; rejection reverses.
        if let Some(branch_id) = current.branch_id.as_deref() {
            for (product_id, quantity) in &requested {
                stock::restock(&mut tx, branch_id, product_id, *quantity).await?;
            }
        }

        let code = generate_return_code(&mut tx, now).await?;
        let return_id = returns::insert(
            &mut tx,
            &returns::NewReturn {
                code: &code,
                order_id: req.order_id,
                user_id: &owner_id,
                reason: req.reason.trim(),
                refund_piastres: refund.piastres(),
                points_to_deduct: current.points_earned,
                created_at: now,
            },
        )
        .await?;
        for (product_id, quantity) in &requested {
            returns::insert_item(&mut tx, return_id, product_id, *quantity).await?;
        }

        let moved = order::set_status(
            &mut tx,
            req.order_id,
            OrderStatus::Delivered,
            OrderStatus::ReturnRequested,
            now,
        )
        .await?;
        if !moved {
            let actual = order::get(&mut tx, req.order_id)
                .await?
                .map(|o| o.status)
                .unwrap_or(current.status);
            return Err(CoreError::NotReturnable { status: actual });
        }

        let snapshot = load_snapshot(&mut tx, return_id).await?;
        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(return_id, order_id = req.order_id, "Return requested");
        self.notifier.notify(&NotifyEvent::ReturnRequested {
            return_id,
            order_id: req.order_id,
        });

        Ok(snapshot)
    }

    /// Resolves a pending return (staff capability, one shot).
    ///
    /// Approve credits the frozen refund to the owner's wallet, deducts the
    /// carried points (clamped at zero) and closes the order as `returned`.
    /// Reject takes the restocked items back off the shelf and reverts the
    /// order to `delivered` with its original `delivered_at`.
    pub async fn update_return_status(
        &self,
        actor: &Actor,
        return_id: i64,
        to: ReturnStatus,
        admin_notes: Option<&str>,
    ) -> CoreResult<ReturnSnapshot> {
        actor.require_staff("update_return_status")?;
        if to == ReturnStatus::Pending {
            return Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: "resolution must be approved or rejected".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let request = returns::get(&mut tx, return_id)
            .await?
            .ok_or(CoreError::ReturnNotFound(return_id))?;
        if status::return_is_resolved(request.status) {
            return Err(CoreError::ReturnAlreadyResolved {
                status: request.status,
            });
        }

        let resolved = returns::resolve(&mut tx, return_id, to, admin_notes, now).await?;
        if !resolved {
            let actual = returns::get(&mut tx, return_id)
                .await?
                .map(|r| r.status)
                .unwrap_or(request.status);
            return Err(CoreError::ReturnAlreadyResolved { status: actual });
        }

        let current = order::get(&mut tx, request.order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(request.order_id))?;
        let items = returns::items(&mut tx, return_id).await?;

        match to {
            ReturnStatus::Approved => {
                if request.refund_piastres > 0 {
                    account::credit_wallet(&mut tx, &request.user_id, request.refund_piastres)
                        .await?;
                }
                if request.points_to_deduct > 0 {
                    loyalty::deduct(
                        &mut tx,
                        &request.user_id,
                        request.points_to_deduct,
                        "Delivery points reversed on return",
                        Some(request.order_id),
                    )
                    .await?;
                }
                close_order(&mut tx, &current, OrderStatus::Returned, now).await?;
            }
            ReturnStatus::Rejected => {
                if let Some(branch_id) = current.branch_id.as_deref() {
                    for item in &items {
                        stock::unrestock(&mut tx, branch_id, &item.product_id, item.quantity)
                            .await?;
                    }
                }
                close_order(&mut tx, &current, OrderStatus::Delivered, now).await?;
            }
            ReturnStatus::Pending => unreachable!("rejected above"),
        }

        let snapshot = load_snapshot(&mut tx, return_id).await?;
        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(return_id, ?to, "Return resolved");
        self.notifier.notify(&NotifyEvent::ReturnResolved {
            return_id,
            order_id: request.order_id,
            status: to,
        });

        Ok(snapshot)
    }

    /// Snapshot read: return request plus items (owner or staff).
    pub async fn get_return(&self, actor: &Actor, return_id: i64) -> CoreResult<ReturnSnapshot> {
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(crate::error::DbError::from)?;

        let request = returns::get(&mut conn, return_id)
            .await?
            .ok_or(CoreError::ReturnNotFound(return_id))?;
        actor.require_owner(Some(request.user_id.as_str()), "return")?;

        let items = returns::items(&mut conn, return_id).await?;
        Ok(ReturnSnapshot { request, items })
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn generate_return_code(
    conn: &mut SqliteConnection,
    now: chrono::DateTime<Utc>,
) -> CoreResult<String> {
    for _ in 0..CODE_ATTEMPTS {
        let candidate = codes::generate_return_code(now);
        if !returns::code_exists(conn, &candidate).await? {
            return Ok(candidate);
        }
    }
    Err(CoreError::Internal(
        "return code generation exhausted its attempts".to_string(),
    ))
}

/// Moves the order out of `return_requested`, reporting a conflict against
/// the status actually found if something else moved it first.
async fn close_order(
    conn: &mut SqliteConnection,
    current: &Order,
    to: OrderStatus,
    now: chrono::DateTime<Utc>,
) -> CoreResult<()> {
    let moved =
        order::set_status(conn, current.id, OrderStatus::ReturnRequested, to, now).await?;
    if !moved {
        let actual = order::get(conn, current.id)
            .await?
            .map(|o| o.status)
            .unwrap_or(current.status);
        return Err(CoreError::InvalidTransition { from: actual, to });
    }
    Ok(())
}

async fn load_snapshot(conn: &mut SqliteConnection, return_id: i64) -> CoreResult<ReturnSnapshot> {
    let request = returns::get(conn, return_id)
        .await?
        .ok_or(CoreError::ReturnNotFound(return_id))?;
    let items = returns::items(conn, return_id).await?;
    Ok(ReturnSnapshot { request, items })
}
