//! # Order Repository
//!
//! Order rows, their line items, and the guarded status moves every
//! lifecycle operation rides on.
//!
//! ## Guarded Status Moves
//! ```text
//! UPDATE orders SET status = :to ... WHERE id = :id AND status = :from
//! ```
//! Zero affected rows means some other request moved the order first; the
//! caller re-reads and reports the conflict against the status it actually
//! found. This is what makes double-delivery (and the double-earn it would
//! imply) impossible.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use souq_core::{CoreResult, Order, OrderItem, OrderStatus};

use crate::error::DbError;

/// Field bundle for inserting a new order row.
#[derive(Debug)]
pub struct NewOrder<'a> {
    pub code: &'a str,
    pub user_id: Option<&'a str>,
    pub branch_id: Option<&'a str>,
    pub status: OrderStatus,
    pub total_piastres: i64,
    pub shipping_piastres: i64,
    pub payment_method: &'a str,
    pub token_code: Option<&'a str>,
    pub coupon_ref: Option<&'a str>,
    pub delivery_slot_id: Option<&'a str>,
    pub points_spent: i64,
    pub created_at: DateTime<Utc>,
}

/// Inserts an order row and returns its numeric id.
pub async fn insert(conn: &mut SqliteConnection, new: &NewOrder<'_>) -> CoreResult<i64> {
    let result = sqlx::query(
        "INSERT INTO orders
         (code, user_id, branch_id, status, total_piastres, shipping_piastres,
          payment_method, token_code, coupon_ref, delivery_slot_id,
          points_earned, points_spent, created_at, updated_at, delivered_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, NULL)",
    )
    .bind(new.code)
    .bind(new.user_id)
    .bind(new.branch_id)
    .bind(new.status)
    .bind(new.total_piastres)
    .bind(new.shipping_piastres)
    .bind(new.payment_method)
    .bind(new.token_code)
    .bind(new.coupon_ref)
    .bind(new.delivery_slot_id)
    .bind(new.points_spent)
    .bind(new.created_at)
    .bind(new.created_at)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let id = result.last_insert_rowid();
    debug!(order_id = id, code = new.code, "Order inserted");
    Ok(id)
}

/// Inserts one line item.
pub async fn insert_item(
    conn: &mut SqliteConnection,
    order_id: i64,
    product_id: &str,
    quantity: i64,
    unit_price_piastres: i64,
    position: i64,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO order_items
         (id, order_id, product_id, quantity, unit_price_piastres, position)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price_piastres)
    .bind(position)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

const ORDER_COLUMNS: &str = "id, code, user_id, branch_id, status, total_piastres, \
     shipping_piastres, payment_method, token_code, coupon_ref, delivery_slot_id, \
     points_earned, points_spent, created_at, updated_at, delivered_at";

/// Fetches an order by numeric id.
pub async fn get(conn: &mut SqliteConnection, order_id: i64) -> CoreResult<Option<Order>> {
    let row = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Fetches an order by its human-readable code.
pub async fn get_by_code(conn: &mut SqliteConnection, code: &str) -> CoreResult<Option<Order>> {
    let row = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE code = ?"
    ))
    .bind(code)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Line items of an order, in position order.
pub async fn items(conn: &mut SqliteConnection, order_id: i64) -> CoreResult<Vec<OrderItem>> {
    let rows = sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, product_id, quantity, unit_price_piastres, position
         FROM order_items
         WHERE order_id = ?
         ORDER BY position ASC",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(rows)
}

/// True if an order with this code already exists (code-collision retry).
pub async fn code_exists(conn: &mut SqliteConnection, code: &str) -> CoreResult<bool> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE code = ?")
        .bind(code)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;

    Ok(count > 0)
}

/// Moves an order `from -> to`, guarded on the current status.
///
/// Returns `false` when the order was no longer in `from`.
pub async fn set_status(
    conn: &mut SqliteConnection,
    order_id: i64,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to)
    .bind(now)
    .bind(order_id)
    .bind(from)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let moved = result.rows_affected() > 0;
    if moved {
        debug!(order_id, ?from, ?to, "Order status moved");
    }
    Ok(moved)
}

/// Moves an order to `delivered`, stamping `delivered_at` and the earned
/// points in the same guarded statement.
pub async fn mark_delivered(
    conn: &mut SqliteConnection,
    order_id: i64,
    from: OrderStatus,
    points_earned: i64,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE orders
         SET status = ?, delivered_at = ?, points_earned = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(OrderStatus::Delivered)
    .bind(now)
    .bind(points_earned)
    .bind(now)
    .bind(order_id)
    .bind(from)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let moved = result.rows_affected() > 0;
    if moved {
        debug!(order_id, points_earned, "Order delivered");
    }
    Ok(moved)
}

/// Orders of a user, newest first.
pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    limit: i64,
) -> CoreResult<Vec<Order>> {
    let rows = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE user_id = ?
         ORDER BY created_at DESC, id DESC
         LIMIT ?"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(rows)
}

/// Records a coupon usage row.
///
/// The coupon engine is an external collaborator; this bookkeeping is
/// best-effort and the caller runs it outside the order's transaction.
pub async fn record_coupon_usage(
    conn: &mut SqliteConnection,
    coupon_ref: &str,
    order_id: i64,
    user_id: Option<&str>,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO coupon_usages (id, coupon_ref, order_id, user_id, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(coupon_ref)
    .bind(order_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}
