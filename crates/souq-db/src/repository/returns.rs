//! # Return Repository
//!
//! Return request rows, their item lists, and the guarded pending-state
//! resolution that makes approve/reject a one-shot decision.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use souq_core::{CoreResult, ReturnItem, ReturnRequest, ReturnStatus};

use crate::error::DbError;

/// Field bundle for inserting a new return request.
#[derive(Debug)]
pub struct NewReturn<'a> {
    pub code: &'a str,
    pub order_id: i64,
    pub user_id: &'a str,
    pub reason: &'a str,
    pub refund_piastres: i64,
    pub points_to_deduct: i64,
    pub created_at: DateTime<Utc>,
}

/// Inserts a return request and returns its numeric id.
pub async fn insert(conn: &mut SqliteConnection, new: &NewReturn<'_>) -> CoreResult<i64> {
    let result = sqlx::query(
        "INSERT INTO returns
         (code, order_id, user_id, reason, refund_piastres, points_to_deduct,
          status, admin_notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(new.code)
    .bind(new.order_id)
    .bind(new.user_id)
    .bind(new.reason)
    .bind(new.refund_piastres)
    .bind(new.points_to_deduct)
    .bind(ReturnStatus::Pending)
    .bind(new.created_at)
    .bind(new.created_at)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let id = result.last_insert_rowid();
    debug!(return_id = id, code = new.code, order_id = new.order_id, "Return inserted");
    Ok(id)
}

/// Inserts one returned line item.
pub async fn insert_item(
    conn: &mut SqliteConnection,
    return_id: i64,
    product_id: &str,
    quantity: i64,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO return_items (id, return_id, product_id, quantity) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(return_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

const RETURN_COLUMNS: &str = "id, code, order_id, user_id, reason, refund_piastres, \
     points_to_deduct, status, admin_notes, created_at, updated_at";

/// Fetches a return request by numeric id.
pub async fn get(conn: &mut SqliteConnection, return_id: i64) -> CoreResult<Option<ReturnRequest>> {
    let row = sqlx::query_as::<_, ReturnRequest>(&format!(
        "SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?"
    ))
    .bind(return_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Returned line items of a request.
pub async fn items(conn: &mut SqliteConnection, return_id: i64) -> CoreResult<Vec<ReturnItem>> {
    let rows = sqlx::query_as::<_, ReturnItem>(
        "SELECT id, return_id, product_id, quantity FROM return_items WHERE return_id = ?",
    )
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(rows)
}

/// True if a return with this code already exists (code-collision retry).
pub async fn code_exists(conn: &mut SqliteConnection, code: &str) -> CoreResult<bool> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM returns WHERE code = ?")
        .bind(code)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;

    Ok(count > 0)
}

/// Pending returns for an order. At most one is open at a time; the caller
/// enforces that before inserting.
pub async fn pending_for_order(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> CoreResult<Option<ReturnRequest>> {
    let row = sqlx::query_as::<_, ReturnRequest>(&format!(
        "SELECT {RETURN_COLUMNS} FROM returns WHERE order_id = ? AND status = ?"
    ))
    .bind(order_id)
    .bind(ReturnStatus::Pending)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Resolves a pending return to approved or rejected, guarded on the
/// pending state. Returns `false` when it was already resolved.
pub async fn resolve(
    conn: &mut SqliteConnection,
    return_id: i64,
    to: ReturnStatus,
    admin_notes: Option<&str>,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE returns
         SET status = ?, admin_notes = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(to)
    .bind(admin_notes)
    .bind(now)
    .bind(return_id)
    .bind(ReturnStatus::Pending)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let resolved = result.rows_affected() > 0;
    if resolved {
        debug!(return_id, ?to, "Return resolved");
    }
    Ok(resolved)
}
