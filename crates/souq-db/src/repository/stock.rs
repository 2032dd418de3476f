//! # Stock Ledger Repository
//!
//! Reservation accounting per (branch, product) row.
//!
//! ## Reservation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create order          confirm order            cancel order          │
//! │   ────────────          ─────────────            ────────────          │
//! │   reserve(q)            commit(q)                release(q)            │
//! │   reserved += q         stock    -= q            reserved -= q         │
//! │                         reserved -= q                                   │
//! │                                                                         │
//! │   approve return        reject return                                  │
//! │   ──────────────        ─────────────                                  │
//! │   restock(q)            unrestock(q)                                    │
//! │   stock += q            stock -= q   (undo of a premature restock)     │
//! │                                                                         │
//! │   Invariant at every step: 0 <= reserved <= stock (also enforced by    │
//! │   a CHECK constraint on the table).                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing (branch, product) row is not an error for any of these
//! operations: products without inventory records are simply not
//! stock-tracked, and the mutators skip them silently.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use souq_core::{CoreError, CoreResult, StockRow};

use crate::error::DbError;

/// Fetches a stock row, if inventory is tracked for this branch-product.
pub async fn get(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
) -> CoreResult<Option<StockRow>> {
    let row = sqlx::query_as::<_, StockRow>(
        "SELECT branch_id, product_id, stock_quantity, reserved_quantity, updated_at
         FROM stock
         WHERE branch_id = ? AND product_id = ?",
    )
    .bind(branch_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Reserves `quantity` units against pending fulfillment.
///
/// The availability check rides on the UPDATE itself, so two competing
/// reservations for the last units serialize inside SQLite and exactly one
/// wins; the loser observes zero affected rows and gets
/// [`CoreError::InsufficientStock`] with the available quantity at check
/// time.
///
/// Returns `true` if a reservation was taken, `false` if the product is not
/// stock-tracked at this branch.
pub async fn reserve(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    quantity: i64,
) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE stock
         SET reserved_quantity = reserved_quantity + ?, updated_at = ?
         WHERE branch_id = ? AND product_id = ?
           AND stock_quantity - reserved_quantity >= ?",
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(branch_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(branch_id, product_id, quantity, "Stock reserved");
        return Ok(true);
    }

    // Zero rows: either untracked (skip) or insufficient (conflict).
    match get(conn, branch_id, product_id).await? {
        None => Ok(false),
        Some(row) => Err(CoreError::InsufficientStock {
            branch_id: branch_id.to_string(),
            product_id: product_id.to_string(),
            available: row.available(),
            requested: quantity,
        }),
    }
}

/// Converts a reservation into a sale: on-hand and reserved both drop.
///
/// Runs when an order leaves the reservation-holding statuses for a
/// committed one. Clamped at zero on the reserved side so a repeated or
/// stray commit can never push the row negative.
pub async fn commit(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    quantity: i64,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE stock
         SET stock_quantity = stock_quantity - ?,
             reserved_quantity = MAX(0, reserved_quantity - ?),
             updated_at = ?
         WHERE branch_id = ? AND product_id = ?",
    )
    .bind(quantity)
    .bind(quantity)
    .bind(Utc::now())
    .bind(branch_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(branch_id, product_id, quantity, "Stock committed");
    }
    Ok(())
}

/// Releases a reservation without touching on-hand stock (cancellation of a
/// not-yet-committed order). Clamped at zero.
pub async fn release(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    quantity: i64,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE stock
         SET reserved_quantity = MAX(0, reserved_quantity - ?), updated_at = ?
         WHERE branch_id = ? AND product_id = ?",
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(branch_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(branch_id, product_id, quantity, "Reservation released");
    }
    Ok(())
}

/// Adds units back to on-hand stock (approved return, cancellation of a
/// committed order).
pub async fn restock(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    quantity: i64,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE stock
         SET stock_quantity = stock_quantity + ?, updated_at = ?
         WHERE branch_id = ? AND product_id = ?",
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(branch_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(branch_id, product_id, quantity, "Stock restocked");
    }
    Ok(())
}

/// Subtracts units that a rejected return had prematurely restocked.
///
/// If the units were sold in the meantime the CHECK constraint fires and
/// the surrounding transaction rolls back whole.
pub async fn unrestock(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    quantity: i64,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE stock
         SET stock_quantity = stock_quantity - ?, updated_at = ?
         WHERE branch_id = ? AND product_id = ?",
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(branch_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(branch_id, product_id, quantity, "Restock reversed");
    }
    Ok(())
}

/// Inserts or replaces a stock row. Used by branch provisioning and tests.
pub async fn upsert(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    stock_quantity: i64,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO stock (branch_id, product_id, stock_quantity, reserved_quantity, updated_at)
         VALUES (?, ?, ?, 0, ?)
         ON CONFLICT (branch_id, product_id)
         DO UPDATE SET stock_quantity = excluded.stock_quantity, updated_at = excluded.updated_at",
    )
    .bind(branch_id)
    .bind(product_id)
    .bind(stock_quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}
