//! # Delivery Slot Repository
//!
//! Capacity counters for delivery time slots. `acquire` is a guarded
//! increment: the `current_orders < max_orders` check rides on the UPDATE,
//! so competing orders for the last place in a slot get exactly one winner.

use sqlx::SqliteConnection;
use tracing::debug;

use souq_core::{CoreError, CoreResult, DeliverySlot};

use crate::error::DbError;

/// Fetches a slot by id.
pub async fn get(conn: &mut SqliteConnection, slot_id: &str) -> CoreResult<Option<DeliverySlot>> {
    let row = sqlx::query_as::<_, DeliverySlot>(
        "SELECT id, max_orders, current_orders FROM delivery_slots WHERE id = ?",
    )
    .bind(slot_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Takes one place in the slot, failing if the slot is full or unknown.
pub async fn acquire(conn: &mut SqliteConnection, slot_id: &str) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE delivery_slots
         SET current_orders = current_orders + 1
         WHERE id = ? AND current_orders < max_orders",
    )
    .bind(slot_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(slot_id, "Delivery slot acquired");
        return Ok(());
    }

    match get(conn, slot_id).await? {
        None => Err(CoreError::SlotNotFound(slot_id.to_string())),
        Some(slot) => Err(CoreError::SlotFull {
            slot_id: slot_id.to_string(),
            max_orders: slot.max_orders,
        }),
    }
}

/// Gives a place back (order cancelled while still holding one). Clamped at
/// zero; a slot deleted in the meantime is skipped silently.
pub async fn release(conn: &mut SqliteConnection, slot_id: &str) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE delivery_slots
         SET current_orders = MAX(0, current_orders - 1)
         WHERE id = ?",
    )
    .bind(slot_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() > 0 {
        debug!(slot_id, "Delivery slot released");
    }
    Ok(())
}

/// Inserts or replaces a slot definition. Used by provisioning and tests.
pub async fn upsert(
    conn: &mut SqliteConnection,
    slot_id: &str,
    max_orders: i64,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO delivery_slots (id, max_orders, current_orders)
         VALUES (?, ?, 0)
         ON CONFLICT (id) DO UPDATE SET max_orders = excluded.max_orders",
    )
    .bind(slot_id)
    .bind(max_orders)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}
