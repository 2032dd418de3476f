//! # User Account Repository
//!
//! The user-row fields the pipeline owns: wallet credits, cancellation
//! warnings and the auto-block flag of the suspicious-cancellation policy.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use souq_core::{CoreError, CoreResult, UserAccount};

use crate::error::DbError;

/// Fetches a user account, if it exists.
pub async fn get(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<Option<UserAccount>> {
    let row = sqlx::query_as::<_, UserAccount>(
        "SELECT id, loyalty_points, wallet_piastres, cancel_warnings, is_blocked,
                created_at, updated_at
         FROM users
         WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// Fetches a user account or fails with [`CoreError::UserNotFound`].
pub async fn require(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<UserAccount> {
    get(conn, user_id)
        .await?
        .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))
}

/// Creates a user account with zero balances. Used by provisioning and tests.
pub async fn create(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users
         (id, loyalty_points, wallet_piastres, cancel_warnings, is_blocked, created_at, updated_at)
         VALUES (?, 0, 0, 0, 0, ?, ?)",
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

/// Credits the user's wallet (return refunds).
pub async fn credit_wallet(
    conn: &mut SqliteConnection,
    user_id: &str,
    piastres: i64,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE users SET wallet_piastres = wallet_piastres + ?, updated_at = ? WHERE id = ?",
    )
    .bind(piastres)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(CoreError::UserNotFound(user_id.to_string()));
    }

    debug!(user_id, piastres, "Wallet credited");
    Ok(())
}

/// Records one cancellation event for the rolling-window count.
pub async fn record_cancellation(
    conn: &mut SqliteConnection,
    user_id: &str,
    order_id: i64,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO cancellation_events (id, user_id, order_id, created_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(order_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

/// Cancellations by the user since `window_start`, inclusive.
pub async fn cancellations_since(
    conn: &mut SqliteConnection,
    user_id: &str,
    window_start: DateTime<Utc>,
) -> CoreResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM cancellation_events WHERE user_id = ? AND created_at >= ?",
    )
    .bind(user_id)
    .bind(window_start)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(count)
}

/// Increments the warning counter and returns the new count.
pub async fn add_warning(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<i64> {
    let result = sqlx::query(
        "UPDATE users SET cancel_warnings = cancel_warnings + 1, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(CoreError::UserNotFound(user_id.to_string()));
    }

    let count = sqlx::query_scalar::<_, i64>("SELECT cancel_warnings FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;

    warn!(user_id, warnings = count, "Cancellation warning issued");
    Ok(count)
}

/// Blocks the account. Idempotent.
pub async fn block(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<()> {
    let result =
        sqlx::query("UPDATE users SET is_blocked = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(CoreError::UserNotFound(user_id.to_string()));
    }

    warn!(user_id, "Account blocked by cancellation policy");
    Ok(())
}
