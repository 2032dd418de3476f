//! # Redemption Token Repository
//!
//! Row operations for single-use monetary tokens. The single-use guarantee
//! is the guarded UPDATE in [`consume`]: `WHERE status = 'active'` makes
//! two simultaneous uses of the same code serialize to exactly one winner.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use souq_core::{CoreResult, RedemptionToken, TokenStatus};

use crate::error::DbError;

/// Inserts a freshly minted token.
pub async fn insert(conn: &mut SqliteConnection, token: &RedemptionToken) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO redemption_tokens
         (code, user_id, points_value, monetary_piastres, status, expires_at,
          used_by_user_id, used_at, order_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&token.code)
    .bind(&token.user_id)
    .bind(token.points_value)
    .bind(token.monetary_piastres)
    .bind(token.status)
    .bind(token.expires_at)
    .bind(&token.used_by_user_id)
    .bind(token.used_at)
    .bind(token.order_id)
    .bind(token.created_at)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    debug!(code = %token.code, points = token.points_value, "Redemption token inserted");
    Ok(())
}

/// Fetches a token by code.
pub async fn get(conn: &mut SqliteConnection, code: &str) -> CoreResult<Option<RedemptionToken>> {
    let row = sqlx::query_as::<_, RedemptionToken>(
        "SELECT code, user_id, points_value, monetary_piastres, status, expires_at,
                used_by_user_id, used_at, order_id, created_at
         FROM redemption_tokens
         WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(row)
}

/// True if a token with this code already exists (code-collision retry).
pub async fn code_exists(conn: &mut SqliteConnection, code: &str) -> CoreResult<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM redemption_tokens WHERE code = ?",
    )
    .bind(code)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(count > 0)
}

/// Marks an active token used, recording consumer and order.
///
/// Returns `false` when the token was not active anymore; the caller
/// re-reads the row to report the precise conflict.
pub async fn consume(
    conn: &mut SqliteConnection,
    code: &str,
    used_by_user_id: Option<&str>,
    order_id: i64,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE redemption_tokens
         SET status = ?, used_by_user_id = ?, used_at = ?, order_id = ?
         WHERE code = ? AND status = ?",
    )
    .bind(TokenStatus::Used)
    .bind(used_by_user_id)
    .bind(now)
    .bind(order_id)
    .bind(code)
    .bind(TokenStatus::Active)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let won = result.rows_affected() > 0;
    if won {
        debug!(code, order_id, "Redemption token consumed");
    }
    Ok(won)
}

/// Cancels an active token. Returns `false` when it was not active.
pub async fn cancel(conn: &mut SqliteConnection, code: &str) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE redemption_tokens SET status = ? WHERE code = ? AND status = ?",
    )
    .bind(TokenStatus::Cancelled)
    .bind(code)
    .bind(TokenStatus::Active)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let cancelled = result.rows_affected() > 0;
    if cancelled {
        debug!(code, "Redemption token cancelled");
    }
    Ok(cancelled)
}

/// Active tokens owned by a user, soonest-expiring first.
pub async fn list_active_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> CoreResult<Vec<RedemptionToken>> {
    let rows = sqlx::query_as::<_, RedemptionToken>(
        "SELECT code, user_id, points_value, monetary_piastres, status, expires_at,
                used_by_user_id, used_at, order_id, created_at
         FROM redemption_tokens
         WHERE user_id = ? AND status = ?
         ORDER BY expires_at ASC",
    )
    .bind(user_id)
    .bind(TokenStatus::Active)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(rows)
}
