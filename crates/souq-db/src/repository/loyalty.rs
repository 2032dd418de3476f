//! # Loyalty Ledger Repository
//!
//! Append-only point movements plus the denormalized balance on the user
//! row, updated in the same statement pair inside the caller's transaction.
//!
//! ## Movement Catalogue
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  earn     +points   delivery credit (once per order)                   │
//! │  refund   +points   cancelled order / cancelled token                  │
//! │  spend    -points   checkout redemption; guarded, fails if balance     │
//! │                     is too low                                         │
//! │  debit    -points   token creation; guarded, fails if balance is       │
//! │                     too low                                            │
//! │  deduct   -points   reversal of earned points; CLAMPED at zero, the    │
//! │                     ledger entry records the true requested amount     │
//! │  log_token_use  0   audit marker written when a token is consumed      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! On every non-clamping path `balance == sum(ledger amounts)` holds; a
//! clamped deduct is the one sanctioned divergence and the ledger keeps the
//! evidence.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use souq_core::{CoreError, CoreResult, LoyaltyTransaction, LoyaltyTxType};

use crate::error::DbError;

/// Appends a ledger entry. Balance maintenance is the caller's half of the
/// pair; every public mutator below does both.
async fn append(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    tx_type: LoyaltyTxType,
    description: &str,
    order_id: Option<i64>,
    token_code: Option<&str>,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO loyalty_transactions
         (id, user_id, amount, tx_type, description, order_id, token_code, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(amount)
    .bind(tx_type)
    .bind(description)
    .bind(order_id)
    .bind(token_code)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

/// Credits points and logs an `earned` entry.
pub async fn earn(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    description: &str,
    order_id: Option<i64>,
) -> CoreResult<()> {
    credit(conn, user_id, points, LoyaltyTxType::Earned, description, order_id, None).await
}

/// Credits points back and logs a `refund` entry.
pub async fn refund(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    description: &str,
    order_id: Option<i64>,
    token_code: Option<&str>,
) -> CoreResult<()> {
    credit(conn, user_id, points, LoyaltyTxType::Refund, description, order_id, token_code).await
}

async fn credit(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    tx_type: LoyaltyTxType,
    description: &str,
    order_id: Option<i64>,
    token_code: Option<&str>,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE users SET loyalty_points = loyalty_points + ?, updated_at = ? WHERE id = ?",
    )
    .bind(points)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(CoreError::UserNotFound(user_id.to_string()));
    }

    append(conn, user_id, points, tx_type, description, order_id, token_code).await?;
    debug!(user_id, points, ?tx_type, "Loyalty points credited");
    Ok(())
}

/// Spends points at checkout. Guarded: fails with
/// [`CoreError::InsufficientPoints`] when the balance is too low, carrying
/// the balance observed under lock.
pub async fn spend(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    description: &str,
    order_id: Option<i64>,
) -> CoreResult<()> {
    guarded_debit(conn, user_id, points, LoyaltyTxType::Redemption, description, order_id, None)
        .await
}

/// Debits points to mint a redemption token. Same guard as [`spend`].
pub async fn debit_for_token(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    token_code: &str,
) -> CoreResult<()> {
    guarded_debit(
        conn,
        user_id,
        points,
        LoyaltyTxType::Debit,
        "Redemption token created",
        None,
        Some(token_code),
    )
    .await
}

async fn guarded_debit(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    tx_type: LoyaltyTxType,
    description: &str,
    order_id: Option<i64>,
    token_code: Option<&str>,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE users
         SET loyalty_points = loyalty_points - ?, updated_at = ?
         WHERE id = ? AND loyalty_points >= ?",
    )
    .bind(points)
    .bind(Utc::now())
    .bind(user_id)
    .bind(points)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return match balance(conn, user_id).await? {
            None => Err(CoreError::UserNotFound(user_id.to_string())),
            Some(current) => Err(CoreError::InsufficientPoints {
                balance: current,
                requested: points,
            }),
        };
    }

    append(conn, user_id, -points, tx_type, description, order_id, token_code).await?;
    debug!(user_id, points, ?tx_type, "Loyalty points debited");
    Ok(())
}

/// Removes previously earned points, clamping the balance at zero.
///
/// The ledger entry records the full requested amount even when the balance
/// update was clamped, so the reversal stays auditable.
pub async fn deduct(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
    description: &str,
    order_id: Option<i64>,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE users
         SET loyalty_points = MAX(0, loyalty_points - ?), updated_at = ?
         WHERE id = ?",
    )
    .bind(points)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(CoreError::UserNotFound(user_id.to_string()));
    }

    append(conn, user_id, -points, LoyaltyTxType::Deduct, description, order_id, None).await?;
    debug!(user_id, points, "Loyalty points deducted");
    Ok(())
}

/// Writes the zero-point audit marker for a consumed token.
pub async fn log_token_use(
    conn: &mut SqliteConnection,
    user_id: &str,
    token_code: &str,
    order_id: Option<i64>,
) -> CoreResult<()> {
    append(
        conn,
        user_id,
        0,
        LoyaltyTxType::BarcodeUsed,
        "Redemption token used",
        order_id,
        Some(token_code),
    )
    .await
}

/// Current denormalized balance, or `None` for an unknown user.
pub async fn balance(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<Option<i64>> {
    let balance = sqlx::query_scalar::<_, i64>("SELECT loyalty_points FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;

    Ok(balance)
}

/// Sum of all ledger amounts for a user. Audit companion to [`balance`].
pub async fn ledger_sum(conn: &mut SqliteConnection, user_id: &str) -> CoreResult<i64> {
    let sum = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount), 0) FROM loyalty_transactions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(sum)
}

/// Ledger entries for a user, newest first.
pub async fn history(
    conn: &mut SqliteConnection,
    user_id: &str,
    limit: i64,
) -> CoreResult<Vec<LoyaltyTransaction>> {
    let rows = sqlx::query_as::<_, LoyaltyTransaction>(
        "SELECT id, user_id, amount, tx_type, description, order_id, token_code, created_at
         FROM loyalty_transactions
         WHERE user_id = ?
         ORDER BY created_at DESC, id DESC
         LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(rows)
}
