//! # Transient-Failure Retry
//!
//! Exponential backoff for transient data-access failures.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Retries live at the DATA-ACCESS layer only.                           │
//! │                                                                         │
//! │  attempt 1 ── transient failure ── sleep(base)                         │
//! │  attempt 2 ── transient failure ── sleep(base * 2)                     │
//! │  attempt 3 ── transient failure ── surface the error                   │
//! │                                                                         │
//! │  Business logic above NEVER retries: a failed operation is final       │
//! │  there, because its transaction was rolled back whole and the caller   │
//! │  decides whether to re-submit.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only failures classified transient by [`DbError::is_transient`] (busy
//! database, exhausted pool, dropped connection) are retried; conflicts,
//! not-found and constraint violations surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DbError, DbResult};

/// Default attempt count for transient failures.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default base delay; doubles per attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

/// Runs `op`, retrying transient failures with exponential backoff.
///
/// ## Arguments
/// * `label` - Operation name for log lines
/// * `attempts` - Total attempts including the first (must be >= 1)
/// * `base_delay` - Sleep before the second attempt; doubles each retry
/// * `op` - The fallible operation, re-invoked per attempt
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient database failure, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    // Unreachable: the loop always returns on the last attempt.
    Err(DbError::Internal(format!("{label}: retry loop exhausted")))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, DbError>(42) }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbError::PoolExhausted)
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: DbResult<i32> = with_backoff("test", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::not_found("Order", "1")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let result: DbResult<i32> = with_backoff("test", 2, Duration::from_millis(1), || async {
            Err(DbError::PoolExhausted)
        })
        .await;

        assert!(matches!(result, Err(DbError::PoolExhausted)));
    }
}
