//! # Business Policy Configuration
//!
//! Tunable business rules, injected into the services instead of being
//! baked into call sites. Thresholds that look like architecture in the
//! handlers (the 3-strikes flag, the 5-warning block) are plain numbers
//! here and can change per deployment.
//!
//! ## Policies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CancellationPolicy   30-day rolling window, flag at 3, block at 5     │
//! │  ReturnPolicy         7-day return window, fixed border fee            │
//! │  TokenPolicy          1000-point blocks, EGP 35 each, 30-day expiry    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Loyalty Accrual
// =============================================================================

/// Points earned when an order is delivered: `floor(total in EGP)`.
///
/// Guests earn nothing; that check lives with the caller, this is pure math.
#[inline]
pub fn points_for_delivery(total: Money) -> i64 {
    total.whole_pounds().max(0)
}

// =============================================================================
// Cancellation Policy
// =============================================================================

/// Suspicious-cancellation policy.
///
/// Each successful customer cancellation is recorded; when the rolling
/// window holds `flag_threshold` or more, the account takes a warning, and
/// at `block_after_warnings` accumulated warnings it is auto-blocked. The
/// whole evaluation runs inside the cancellation transaction, so the block
/// decision is consistent with the cancellation that triggered it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CancellationPolicy {
    /// Rolling window over which cancellations are counted, in days.
    pub window_days: i64,
    /// Cancellations within the window that earn a warning.
    pub flag_threshold: i64,
    /// Accumulated warnings that block the account.
    pub block_after_warnings: i64,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        CancellationPolicy {
            window_days: 30,
            flag_threshold: 3,
            block_after_warnings: 5,
        }
    }
}

impl CancellationPolicy {
    /// Start of the rolling window, measured back from `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.window_days)
    }
}

// =============================================================================
// Return Policy
// =============================================================================

/// Return window and refund deductions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReturnPolicy {
    /// Days after delivery during which a return may be requested.
    pub window_days: i64,
    /// Fixed border fee deducted from every refund, in piastres.
    pub border_fee_piastres: i64,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        ReturnPolicy {
            window_days: 7,
            border_fee_piastres: 1500, // EGP 15.00
        }
    }
}

impl ReturnPolicy {
    /// True when a return requested at `now` for an order delivered at
    /// `delivered_at` is still inside the window.
    ///
    /// The boundary is inclusive: exactly `window_days` after delivery is
    /// still accepted; one second past is not.
    pub fn within_window(&self, delivered_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - delivered_at <= Duration::days(self.window_days)
    }

    /// Refund amount: `total - border_fee - shipping_fee`, never negative.
    pub fn refund_for(&self, total: Money, shipping: Money) -> Money {
        total
            .saturating_sub(Money::from_piastres(self.border_fee_piastres))
            .saturating_sub(shipping)
    }
}

// =============================================================================
// Token Policy
// =============================================================================

/// Redemption-token denomination and lifetime rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenPolicy {
    /// Minimum points per token; also the block size (`points % block == 0`).
    pub block_points: i64,
    /// EGP of discount per block of points.
    pub egp_per_block: i64,
    /// Token lifetime in days.
    pub ttl_days: i64,
    /// Bounded retries for code-collision regeneration. Exhaustion is an
    /// internal error, never an infinite loop.
    pub code_attempts: u32,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        TokenPolicy {
            block_points: 1000,
            egp_per_block: 35,
            ttl_days: 30,
            code_attempts: 5,
        }
    }
}

impl TokenPolicy {
    /// Discount value for a point amount: `(points / block) * egp_per_block`.
    ///
    /// ## Example
    /// ```rust
    /// use souq_core::policy::TokenPolicy;
    ///
    /// let policy = TokenPolicy::default();
    /// assert_eq!(policy.monetary_value(2000).piastres(), 7000); // EGP 70
    /// ```
    pub fn monetary_value(&self, points: i64) -> Money {
        Money::from_pounds((points / self.block_points) * self.egp_per_block)
    }

    /// Expiry timestamp for a token created at `now`.
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.ttl_days)
    }
}

// =============================================================================
// Aggregate
// =============================================================================

/// All pipeline policies, handed to the services at construction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Policies {
    pub cancellation: CancellationPolicy,
    pub returns: ReturnPolicy,
    pub tokens: TokenPolicy,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_for_delivery_floors() {
        assert_eq!(points_for_delivery(Money::from_piastres(12375)), 123);
        assert_eq!(points_for_delivery(Money::from_piastres(99)), 0);
        assert_eq!(points_for_delivery(Money::zero()), 0);
    }

    #[test]
    fn test_token_monetary_value() {
        let policy = TokenPolicy::default();
        assert_eq!(policy.monetary_value(1000).piastres(), 3500);
        assert_eq!(policy.monetary_value(2000).piastres(), 7000);
        assert_eq!(policy.monetary_value(5000).piastres(), 17500);
    }

    #[test]
    fn test_return_window_boundaries() {
        let policy = ReturnPolicy::default();
        let now = Utc::now();

        // 6 days 23 hours ago: accepted
        let recent = now - Duration::days(6) - Duration::hours(23);
        assert!(policy.within_window(recent, now));

        // 8 days ago: rejected
        let stale = now - Duration::days(8);
        assert!(!policy.within_window(stale, now));
    }

    #[test]
    fn test_refund_deductions() {
        let policy = ReturnPolicy {
            window_days: 7,
            border_fee_piastres: 1500,
        };
        let refund = policy.refund_for(Money::from_piastres(20000), Money::from_piastres(2500));
        assert_eq!(refund.piastres(), 16000);

        // Fees larger than the total clamp at zero, never negative
        let tiny = policy.refund_for(Money::from_piastres(1000), Money::from_piastres(2500));
        assert_eq!(tiny, Money::zero());
    }

    #[test]
    fn test_cancellation_window_start() {
        let policy = CancellationPolicy::default();
        let now = Utc::now();
        assert_eq!(now - policy.window_start(now), Duration::days(30));
    }
}
