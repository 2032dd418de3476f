//! # Money Module
//!
//! Provides the `Money` type for handling EGP amounts safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Piastres                                         │
//! │    EGP 123.75 is stored as 12375 (1 EGP = 100 piastres)                │
//! │    All ledger math is exact integer arithmetic                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loyalty ledger earns `floor(total in EGP)` points on delivery, which
//! is [`Money::whole_pounds`] here: EGP 123.75 earns exactly 123 points.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in piastres (the smallest EGP unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds and adjustments
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from piastres.
    ///
    /// ## Example
    /// ```rust
    /// use souq_core::money::Money;
    ///
    /// let total = Money::from_piastres(12375); // EGP 123.75
    /// assert_eq!(total.piastres(), 12375);
    /// ```
    #[inline]
    pub const fn from_piastres(piastres: i64) -> Self {
        Money(piastres)
    }

    /// Creates a Money value from whole pounds.
    #[inline]
    pub const fn from_pounds(pounds: i64) -> Self {
        Money(pounds * 100)
    }

    /// Returns the value in piastres.
    #[inline]
    pub const fn piastres(&self) -> i64 {
        self.0
    }

    /// Returns the whole-pound portion, truncated toward zero.
    ///
    /// This is the loyalty accrual rule: delivering an order with
    /// `total = EGP 123.75` credits `floor(123.75) = 123` points.
    ///
    /// ## Example
    /// ```rust
    /// use souq_core::money::Money;
    ///
    /// assert_eq!(Money::from_piastres(12375).whole_pounds(), 123);
    /// assert_eq!(Money::from_piastres(99).whole_pounds(), 0);
    /// ```
    #[inline]
    pub const fn whole_pounds(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the piastre part (always 0-99).
    #[inline]
    pub const fn piastre_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Subtracts, clamping at zero.
    ///
    /// Used when applying a token discount larger than the remaining total
    /// and when computing refunds net of fees: the result is never negative.
    ///
    /// ## Example
    /// ```rust
    /// use souq_core::money::Money;
    ///
    /// let total = Money::from_piastres(3000);
    /// let discount = Money::from_piastres(3500);
    /// assert_eq!(total.saturating_sub(discount), Money::zero());
    /// ```
    #[inline]
    pub const fn saturating_sub(&self, other: Money) -> Money {
        let diff = self.0 - other.0;
        if diff < 0 {
            Money(0)
        } else {
            Money(diff)
        }
    }

    /// Multiplies money by a quantity (line totals).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and debugging. Localized display belongs to the client.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}EGP {}.{:02}",
            sign,
            self.whole_pounds().abs(),
            self.piastre_part()
        )
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_piastres() {
        let money = Money::from_piastres(12375);
        assert_eq!(money.piastres(), 12375);
        assert_eq!(money.whole_pounds(), 123);
        assert_eq!(money.piastre_part(), 75);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_piastres(12375)), "EGP 123.75");
        assert_eq!(format!("{}", Money::from_piastres(500)), "EGP 5.00");
        assert_eq!(format!("{}", Money::from_piastres(-550)), "-EGP 5.50");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_piastres(1000);
        let b = Money::from_piastres(400);

        assert_eq!((a + b).piastres(), 1400);
        assert_eq!((a - b).piastres(), 600);
        assert_eq!(a.multiply_quantity(3).piastres(), 3000);
    }

    #[test]
    fn test_saturating_sub() {
        let total = Money::from_piastres(3000);
        assert_eq!(
            total.saturating_sub(Money::from_piastres(500)).piastres(),
            2500
        );
        assert_eq!(total.saturating_sub(Money::from_piastres(3500)), Money::zero());
    }

    /// The loyalty accrual floor documented in the ledger rules:
    /// EGP 123.75 earns 123 points, never 124.
    #[test]
    fn test_whole_pounds_floors() {
        assert_eq!(Money::from_piastres(12375).whole_pounds(), 123);
        assert_eq!(Money::from_piastres(12300).whole_pounds(), 123);
        assert_eq!(Money::from_piastres(12399).whole_pounds(), 123);
        assert_eq!(Money::from_piastres(0).whole_pounds(), 0);
    }
}
