//! # Code Generation
//!
//! Human-readable business codes for orders, tokens and returns.
//!
//! ## Format
//! ```text
//! Order:  ORD-20260823-7K3XF       (date prefix + 5-char suffix)
//! Token:  BRC-260823142509-R7MQ    (fixed prefix + time + random)
//! Return: RET-20260823-M4TCK
//! ```
//!
//! The suffix alphabet excludes visually confusable characters
//! (0/O, 1/I/L), so codes survive being read over the phone or typed from
//! a printed receipt.
//!
//! Uniqueness is NOT guaranteed here: these are raw candidates. The token
//! manager re-checks each candidate against existing rows and regenerates on
//! collision, bounded by `TokenPolicy::code_attempts`.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Suffix alphabet: uppercase alphanumerics minus 0/O/1/I/L.
const UNAMBIGUOUS: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Length of the random order/return suffix.
const SUFFIX_LEN: usize = 5;

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..UNAMBIGUOUS.len());
            UNAMBIGUOUS[idx] as char
        })
        .collect()
}

/// Generates an order code candidate: `ORD-YYYYMMDD-XXXXX`.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use souq_core::codes::generate_order_code;
///
/// let code = generate_order_code(Utc::now());
/// assert!(code.starts_with("ORD-"));
/// assert_eq!(code.len(), "ORD-20260823-XXXXX".len());
/// ```
pub fn generate_order_code(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.format("%Y%m%d"), random_suffix(SUFFIX_LEN))
}

/// Generates a redemption-token code candidate:
/// `BRC-` + second-resolution time component + 4-char random component.
///
/// The time component makes candidates from different seconds disjoint, so
/// the collision-retry loop in the token manager only ever races within a
/// single second.
pub fn generate_token_code(now: DateTime<Utc>) -> String {
    format!("BRC-{}-{}", now.format("%y%m%d%H%M%S"), random_suffix(4))
}

/// Generates a return code candidate: `RET-YYYYMMDD-XXXXX`.
pub fn generate_return_code(now: DateTime<Utc>) -> String {
    format!("RET-{}-{}", now.format("%Y%m%d"), random_suffix(SUFFIX_LEN))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_code_shape() {
        let now = Utc::now();
        let code = generate_order_code(now);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], now.format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
    }

    #[test]
    fn test_no_confusable_characters() {
        for _ in 0..200 {
            let code = generate_order_code(Utc::now());
            let suffix = code.rsplit('-').next().unwrap();
            for c in suffix.chars() {
                assert!(
                    !matches!(c, '0' | 'O' | '1' | 'I' | 'L'),
                    "confusable char {c} in {code}"
                );
            }
        }
    }

    #[test]
    fn test_token_code_prefix_and_time() {
        let now = Utc::now();
        let code = generate_token_code(now);
        assert!(code.starts_with("BRC-"));
        assert!(code.contains(&now.format("%y%m%d").to_string()));
    }

    #[test]
    fn test_return_code_shape() {
        let code = generate_return_code(Utc::now());
        assert!(code.starts_with("RET-"));
    }
}
