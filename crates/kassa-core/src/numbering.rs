//! # Document Numbers
//!
//! Orders, receipts and tills carry human-readable numbers derived from the
//! business day and a per-day sequence. The sequence itself is read from the
//! store inside the inserting transaction; this module only does the
//! encoding.
//!
//! ```text
//! order_num   = YYYYMMDD ‖ company_id ‖ branch_id ‖ daily_count ‖ 0
//!               20261016     001          002           0007      0   → 2026101600100200070
//!                            3 digits     3 digits      4 digits
//!
//! receipt_num = 1 ‖ YYYYMMDD ‖ 0 ‖ daily_count
//!               1   20261016   0       1                            → 12026101601
//!
//! till_no     = YYYYMMDD ‖ daily_id
//!               20261016       1                                    → 202610161
//! ```
//!
//! Order numbers pack several branches into one day, so every field after the
//! date is zero-padded to a fixed width: `(company 1, branch 1, count 11)` and
//! `(company 1, branch 11, count 1)` must not meet on the same digits. Values
//! too wide for their slot are rejected instead of spilling into the next one.
//!
//! For a fixed day and prefix a larger sequence always yields a larger
//! number, so the encodings are collision-free as long as the sequence is.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Largest company id an order number can carry.
pub const MAX_COMPANY_ID: i64 = 999;
/// Largest branch id an order number can carry.
pub const MAX_BRANCH_ID: i64 = 999;
/// Orders a single branch can open in one business day.
pub const MAX_DAILY_ORDERS: i64 = 9_999;

/// Encodes an order number.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use kassa_core::numbering::order_number;
///
/// let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
/// assert_eq!(order_number(day, 1, 2, 7).unwrap(), 2026101600100200070);
/// ```
pub fn order_number(
    day: NaiveDate,
    company_id: i64,
    branch_id: i64,
    daily_count: i64,
) -> ValidationResult<i64> {
    within("company_id", company_id, 0, MAX_COMPANY_ID)?;
    within("branch_id", branch_id, 0, MAX_BRANCH_ID)?;
    positive("daily_count", daily_count)?;
    within("daily_count", daily_count, 1, MAX_DAILY_ORDERS)?;

    encode(
        "order_num",
        format!(
            "{}{:03}{:03}{:04}0",
            day.format("%Y%m%d"),
            company_id,
            branch_id,
            daily_count
        ),
    )
}

/// Encodes a receipt number.
pub fn receipt_number(day: NaiveDate, daily_count: i64) -> ValidationResult<i64> {
    positive("daily_count", daily_count)?;
    encode(
        "receipt_num",
        format!("1{}0{}", day.format("%Y%m%d"), daily_count),
    )
}

/// Encodes a till number.
pub fn till_number(day: NaiveDate, daily_id: i64) -> ValidationResult<i64> {
    positive("daily_id", daily_id)?;
    encode("till_no", format!("{}{}", day.format("%Y%m%d"), daily_id))
}

fn encode(field: &str, digits: String) -> ValidationResult<i64> {
    digits.parse::<i64>().map_err(|e| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("{} does not fit a 64-bit number: {}", digits, e),
    })
}

fn positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn within(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<()> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_order_number_layout() {
        assert_eq!(order_number(day(), 1, 2, 7).unwrap(), 2026101600100200070);
        assert_eq!(order_number(day(), 1, 2, 10).unwrap(), 2026101600100200100);
        assert_eq!(order_number(day(), 999, 999, 9_999).unwrap(), 2026101699999999990);
    }

    #[test]
    fn test_branches_never_share_digits() {
        assert_ne!(order_number(day(), 1, 1, 11).unwrap(), order_number(day(), 1, 11, 1).unwrap());
        assert_ne!(order_number(day(), 11, 1, 1).unwrap(), order_number(day(), 1, 11, 1).unwrap());

        let mut seen = std::collections::HashSet::new();
        for company in [1, 11, 111] {
            for branch in [1, 11, 111] {
                for count in [1, 11, 111, 1111] {
                    assert!(seen.insert(order_number(day(), company, branch, count).unwrap()));
                }
            }
        }
    }

    #[test]
    fn test_order_numbers_increase_with_count() {
        let numbers: Vec<i64> = (1..=120)
            .map(|count| order_number(day(), 3, 14, count).unwrap())
            .collect();
        assert!(numbers.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_receipt_and_till_numbers() {
        assert_eq!(receipt_number(day(), 1).unwrap(), 12026101601);
        assert_eq!(till_number(day(), 1).unwrap(), 202610161);
        assert_eq!(till_number(day(), 12).unwrap(), 2026101612);
    }

    #[test]
    fn test_rejects_zero_sequence() {
        assert!(matches!(
            receipt_number(day(), 0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(order_number(day(), -1, 2, 1).is_err());
    }

    #[test]
    fn test_fields_wider_than_their_slot_are_rejected() {
        assert!(matches!(
            order_number(day(), 1_000, 1, 1),
            Err(ValidationError::OutOfRange { max: 999, .. })
        ));
        assert!(matches!(
            order_number(day(), 1, 1_000, 1),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            order_number(day(), 1, 1, 10_000),
            Err(ValidationError::OutOfRange { max: 9_999, .. })
        ));
    }
}
