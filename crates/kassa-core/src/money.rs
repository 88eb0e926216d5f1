//! # Money
//!
//! Amounts are whole cents in an `i64`. A bill total is re-derived from its
//! cart on every write, so two derivations of the same cart must agree to the
//! cent; floating point sums cannot promise that.
//!
//! ```text
//! unit price (cents) × quantity (f64)  ──round once──►  line amount (cents)
//! Σ line amounts                        ──exact──────►  bill total (cents)
//! ```
//!
//! ```rust
//! use kassa_core::money::Money;
//!
//! let line = Money::from_cents(5000).times(2.0);
//! assert_eq!(line.cents(), 10000);
//!
//! let weighed = Money::from_cents(1999).times(0.5);
//! assert_eq!(weighed.cents(), 1000);
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A monetary value in cents.
///
/// Serializes as a bare integer (`{"price": 5000}`) so the JSON cart and
/// payment documents stay compact, and maps to an INTEGER column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Unit price times a quantity, rounded half away from zero.
    ///
    /// Quantities are fractional for goods sold by weight (`0.35` kg).
    ///
    /// ```rust
    /// use kassa_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).times(3.0).cents(), 897);
    /// assert_eq!(Money::from_cents(1000).times(0.333).cents(), 333);
    /// ```
    pub fn times(&self, quantity: f64) -> Money {
        Money((self.0 as f64 * quantity).round() as i64)
    }
}

/// Plain `units.cents` rendering for logs and CLI output.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

macro_rules! money_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:tt) => {
        impl $trait for Money {
            type Output = Money;

            #[inline]
            fn $method(self, rhs: Money) -> Money {
                Money(self.0 $op rhs.0)
            }
        }

        impl $assign_trait for Money {
            #[inline]
            fn $assign_method(&mut self, rhs: Money) {
                *self = *self $op rhs;
            }
        }
    };
}

money_op!(Add, add, AddAssign, add_assign, +);
money_op!(Sub, sub, SubAssign, sub_assign, -);

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        Money(iter.map(|m| m.0).sum())
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
