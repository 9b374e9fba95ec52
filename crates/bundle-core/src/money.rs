//! # Money Module
//!
//! Provides the `Money` type and the single rounding rule used by every
//! pricing calculation in this crate.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PRORATION WITH INTEGER CENTS                                           │
//! │                                                                         │
//! │  $5.01 discount split across lines worth $30.00 and $25.01:            │
//! │    501 × 3000 / 5501 = 273.22  → 273 cents                             │
//! │    501 × 2501 / 5501 = 227.77  → 228 cents                             │
//! │                          sum  = 501 cents ✓                            │
//! │                                                                         │
//! │  When the independently rounded shares do NOT add up, the difference   │
//! │  (drift) is known exactly and handed to the reconciler.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding Rule
//! Round half up (half away from zero), computed exactly in `i128`.
//! There is no floating point anywhere on the pricing path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::Rate;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numerator` by `denominator` rounding half away from zero.
///
/// ## Example
/// ```rust
/// use bundle_core::money::round_div;
///
/// assert_eq!(round_div(5, 2), 3);    // 2.5  → 3
/// assert_eq!(round_div(-5, 2), -3);  // -2.5 → -3
/// assert_eq!(round_div(7, 3), 2);    // 2.33 → 2
/// ```
///
/// # Panics
/// Panics if `denominator` is zero. Callers check for a zero base first
/// (see `PricingError::ZeroSubtotalProration`).
pub fn round_div(numerator: i128, denominator: i128) -> i128 {
    assert!(denominator != 0, "round_div by zero");

    let negative = (numerator < 0) != (denominator < 0);
    let n = numerator.abs();
    let d = denominator.abs();
    let magnitude = (2 * n + d) / (2 * d);

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// Negative values are discount adjustments; prices and subtotals are
/// never negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use bundle_core::money::Money;
    ///
    /// let price = Money::from_cents(3000); // $30.00
    /// assert_eq!(price.cents(), 3000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from dollars and cents.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use bundle_core::money::Money;
    ///
    /// let unit = Money::from_cents(3000);
    /// assert_eq!(unit.checked_mul_quantity(3), Some(Money::from_cents(9000)));
    /// assert_eq!(Money::from_cents(i64::MAX).checked_mul_quantity(2), None);
    /// ```
    #[inline]
    pub fn checked_mul_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Returns `self × rate`, rounded half up.
    ///
    /// ## Example
    /// ```rust
    /// use bundle_core::money::Money;
    /// use bundle_core::types::Rate;
    ///
    /// let subtotal = Money::from_cents(22500);          // $225.00
    /// let discount = subtotal.percent(Rate::from_percent(20));
    /// assert_eq!(discount.cents(), 4500);               // $45.00
    /// ```
    pub fn percent(&self, rate: Rate) -> Money {
        let cents = round_div(self.0 as i128 * rate.bps() as i128, Rate::FULL_BPS as i128);
        Money(cents as i64)
    }

    /// Returns `self × numerator / denominator`, rounded half up.
    ///
    /// Used to prorate a total across lines in proportion to their share.
    ///
    /// # Panics
    /// Panics if `denominator` is zero.
    pub fn prorate(&self, numerator: i128, denominator: i128) -> Money {
        let cents = round_div(self.0 as i128 * numerator, denominator);
        Money(cents as i64)
    }

    /// Returns `self` as a rate of `base`, rounded half up to a basis point.
    ///
    /// A zero base yields a zero rate.
    pub fn rate_of(&self, base: Money) -> Rate {
        if base.is_zero() {
            return Rate::zero();
        }
        let bps = round_div(self.0 as i128 * Rate::FULL_BPS as i128, base.0 as i128);
        Rate::from_bps(bps.clamp(0, u32::MAX as i128) as u32)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display is for logs and debugging; the front end formats for locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
