//! # Money Module
//!
//! Monetary values as integer cents, tax rates as basis points, and the
//! discount type shared by catalog items and cart lines.
//!
//! ## Why Integer Money?
//! Floating point loses cents (`0.1 + 0.2 != 0.3`). All monetary values in
//! the system are i64 cents; full precision is retained in storage and
//! calculation, and only display code ever formats to two decimals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so refunds and adjustments can be represented. Zero-cost wrapper
/// over i64 with full serde support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
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

    /// Multiplies by a quantity (line totals).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Calculates tax on this amount.
    ///
    /// Integer math with half-up rounding: `(cents * bps + 5000) / 10000`.
    /// i128 intermediate prevents overflow on large amounts.
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1 bps = 0.01%, so 1000 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage.
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Discount
// =============================================================================

/// A discount stored raw: either a flat amount in cents or a percentage in
/// basis points, with a flag distinguishing the two. Never pre-applied to a
/// stored price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    /// Flat: cents. Percentage: basis points (1000 = 10%).
    pub value: i64,
    /// When true, `value` is interpreted as basis points of the unit price.
    pub is_percentage: bool,
}

impl Discount {
    /// No discount.
    #[inline]
    pub const fn none() -> Self {
        Discount {
            value: 0,
            is_percentage: false,
        }
    }

    /// Flat discount in cents.
    #[inline]
    pub const fn flat_cents(cents: i64) -> Self {
        Discount {
            value: cents,
            is_percentage: false,
        }
    }

    /// Percentage discount in basis points.
    #[inline]
    pub const fn percentage_bps(bps: i64) -> Self {
        Discount {
            value: bps,
            is_percentage: true,
        }
    }

    /// Checks whether this discount has any effect.
    #[inline]
    pub const fn is_none(&self) -> bool {
        self.value == 0
    }

    /// Resolves the discount to a cent amount against a unit price.
    ///
    /// Percentage discounts are resolved as `price * bps / 10000` with
    /// half-up rounding. The result is clamped to `[0, unit_price]`: a
    /// discount can make a line free, never turn it into a payout.
    pub fn resolve(&self, unit_price: Money) -> Money {
        let raw = if self.is_percentage {
            let cents = (unit_price.cents() as i128 * self.value as i128 + 5000) / 10000;
            cents as i64
        } else {
            self.value
        };
        Money::from_cents(raw.clamp(0, unit_price.cents().max(0)))
    }
}

impl Default for Discount {
    fn default() -> Self {
        Discount::none()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-5.50");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
    }

    #[test]
    fn test_tax_calculation_basic() {
        // 10.00 at 10% = 1.00
        let amount = Money::from_cents(1000);
        let tax = amount.calculate_tax(TaxRate::from_bps(1000));
        assert_eq!(tax.cents(), 100);
    }

    #[test]
    fn test_tax_calculation_with_rounding() {
        // 10.00 at 8.25% = 0.825 -> 0.83 half-up
        let amount = Money::from_cents(1000);
        let tax = amount.calculate_tax(TaxRate::from_bps(825));
        assert_eq!(tax.cents(), 83);
    }

    #[test]
    fn test_tax_rate_from_percentage() {
        assert_eq!(TaxRate::from_percentage(8.25).bps(), 825);
        assert_eq!(TaxRate::from_percentage(10.0).bps(), 1000);
    }

    #[test]
    fn test_flat_discount_resolves_unchanged() {
        let discount = Discount::flat_cents(150);
        assert_eq!(discount.resolve(Money::from_cents(1000)).cents(), 150);
    }

    #[test]
    fn test_percentage_discount_resolves_against_price() {
        // 10% of 10.00 = 1.00
        let discount = Discount::percentage_bps(1000);
        assert_eq!(discount.resolve(Money::from_cents(1000)).cents(), 100);

        // 12.5% of 9.99 = 1.24875 -> 1.25 half-up
        let discount = Discount::percentage_bps(1250);
        assert_eq!(discount.resolve(Money::from_cents(999)).cents(), 125);
    }

    #[test]
    fn test_none_discount() {
        let discount = Discount::none();
        assert!(discount.is_none());
        assert_eq!(discount.resolve(Money::from_cents(1000)).cents(), 0);
    }

    #[test]
    fn test_discount_clamped_to_unit_price() {
        // A flat discount bigger than the price caps at the price.
        let oversized = Discount::flat_cents(1500);
        assert_eq!(oversized.resolve(Money::from_cents(1000)).cents(), 1000);

        // Over-100% percentage caps the same way.
        let oversized = Discount::percentage_bps(12_000);
        assert_eq!(oversized.resolve(Money::from_cents(1000)).cents(), 1000);

        // A negative stored value never inflates the price.
        let negative = Discount::flat_cents(-200);
        assert_eq!(negative.resolve(Money::from_cents(1000)).cents(), 0);
    }
}
