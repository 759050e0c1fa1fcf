//! Money types with precise decimal arithmetic
//!
//! The billing system runs in a single currency, so `Money` carries only
//! a `rust_decimal` amount. Two rounding rules exist: prorated prices go to
//! the nearest 0.05, VAT shares to the cent.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// A monetary amount
///
/// Amounts are stored with 4 decimal places internally so intermediate
/// results (VAT shares, prorated prices) keep their precision until they
/// are explicitly rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    amount: Decimal,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount: amount.round_dp(4),
        }
    }

    /// Creates Money from an integer amount in cents
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, 2))
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self { amount: dec!(0) }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Rounds to cents, half away from zero
    pub fn round_to_cents(&self) -> Self {
        Self {
            amount: round_half_away(self.amount, 2),
        }
    }

    /// Rounds to the nearest 0.05, half away from zero
    ///
    /// Computed as `round(2 * x, 1) / 2` so that the result is always an
    /// exact multiple of 0.05.
    pub fn round_to_five_cents(&self) -> Self {
        Self {
            amount: round_to_five_cents(self.amount),
        }
    }

}

/// Rounds a raw decimal to the nearest 0.05, half away from zero
pub fn round_to_five_cents(value: Decimal) -> Decimal {
    let doubled = round_half_away(value * dec!(2), 1);
    (doubled / dec!(2)).normalize().round_dp(2)
}

fn round_half_away(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.amount)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.amount + other.amount)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.amount - other.amount)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount)
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

/// Represents a percentage rate (e.g., a VAT rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.025 for 2.5%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.025 for 2.5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// A zero rate
    pub fn zero() -> Self {
        Self { value: dec!(0) }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Returns true if the rate is zero
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Extracts the share of this rate already included in a gross amount
    ///
    /// `gross * rate / (1 + rate)`, rounded to cents.
    pub fn included_in(&self, gross: &Money) -> Money {
        if self.value.is_zero() {
            return Money::zero();
        }
        let share = gross.amount() * self.value / (Decimal::ONE + self.value);
        Money::new(round_half_away(share, 2))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4).normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50));
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_from_cents() {
        let m = Money::from_cents(10050);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(100.00));
        let b = Money::new(dec!(50.00));

        assert_eq!((a + b).amount(), dec!(150.00));
        assert_eq!((a - b).amount(), dec!(50.00));
        assert_eq!((-a).amount(), dec!(-100.00));
    }

    #[test]
    fn test_five_cent_rounding() {
        assert_eq!(round_to_five_cents(dec!(604.9315)), dec!(604.95));
        assert_eq!(round_to_five_cents(dec!(302.4657)), dec!(302.45));
        assert_eq!(round_to_five_cents(dec!(0.025)), dec!(0.05));
        assert_eq!(round_to_five_cents(dec!(-0.025)), dec!(-0.05));
        assert_eq!(round_to_five_cents(dec!(1200)), dec!(1200));
    }

    #[test]
    fn test_rate_included_in() {
        let rate = Rate::new(dec!(0.025));
        assert_eq!(rate.included_in(&Money::new(dec!(1200))).amount(), dec!(29.27));
        assert_eq!(rate.included_in(&Money::new(dec!(2000))).amount(), dec!(48.78));
        assert!(Rate::zero().included_in(&Money::new(dec!(1200))).is_zero());
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::new(dec!(1.10)), Money::new(dec!(2.20))].iter().sum();
        assert_eq!(total.amount(), dec!(3.30));
    }
}
