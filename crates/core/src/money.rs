use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// A signed amount held at two minor units. Rounding is banker's rounding,
/// which is what `Decimal::round_dp` does. Deserialized values are rounded
/// the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(decimal: Decimal) -> Self {
        Money::from_decimal(decimal)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn from_decimal_uses_bankers_rounding() {
        assert_eq!(Money::from_decimal(dec!(0.125)), Money::from_decimal(dec!(0.12)));
        assert_eq!(Money::from_decimal(dec!(0.135)), Money::from_decimal(dec!(0.14)));
    }

    #[test]
    fn cents_round_trip_through_display() {
        assert_eq!(Money::from_cents(-10000).to_string(), "-100.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn abs_and_sign() {
        let m = Money::from_cents(-4999);
        assert!(m.is_negative());
        assert_eq!(m.abs(), Money::from_cents(4999));
        assert!(!Money::zero().is_negative());
        assert_eq!(-m, Money::from_cents(4999));
    }

    #[test]
    fn sums_exactly() {
        let parts = [Money::from_cents(10971), Money::from_cents(3209)];
        assert_eq!(parts.iter().sum::<Money>(), Money::from_decimal(dec!(141.80)));
    }

    #[test]
    fn deserializes_from_string_and_number() {
        let a: Money = serde_json::from_str("\"-618.26\"").unwrap();
        let b: Money = serde_json::from_str("-618.26").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn deserializing_rounds_to_cents() {
        let m: Money = serde_json::from_str("\"-10.005\"").unwrap();
        assert_eq!(m, Money::from_cents(-1000));
        assert_eq!(m.as_decimal().scale(), 2);
    }
}
