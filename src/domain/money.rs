use crate::error::RentalError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

/// A monetary value in whole currency minor units.
///
/// Wraps `rust_decimal::Decimal` so rates and fees never pass through floating
/// point. Values produced by the engine are always whole numbers; fractional
/// intermediates only exist inside [`Money::percent_of`] before rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Builds a money value that must not be negative (rates, deposits, discounts).
    pub fn non_negative(value: Decimal) -> Result<Self, RentalError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RentalError::Validation(format!(
                "amount must not be negative, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Rounds half-up to the nearest whole minor unit.
    pub fn round_half_up(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// `self * rate`, rounded half-up. `rate` is a fraction (0.10 for 10%).
    pub fn percent_of(self, rate: Decimal) -> Self {
        Self(self.0 * rate).round_half_up()
    }

    /// `self - rhs`, floored at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if self.0 > rhs.0 {
            Self(self.0 - rhs.0)
        } else {
            Self::ZERO
        }
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(500000));
        let b = Money::new(dec!(50000));
        assert_eq!(a + b, Money::new(dec!(550000)));
        assert_eq!(a - b, Money::new(dec!(450000)));
        assert_eq!(b * 6, Money::new(dec!(300000)));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(Money::new(dec!(2.5)).round_half_up(), Money::new(dec!(3)));
        assert_eq!(Money::new(dec!(2.49)).round_half_up(), Money::new(dec!(2)));
        assert_eq!(Money::new(dec!(3.5)).round_half_up(), Money::new(dec!(4)));
    }

    #[test]
    fn test_percent_of_rounds_each_fee() {
        // 333,335 * 0.05 = 16,666.75
        assert_eq!(
            Money::new(dec!(333335)).percent_of(dec!(0.05)),
            Money::new(dec!(16667))
        );
        // 15 * 0.10 = 1.5
        assert_eq!(Money::new(dec!(15)).percent_of(dec!(0.10)), Money::new(dec!(2)));
    }

    #[test]
    fn test_non_negative_validation() {
        assert!(Money::non_negative(dec!(0)).is_ok());
        assert!(matches!(
            Money::non_negative(dec!(-1)),
            Err(RentalError::Validation(_))
        ));
    }

    #[test]
    fn test_saturating_sub() {
        let deposit = Money::new(dec!(5000000));
        let fee = Money::new(dec!(230000));
        assert_eq!(deposit.saturating_sub(fee), Money::new(dec!(4770000)));
        assert_eq!(fee.saturating_sub(deposit), Money::ZERO);
    }

    #[test]
    fn test_display_is_normalized() {
        assert_eq!(Money::new(dec!(575000.00)).to_string(), "575000");
    }
}
