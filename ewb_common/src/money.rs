use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// An amount of money, stored as an integer number of cents.
///
/// All prices, budgets and earnings in the broker are denominated in `Money`. Using integer cents everywhere avoids
/// floating point rounding in statistics and compensation calculations.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 as f64 / 100.0;
        write!(f, "${dollars:0.2}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Returns the given percentage of this amount, rounding towards zero.
    pub fn percent(&self, pct: u8) -> Self {
        Self(self.0 * i64::from(pct) / 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_and_display() {
        let a = Money::from_dollars(12) + Money::from_cents(50);
        assert_eq!(a.value(), 1250);
        assert_eq!(a.to_string(), "$12.50");
        assert_eq!((-a).value(), -1250);
        assert_eq!((a - Money::from_cents(250)).value(), 1000);
        let total: Money = vec![Money::from_cents(100), Money::from_cents(250)].into_iter().sum();
        assert_eq!(total, Money::from_cents(350));
    }

    #[test]
    fn percentages() {
        let price = Money::from_dollars(80);
        assert_eq!(price.percent(50), Money::from_dollars(40));
        assert_eq!(price.percent(0), Money::default());
        assert_eq!(price.percent(100), price);
        assert_eq!(Money::from_cents(99).percent(50), Money::from_cents(49));
    }
}
