use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------     MinorUnits       ---------------------------------------------------------
/// An amount of money in the minor unit of its currency (cents, kobo, ...).
///
/// The currency itself always travels alongside the amount (on the order, payment or ledger row); this type only
/// guarantees that arithmetic never silently goes through floating point. The operators are for amounts already known
/// to be in range; anything derived from user input (prices times quantities, order totals) goes through the
/// `checked_*` methods.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, AddAssign, add_assign);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for MinorUnits {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MoneyConversionError(format!("Value {value} is too large to convert to MinorUnits")))
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MinorUnits {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// The amount times `qty`, e.g. a unit price times a quantity.
    pub fn checked_mul(self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Self)
    }

    /// Sums the amounts, or returns `None` if the sum does not fit.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(amounts: I) -> Option<Self> {
        amounts.into_iter().try_fold(Self::zero(), Self::checked_add)
    }

    /// Restricts the amount to the inclusive range `[0, max]`.
    pub fn clamp_to(self, max: MinorUnits) -> Self {
        Self(self.0.clamp(0, max.0.max(0)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = MinorUnits::from(1000);
        let b = MinorUnits::from(500).checked_mul(2).unwrap();
        assert_eq!(a + b, MinorUnits::from(2000));
        assert_eq!(a - b, MinorUnits::zero());
        let total: MinorUnits = [a, b, MinorUnits::from(300)].into_iter().sum();
        assert_eq!(total.value(), 2300);
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        assert_eq!(MinorUnits::from(i64::MAX / 2).checked_mul(3), None);
        assert_eq!(MinorUnits::from(i64::MAX).checked_add(MinorUnits::from(1)), None);
        assert_eq!(MinorUnits::from(i64::MIN).checked_sub(MinorUnits::from(1)), None);
        let amounts = [MinorUnits::from(i64::MAX), MinorUnits::from(1)];
        assert_eq!(MinorUnits::checked_sum(amounts), None);
        let amounts = [MinorUnits::from(2000), MinorUnits::from(300)];
        assert_eq!(MinorUnits::checked_sum(amounts), Some(MinorUnits::from(2300)));
    }

    #[test]
    fn clamping() {
        assert_eq!(MinorUnits::from(-5).clamp_to(MinorUnits::from(10)), MinorUnits::zero());
        assert_eq!(MinorUnits::from(50).clamp_to(MinorUnits::from(10)), MinorUnits::from(10));
        assert_eq!(MinorUnits::from(7).clamp_to(MinorUnits::from(10)), MinorUnits::from(7));
    }

    #[test]
    fn from_u64() {
        assert!(MinorUnits::try_from(u64::MAX).is_err());
        assert_eq!(MinorUnits::try_from(42u64).unwrap(), MinorUnits::from(42));
    }
}
