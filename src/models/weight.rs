use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// A weight in whole grams.
///
/// Every weight inside the picking core stays in grams; conversion to
/// kilograms happens only when a report is rendered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Grams(i64);

impl Grams {
    pub const ZERO: Grams = Grams(0);

    pub const fn new(grams: i64) -> Self {
        Self(grams)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns the weight only when it is greater than zero.
    pub fn positive(weight: Option<Grams>) -> Option<Grams> {
        weight.filter(|w| w.is_positive())
    }

    /// Weight of `quantity` units at this unit weight.
    pub fn times(self, quantity: i32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Proportional share `numerator / denominator` of this weight, rounded down.
    pub fn share(self, numerator: i32, denominator: i32) -> Self {
        if denominator <= 0 {
            return Self::ZERO;
        }
        Self(self.0.saturating_mul(i64::from(numerator)) / i64::from(denominator))
    }

    /// Presentation value in kilograms.
    pub fn kilograms(self) -> Decimal {
        Decimal::new(self.0, 3)
    }
}

impl fmt::Display for Grams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} g", self.0)
    }
}

impl Add for Grams {
    type Output = Grams;

    fn add(self, rhs: Grams) -> Grams {
        Grams(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Grams {
    fn add_assign(&mut self, rhs: Grams) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Grams {
    type Output = Grams;

    fn sub(self, rhs: Grams) -> Grams {
        Grams(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Grams {
    fn sum<I: Iterator<Item = Grams>>(iter: I) -> Self {
        iter.fold(Grams::ZERO, Add::add)
    }
}

impl From<i64> for Grams {
    fn from(value: i64) -> Self {
        Grams(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn converts_to_kilograms_only_on_request() {
        let w = Grams::new(12_345);
        assert_eq!(w.kilograms(), Decimal::from_str("12.345").unwrap());
        assert_eq!(w.to_string(), "12345 g");
    }

    #[test]
    fn share_rounds_down_and_guards_zero_denominator() {
        let w = Grams::new(1_000);
        assert_eq!(w.share(1, 3), Grams::new(333));
        assert_eq!(w.share(1, 0), Grams::ZERO);
    }

    #[test]
    fn positive_filters_zero() {
        assert_eq!(Grams::positive(Some(Grams::ZERO)), None);
        assert_eq!(Grams::positive(Some(Grams::new(5))), Some(Grams::new(5)));
        assert_eq!(Grams::positive(None), None);
    }

    #[test]
    fn sums_and_multiplies() {
        let total: Grams = [Grams::new(250), Grams::new(750)].into_iter().sum();
        assert_eq!(total, Grams::new(1_000));
        assert_eq!(Grams::new(125).times(4), Grams::new(500));
    }
}
