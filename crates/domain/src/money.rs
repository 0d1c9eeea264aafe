//! Fixed-point money in minor units.

use serde::{Deserialize, Serialize};

/// An amount of money in minor units (cents, paise).
///
/// All pricing math stays in integers; percentages are expressed in basis
/// points and rounded half-up to the nearest minor unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates an amount from whole major units (`from_major(50)` is 50.00).
    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Returns `bps / 10_000` of this amount, rounded half away from zero.
    pub fn percent_bps(&self, bps: u32) -> Money {
        let scaled = i128::from(self.0) * i128::from(bps);
        let rounded = if scaled >= 0 {
            (scaled + 5_000) / 10_000
        } else {
            (scaled - 5_000) / 10_000
        };
        Money(rounded as i64)
    }

    /// Limits the amount to `[min, max]`.
    pub fn clamp_to(&self, min: Money, max: Money) -> Money {
        Money(self.0.clamp(min.0, max.0.max(min.0)))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
        assert_eq!(Money::from_major(50).to_string(), "50.00");
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::from_cents(20_000).percent_bps(1_000), Money::from_cents(2_000));
        // 10% of 0.05 is 0.005 -> 0.01
        assert_eq!(Money::from_cents(5).percent_bps(1_000), Money::from_cents(1));
        // 10% of 0.04 is 0.004 -> 0.00
        assert_eq!(Money::from_cents(4).percent_bps(1_000), Money::zero());
    }

    #[test]
    fn clamp_keeps_amount_in_range() {
        let cap = Money::from_major(40);
        assert_eq!(Money::from_major(50).clamp_to(Money::zero(), cap), cap);
        assert_eq!(Money::from_cents(-1).clamp_to(Money::zero(), cap), Money::zero());
        assert_eq!(Money::from_major(10).clamp_to(Money::zero(), cap), Money::from_major(10));
    }

    #[test]
    fn arithmetic_and_sum() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_cents(350));
        assert_eq!(Money::from_cents(999).multiply(3), Money::from_cents(2997));

        let mut m = Money::from_cents(100);
        m -= Money::from_cents(30);
        m += Money::from_cents(5);
        assert_eq!(m.cents(), 75);
    }

    #[test]
    fn serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&Money::from_cents(1500)).unwrap(), "1500");
    }
}
