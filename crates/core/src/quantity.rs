//! Fixed-precision quantities and prices.
//!
//! Stock is counted in `rust_decimal::Decimal`, never floating point, so a
//! request equal to the total on hand leaves every contributing balance at
//! exactly zero.

use core::iter::Sum;
use core::ops::Add;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Maximum number of fractional digits a stock quantity may carry.
pub const QUANTITY_SCALE: u32 = 2;

/// Largest quantity a single request or balance row may hold (10^15).
///
/// Sums of capped quantities stay far inside `Decimal`'s range.
pub const QUANTITY_MAX: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

/// A non-negative stock quantity with at most [`QUANTITY_SCALE`] decimals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        if value.normalize().scale() > QUANTITY_SCALE {
            return Err(DomainError::validation(format!(
                "quantity {value} has more than {QUANTITY_SCALE} decimal places"
            )));
        }
        if value > QUANTITY_MAX {
            return Err(DomainError::validation(format!(
                "quantity {value} exceeds the maximum of {QUANTITY_MAX}"
            )));
        }
        Ok(Self(value.abs()))
    }

    /// Parse and require a strictly positive amount (issue, receipt, transfer).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        let q = Self::new(value)?;
        q.ensure_positive()?;
        Ok(q)
    }

    pub fn ensure_positive(self) -> DomainResult<Self> {
        if self.is_zero() {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Ok(self)
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        !self.is_zero()
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    /// `self - other`, or `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            return None;
        }
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// Apply a signed change, refusing to go below zero.
    ///
    /// This is the only way a balance moves; there is no clamping path.
    pub fn apply_signed(self, delta: Decimal) -> DomainResult<Quantity> {
        let next = self
            .0
            .checked_add(delta)
            .ok_or_else(|| DomainError::invariant("quantity overflow"))?;
        if next.is_sign_negative() && !next.is_zero() {
            return Err(DomainError::NegativeBalance {
                balance: self,
                delta,
            });
        }
        if next > QUANTITY_MAX {
            return Err(DomainError::validation(format!(
                "balance {next} would exceed the maximum of {QUANTITY_MAX}"
            )));
        }
        Ok(Quantity(next.abs()))
    }

    /// Signed difference `self - earlier`.
    pub fn signed_diff(self, earlier: Quantity) -> Decimal {
        self.0 - earlier.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self {
        Quantity(Decimal::from(value))
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid quantity '{s}': {e}")))?;
        Quantity::new(value)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// A non-negative monetary amount (unit cost, default price).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "amount cannot be negative (got {value})"
            )));
        }
        Ok(Self(value.abs()))
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl ValueObject for Money {}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_negative_and_over_precise_values() {
        assert!(matches!(
            Quantity::new(dec!(-1)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Quantity::new(dec!(0.001)),
            Err(DomainError::Validation(_))
        ));
        // Trailing zeros beyond the scale are fine once normalised.
        assert_eq!(Quantity::new(dec!(1.2500)).unwrap(), Quantity::new(dec!(1.25)).unwrap());
    }

    #[test]
    fn magnitude_is_capped() {
        assert_eq!(QUANTITY_MAX, Decimal::from(1_000_000_000_000_000i64));
        assert!(Quantity::new(QUANTITY_MAX).is_ok());
        assert!(matches!(
            Quantity::new(Decimal::MAX),
            Err(DomainError::Validation(_))
        ));

        let full = Quantity::new(QUANTITY_MAX).unwrap();
        assert!(matches!(
            full.apply_signed(Decimal::ONE),
            Err(DomainError::Validation(_))
        ));

        // Summing capped values stays exact.
        let total: Quantity = std::iter::repeat_n(full, 3).sum();
        assert_eq!(total.value(), QUANTITY_MAX * Decimal::from(3));
    }

    #[test]
    fn positive_rejects_zero() {
        assert!(Quantity::positive(Decimal::ZERO).is_err());
        assert!(Quantity::positive(dec!(0.01)).is_ok());
    }

    #[test]
    fn apply_signed_never_clamps() {
        let q = Quantity::new(dec!(3)).unwrap();
        let err = q.apply_signed(dec!(-3.01)).unwrap_err();
        assert_eq!(
            err,
            DomainError::NegativeBalance {
                balance: q,
                delta: dec!(-3.01)
            }
        );
        assert_eq!(q.apply_signed(dec!(-3)).unwrap(), Quantity::ZERO);
    }

    #[test]
    fn decimal_sums_have_no_drift() {
        let tenth = Quantity::new(dec!(0.1)).unwrap();
        let total: Quantity = std::iter::repeat_n(tenth, 10).sum();
        assert_eq!(total, Quantity::from(1));
        assert_eq!(total.checked_sub(Quantity::from(1)), Some(Quantity::ZERO));
    }

    #[test]
    fn serde_rejects_invalid_quantities() {
        let ok: Quantity = serde_json::from_str("\"2.5\"").unwrap();
        assert_eq!(ok, Quantity::new(dec!(2.5)).unwrap());
        assert!(serde_json::from_str::<Quantity>("\"-2\"").is_err());
    }

    #[test]
    fn parses_from_str() {
        assert_eq!("  4.20 ".parse::<Quantity>().unwrap(), Quantity::new(dec!(4.2)).unwrap());
        assert!("four".parse::<Quantity>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: adding then subtracting the same amount returns the start value.
        #[test]
        fn add_then_sub_is_identity(a in 0i64..10_000_000, b in 0i64..10_000_000) {
            let qa = Quantity::new(Decimal::new(a, 2)).unwrap();
            let qb = Quantity::new(Decimal::new(b, 2)).unwrap();
            let sum = qa.checked_add(qb).unwrap();
            prop_assert_eq!(sum.checked_sub(qb), Some(qa));
            prop_assert_eq!(sum.signed_diff(qa), qb.value());
        }
    }
}
