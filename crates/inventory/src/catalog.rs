//! Units, substances and unit-scoped minimum-stock overrides.
//!
//! Catalog maintenance (forms, admin screens) belongs to the callers; the
//! core only needs to read these records and enforce their flags.

use serde::{Deserialize, Serialize};

use pharmastock_core::{DomainError, DomainResult, Entity, Money, Quantity, SubstanceId, UnitId};

/// Default minimum-stock threshold for a new substance.
pub const DEFAULT_MINIMUM: u32 = 1;

/// Default expiry-alert window, in days.
pub const DEFAULT_EXPIRY_ALERT_DAYS: u32 = 90;

/// A physical site holding its own inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub code: String,
    pub name: String,
    pub active: bool,
}

impl Unit {
    pub fn new(id: UnitId, code: impl Into<String>, name: impl Into<String>) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("unit code cannot be empty"));
        }
        Ok(Self {
            id,
            code,
            name: name.into(),
            active: true,
        })
    }

    /// Stock operations against an inactive unit are rejected.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::validation(format!("unit {} is inactive", self.code)));
        }
        Ok(())
    }
}

impl Entity for Unit {
    type Id = UnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A trackable item (drug, consumable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substance {
    pub id: SubstanceId,
    pub name: String,
    /// Unit of measure, e.g. "ampoule", "ml".
    pub measure: String,
    pub default_minimum: Quantity,
    pub expiry_alert_days: u32,
    pub default_price: Money,
}

impl Substance {
    pub fn new(id: SubstanceId, name: impl Into<String>, measure: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("substance name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            measure: measure.into(),
            default_minimum: Quantity::from(DEFAULT_MINIMUM),
            expiry_alert_days: DEFAULT_EXPIRY_ALERT_DAYS,
            default_price: Money::ZERO,
        })
    }

    pub fn with_minimum(mut self, minimum: Quantity) -> Self {
        self.default_minimum = minimum;
        self
    }

    pub fn with_expiry_alert_days(mut self, days: u32) -> DomainResult<Self> {
        if days == 0 {
            return Err(DomainError::validation("expiry alert window must be at least one day"));
        }
        self.expiry_alert_days = days;
        Ok(self)
    }
}

impl Entity for Substance {
    type Id = SubstanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Unit-specific minimum-stock threshold; at most one per (substance, unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMinimumOverride {
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub minimum: Quantity,
    pub active: bool,
}

/// Active override if present, else the substance default.
pub fn effective_minimum(substance: &Substance, unit_override: Option<&UnitMinimumOverride>) -> Quantity {
    match unit_override {
        Some(o) if o.active => o.minimum,
        _ => substance.default_minimum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn substance() -> Substance {
        Substance::new(SubstanceId::new(), "Semaglutide", "pen")
            .unwrap()
            .with_minimum(Quantity::from(5))
    }

    #[test]
    fn override_wins_only_when_active() {
        let s = substance();
        let mut o = UnitMinimumOverride {
            substance_id: s.id,
            unit_id: UnitId::new(),
            minimum: Quantity::new(dec!(2.5)).unwrap(),
            active: true,
        };
        assert_eq!(effective_minimum(&s, Some(&o)), Quantity::new(dec!(2.5)).unwrap());

        o.active = false;
        assert_eq!(effective_minimum(&s, Some(&o)), Quantity::from(5));
        assert_eq!(effective_minimum(&s, None), Quantity::from(5));
    }

    #[test]
    fn inactive_unit_is_rejected() {
        let mut unit = Unit::new(UnitId::new(), "SP01", "Sao Paulo").unwrap();
        assert!(unit.ensure_active().is_ok());
        unit.active = false;
        assert!(matches!(unit.ensure_active(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn alert_window_must_be_positive() {
        assert!(substance().with_expiry_alert_days(0).is_err());
        assert_eq!(substance().with_expiry_alert_days(30).unwrap().expiry_alert_days, 30);
    }
}
