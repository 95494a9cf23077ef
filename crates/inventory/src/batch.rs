//! Batch registry records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{
    BatchId, DomainError, DomainResult, Entity, Money, Quantity, SubstanceId, UnitId, UserId,
};

/// One receipt of a substance at a unit.
///
/// Created once and never deleted. `received_quantity` is immutable; the
/// current on-hand quantity lives in the balance store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub received_quantity: Quantity,
    pub unit_cost: Money,
    pub supplier: String,
    pub invoice_ref: Option<String>,
    /// Store-assigned registration order; breaks expiry ties FIFO.
    pub registration_seq: u64,
    /// Origin batch when this batch was synthesized by a transfer.
    pub source_batch: Option<BatchId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub received_quantity: Quantity,
    pub unit_cost: Money,
    pub supplier: String,
    pub invoice_ref: Option<String>,
    pub source_batch: Option<BatchId>,
}

impl NewBatch {
    pub fn validate(&self) -> DomainResult<()> {
        if self.lot_code.trim().is_empty() {
            return Err(DomainError::validation("lot code cannot be empty"));
        }
        if self.supplier.trim().is_empty() {
            return Err(DomainError::validation("supplier cannot be empty"));
        }
        Ok(())
    }

    pub fn register(
        self,
        id: BatchId,
        registration_seq: u64,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        self.validate()?;
        Ok(Batch {
            id,
            substance_id: self.substance_id,
            unit_id: self.unit_id,
            lot_code: self.lot_code.trim().to_string(),
            expiry_date: self.expiry_date,
            received_quantity: self.received_quantity,
            unit_cost: self.unit_cost,
            supplier: self.supplier,
            invoice_ref: self.invoice_ref,
            registration_seq,
            source_batch: self.source_batch,
            created_by,
            created_at,
        })
    }
}

/// Where a batch stands relative to its expiry date.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExpiryStatus {
    Valid,
    /// Expires within the substance's alert window (0 = expires today).
    ExpiringSoon { days_left: i64 },
    /// Expiry date is strictly before today.
    Expired { days_past: i64 },
}

impl Batch {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    pub fn expiry_status(&self, today: NaiveDate, alert_days: u32) -> ExpiryStatus {
        let days_left = (self.expiry_date - today).num_days();
        if days_left < 0 {
            ExpiryStatus::Expired {
                days_past: -days_left,
            }
        } else if days_left <= i64::from(alert_days) {
            ExpiryStatus::ExpiringSoon { days_left }
        } else {
            ExpiryStatus::Valid
        }
    }

    /// Whether this batch is a transfer copy of `origin` with the given expiry.
    pub fn mirrors(&self, origin: BatchId, expiry_date: NaiveDate) -> bool {
        self.source_batch == Some(origin) && self.expiry_date == expiry_date
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch(expiry: NaiveDate) -> Batch {
        NewBatch {
            substance_id: SubstanceId::new(),
            unit_id: UnitId::new(),
            lot_code: " L-001 ".to_string(),
            expiry_date: expiry,
            received_quantity: Quantity::from(10),
            unit_cost: Money::ZERO,
            supplier: "Acme Pharma".to_string(),
            invoice_ref: None,
            source_batch: None,
        }
        .register(BatchId::new(), 1, UserId::new(), Utc::now())
        .unwrap()
    }

    #[test]
    fn lot_code_is_trimmed_on_registration() {
        assert_eq!(batch(date(2030, 1, 1)).lot_code, "L-001");
    }

    #[test]
    fn empty_lot_code_is_rejected() {
        let mut nb = NewBatch {
            substance_id: SubstanceId::new(),
            unit_id: UnitId::new(),
            lot_code: "   ".to_string(),
            expiry_date: date(2030, 1, 1),
            received_quantity: Quantity::from(1),
            unit_cost: Money::ZERO,
            supplier: "Acme".to_string(),
            invoice_ref: None,
            source_batch: None,
        };
        assert!(nb.validate().is_err());
        nb.lot_code = "A1".to_string();
        assert!(nb.validate().is_ok());
    }

    #[test]
    fn expiry_status_boundaries() {
        let today = date(2026, 3, 10);
        let b = batch(date(2026, 3, 9));
        assert!(b.is_expired(today));
        assert_eq!(b.expiry_status(today, 90), ExpiryStatus::Expired { days_past: 1 });

        let b = batch(today);
        assert!(!b.is_expired(today));
        assert_eq!(b.expiry_status(today, 90), ExpiryStatus::ExpiringSoon { days_left: 0 });

        let b = batch(date(2026, 6, 8));
        assert_eq!(b.expiry_status(today, 90), ExpiryStatus::ExpiringSoon { days_left: 90 });

        let b = batch(date(2026, 6, 9));
        assert_eq!(b.expiry_status(today, 90), ExpiryStatus::Valid);
    }
}
