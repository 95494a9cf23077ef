//! Inputs of the stock service operations.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pharmastock_core::{
    BatchId, Money, MovementId, PatientRef, Quantity, SessionRef, SubstanceId, UnitId, UserId,
};

/// Issue stock from a unit, earliest expiry first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Caller-chosen key; repeating it returns the first result.
    pub request_key: Option<Uuid>,
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub quantity: Quantity,
    pub reason: String,
    pub actor: UserId,
    pub patient: Option<PatientRef>,
    pub session: Option<SessionRef>,
}

impl IssueRequest {
    pub fn new(
        substance_id: SubstanceId,
        unit_id: UnitId,
        quantity: Quantity,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            request_key: None,
            substance_id,
            unit_id,
            quantity,
            reason: reason.into(),
            actor,
            patient: None,
            session: None,
        }
    }

    pub fn with_key(mut self, key: Uuid) -> Self {
        self.request_key = Some(key);
        self
    }

    pub fn for_patient(mut self, patient: PatientRef, session: Option<SessionRef>) -> Self {
        self.patient = Some(patient);
        self.session = session;
        self
    }
}

/// Register a new batch and receive its stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRequest {
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub quantity: Quantity,
    pub supplier: String,
    pub unit_cost: Money,
    pub invoice_ref: Option<String>,
    pub actor: UserId,
}

/// Amend an earlier movement; the sign of `quantity` picks the direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub movement_id: MovementId,
    pub quantity: Decimal,
    pub reason: String,
    pub actor: UserId,
}

/// Set one balance row to a counted quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub unit_id: UnitId,
    pub quantity: Quantity,
    pub reason: String,
    pub actor: UserId,
}

/// Write off stock of one batch (breakage, spoilage, theft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossRequest {
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub unit_id: UnitId,
    pub quantity: Quantity,
    pub reason: String,
    pub actor: UserId,
}
