//! Inter-unit transfers.
//!
//! A transfer is executed as one transaction: it is requested, dispatched and
//! completed without ever being observable in between. Only completed
//! transfers are persisted; the intermediate states exist so the lifecycle
//! rules stay explicit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{
    BatchId, DomainError, DomainResult, Entity, MovementId, Quantity, SubstanceId, TransferId,
    UnitId, UserId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InTransit,
    Completed,
    /// Part of the stored data model; the instantaneous protocol never produces it.
    Cancelled,
}

impl TransferStatus {
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::InTransit)
                | (TransferStatus::InTransit, TransferStatus::Completed)
                | (TransferStatus::Pending, TransferStatus::Cancelled)
                | (TransferStatus::InTransit, TransferStatus::Cancelled)
        )
    }
}

/// How a synthesized destination batch gets its expiry date.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "date")]
pub enum DestinationExpiry {
    /// Copy the origin batch's expiry date.
    InheritOrigin,
    /// Use a date supplied by the caller.
    Explicit(NaiveDate),
}

impl DestinationExpiry {
    pub fn resolve(self, origin_expiry: NaiveDate) -> NaiveDate {
        match self {
            DestinationExpiry::InheritOrigin => origin_expiry,
            DestinationExpiry::Explicit(d) => d,
        }
    }
}

/// One (origin batch → destination batch) leg of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub substance_id: SubstanceId,
    pub origin_batch: BatchId,
    pub destination_batch: BatchId,
    pub quantity: Quantity,
    pub out_movement: MovementId,
    pub in_movement: MovementId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    /// Human-readable code, e.g. `TRF0042`.
    pub code: String,
    pub origin_unit: UnitId,
    pub destination_unit: UnitId,
    pub status: TransferStatus,
    pub reason: String,
    pub requested_by: UserId,
    pub sent_by: Option<UserId>,
    pub received_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub lines: Vec<TransferLine>,
}

impl Transfer {
    pub fn request(
        id: TransferId,
        code: impl Into<String>,
        origin_unit: UnitId,
        destination_unit: UnitId,
        reason: impl Into<String>,
        requested_by: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if origin_unit == destination_unit {
            return Err(DomainError::validation(
                "origin and destination units must be different",
            ));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("transfer reason cannot be empty"));
        }
        Ok(Self {
            id,
            code: code.into(),
            origin_unit,
            destination_unit,
            status: TransferStatus::Pending,
            reason,
            requested_by,
            sent_by: None,
            received_by: None,
            created_at: at,
            sent_at: None,
            received_at: None,
            lines: Vec::new(),
        })
    }

    pub fn add_line(&mut self, line: TransferLine) -> DomainResult<()> {
        if self.status != TransferStatus::Pending {
            return Err(DomainError::invariant("lines can only be added to a pending transfer"));
        }
        line.quantity.ensure_positive()?;
        self.lines.push(line);
        Ok(())
    }

    fn transition(&mut self, next: TransferStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invariant(format!(
                "transfer {} cannot move from {:?} to {:?}",
                self.code, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn dispatch(&mut self, sender: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("transfer must have at least one line"));
        }
        self.transition(TransferStatus::InTransit)?;
        self.sent_by = Some(sender);
        self.sent_at = Some(at);
        Ok(())
    }

    pub fn complete(&mut self, receiver: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        self.transition(TransferStatus::Completed)?;
        self.received_by = Some(receiver);
        self.received_at = Some(at);
        Ok(())
    }

    pub fn total_quantity(&self) -> Quantity {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `TRF` + zero-padded sequence number, e.g. `TRF0007`.
pub fn format_transfer_code(prefix: &str, seq: u64, width: usize) -> String {
    format!("{prefix}{seq:0width$}")
}

/// Lot code for a batch created at the destination of a transfer.
pub fn synthesize_lot_code(origin_lot: &str, transfer_code: &str) -> String {
    format!("{origin_lot}/{transfer_code}")
}
