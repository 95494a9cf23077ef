use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, MovementId, Quantity, SubstanceId, TransferId, UnitId};
use pharmastock_events::Event;

use crate::movement::{Movement, MovementKind};

/// Event: BatchReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceived {
    pub unit_id: UnitId,
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub movement_id: MovementId,
    pub unit_id: UnitId,
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub balance_after: Quantity,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Movement> for MovementRecorded {
    fn from(m: &Movement) -> Self {
        Self {
            movement_id: m.id,
            unit_id: m.unit_id,
            substance_id: m.substance_id,
            batch_id: m.batch_id,
            kind: m.kind,
            quantity: m.quantity,
            balance_after: m.balance_after,
            occurred_at: m.recorded_at,
        }
    }
}

/// Event: TransferCompleted. Published once per transfer, scoped to the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub transfer_id: TransferId,
    pub code: String,
    pub origin_unit: UnitId,
    pub destination_unit: UnitId,
    pub lines: usize,
    pub total_quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LowStockReached. The unit total fell to or below its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockReached {
    pub unit_id: UnitId,
    pub substance_id: SubstanceId,
    pub on_hand: Quantity,
    pub minimum: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    BatchReceived(BatchReceived),
    MovementRecorded(MovementRecorded),
    TransferCompleted(TransferCompleted),
    LowStockReached(LowStockReached),
}

impl StockEvent {
    /// The unit this event concerns.
    pub fn unit_id(&self) -> UnitId {
        match self {
            StockEvent::BatchReceived(e) => e.unit_id,
            StockEvent::MovementRecorded(e) => e.unit_id,
            StockEvent::TransferCompleted(e) => e.origin_unit,
            StockEvent::LowStockReached(e) => e.unit_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::BatchReceived(_) => "stock.batch.received",
            StockEvent::MovementRecorded(_) => "stock.movement.recorded",
            StockEvent::TransferCompleted(_) => "stock.transfer.completed",
            StockEvent::LowStockReached(_) => "stock.level.low",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::BatchReceived(e) => e.occurred_at,
            StockEvent::MovementRecorded(e) => e.occurred_at,
            StockEvent::TransferCompleted(e) => e.occurred_at,
            StockEvent::LowStockReached(e) => e.occurred_at,
        }
    }
}
