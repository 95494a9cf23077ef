use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, DomainResult, Quantity, SubstanceId, UnitId};

/// Key of one balance row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub unit_id: UnitId,
}

impl BalanceKey {
    pub fn new(substance_id: SubstanceId, batch_id: BatchId, unit_id: UnitId) -> Self {
        Self {
            substance_id,
            batch_id,
            unit_id,
        }
    }
}

impl core::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}@{}", self.substance_id, self.batch_id, self.unit_id)
    }
}

/// Current on-hand quantity for one (substance, batch, unit).
///
/// Rows are created when a batch first receives stock and never deleted;
/// zero-quantity rows stay for audit continuity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBalance {
    pub key: BalanceKey,
    pub on_hand: Quantity,
    pub updated_at: DateTime<Utc>,
}

impl InventoryBalance {
    pub fn opened(key: BalanceKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            on_hand: Quantity::ZERO,
            updated_at: at,
        }
    }

    /// Apply a signed delta; fails with `NegativeBalance` instead of clamping.
    pub fn apply_delta(&mut self, delta: Decimal, at: DateTime<Utc>) -> DomainResult<Quantity> {
        let next = self.on_hand.apply_signed(delta)?;
        self.on_hand = next;
        self.updated_at = at;
        Ok(next)
    }

    /// Overwrite the on-hand quantity (adjustments only).
    pub fn set(&mut self, quantity: Quantity, at: DateTime<Utc>) {
        self.on_hand = quantity;
        self.updated_at = at;
    }
}
