//! Executes allocation plans against the ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pharmastock_core::{BatchId, MovementId, Quantity, SubstanceId, UnitId, UserId};
use pharmastock_inventory::{
    BalanceKey, ExpiryWarning, MovementDraft, MovementKind, MovementLinks, plan_allocation,
};

use crate::error::StockError;
use crate::ledger::MovementLedger;
use crate::store::StockTx;

/// One batch drawn by an allocation, with the movement that recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedLine {
    pub batch_id: BatchId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub quantity: Quantity,
    pub remaining: Quantity,
    pub movement_id: MovementId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub requested: Quantity,
    /// Drawn batches in allocation order.
    pub lines: Vec<AllocatedLine>,
    pub warnings: Vec<ExpiryWarning>,
    /// Set when an idempotent retry returned an earlier result.
    #[serde(default)]
    pub replayed: bool,
}

impl AllocationResult {
    /// (batch, quantity drawn) pairs in allocation order.
    pub fn draws(&self) -> Vec<(BatchId, Quantity)> {
        self.lines.iter().map(|l| (l.batch_id, l.quantity)).collect()
    }

    pub fn movement_ids(&self) -> Vec<MovementId> {
        self.lines.iter().map(|l| l.movement_id).collect()
    }

    pub fn total(&self) -> Quantity {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// Outgoing stock request for one (substance, unit).
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub kind: MovementKind,
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub quantity: Quantity,
    pub reason: String,
    pub actor: UserId,
    pub links: MovementLinks,
}

/// Earliest-expiry-first allocation over the batches of one unit.
pub struct AllocationEngine;

impl AllocationEngine {
    /// Plan and record an allocation inside `tx`.
    ///
    /// Either the full quantity is drawn, one movement per batch, or an error
    /// is returned and the caller's transaction must be discarded.
    pub fn allocate<T: StockTx>(
        tx: &mut T,
        request: AllocationRequest,
        at: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<AllocationResult, StockError> {
        if !request.kind.is_outgoing() {
            return Err(StockError::InvariantViolation(format!(
                "{} movements cannot be allocated",
                request.kind
            )));
        }
        request.quantity.ensure_positive()?;

        let candidates = tx.lock_candidates(request.substance_id, request.unit_id)?;
        let plan = plan_allocation(candidates, request.quantity, today)?;
        debug!(
            substance_id = %request.substance_id,
            unit_id = %request.unit_id,
            requested = %request.quantity,
            batches = plan.draws.len(),
            "allocation planned"
        );

        let mut lines = Vec::with_capacity(plan.draws.len());
        for draw in plan.draws {
            let key = BalanceKey::new(request.substance_id, draw.batch_id, request.unit_id);
            let draft = MovementDraft::new(
                request.kind,
                key,
                draw.quantity,
                request.reason.clone(),
                request.actor,
            )
            .with_links(request.links.clone());
            let movement = MovementLedger::record(tx, draft, at)?;

            lines.push(AllocatedLine {
                batch_id: draw.batch_id,
                lot_code: draw.lot_code,
                expiry_date: draw.expiry_date,
                quantity: draw.quantity,
                remaining: movement.balance_after,
                movement_id: movement.id,
            });
        }

        for w in &plan.warnings {
            warn!(
                batch_id = %w.batch_id,
                lot = %w.lot_code,
                expiry = %w.expiry_date,
                drawn = %w.quantity_drawn,
                "expired stock allocated"
            );
        }

        Ok(AllocationResult {
            substance_id: request.substance_id,
            unit_id: request.unit_id,
            requested: request.quantity,
            lines,
            warnings: plan.warnings,
            replayed: false,
        })
    }
}
