//! Inter-unit transfer execution.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pharmastock_core::{
    BatchId, DomainError, Quantity, SubstanceId, TransferId, UnitId, UserId,
};
use pharmastock_inventory::{
    BalanceKey, Batch, DestinationExpiry, ExpiryWarning, MovementDraft, MovementKind,
    MovementLinks, NewBatch, Transfer, TransferLine, format_transfer_code, synthesize_lot_code,
};

use crate::allocation::{AllocationEngine, AllocationRequest};
use crate::config::{DestinationExpiryMode, EngineConfig};
use crate::error::StockError;
use crate::ledger::MovementLedger;
use crate::store::{StockTx, sequences};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLineRequest {
    pub substance_id: SubstanceId,
    pub quantity: Quantity,
    /// Expiry for batches created at the destination; `None` applies the
    /// configured default.
    pub destination_expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub origin_unit: UnitId,
    pub destination_unit: UnitId,
    pub lines: Vec<TransferLineRequest>,
    pub reason: String,
    pub actor: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub warnings: Vec<ExpiryWarning>,
    /// Destination batches registered by this transfer.
    pub created_batches: Vec<BatchId>,
}

pub struct TransferCoordinator<'a> {
    config: &'a EngineConfig,
}

impl<'a> TransferCoordinator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Move stock between units inside `tx`.
    ///
    /// Per line: allocate at the origin (earliest expiry first), then for
    /// every drawn batch find or create the destination batch and record a
    /// transfer-out / transfer-in pair. Any failure leaves the transaction
    /// to be discarded, so no movement, batch or transfer code survives it.
    pub fn execute<T: StockTx>(
        &self,
        tx: &mut T,
        request: TransferRequest,
        at: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<TransferResult, StockError> {
        self.validate(tx, &request)?;

        let seq = tx.next_sequence(sequences::TRANSFER)?;
        let code = format_transfer_code(
            &self.config.transfer_prefix,
            seq,
            self.config.transfer_code_width,
        );
        let mut transfer = Transfer::request(
            TransferId::new(),
            code.clone(),
            request.origin_unit,
            request.destination_unit,
            request.reason.clone(),
            request.actor,
            at,
        )?;

        let mut warnings = Vec::new();
        let mut created_batches = Vec::new();

        for line in &request.lines {
            let policy = self.expiry_policy(line)?;
            let allocation = AllocationEngine::allocate(
                tx,
                AllocationRequest {
                    kind: MovementKind::TransferOut,
                    substance_id: line.substance_id,
                    unit_id: request.origin_unit,
                    quantity: line.quantity,
                    reason: request.reason.clone(),
                    actor: request.actor,
                    links: MovementLinks {
                        destination_unit: Some(request.destination_unit),
                        transfer: Some(transfer.id),
                        ..MovementLinks::default()
                    },
                },
                at,
                today,
            )?;
            warnings.extend(allocation.warnings);

            for drawn in allocation.lines {
                let origin = tx
                    .batch(drawn.batch_id)?
                    .ok_or_else(|| DomainError::unknown("batch", drawn.batch_id))?;
                let expiry = policy.resolve(origin.expiry_date);

                let (destination, created) = self.resolve_destination_batch(
                    tx,
                    &origin,
                    request.destination_unit,
                    expiry,
                    drawn.quantity,
                    &code,
                    request.actor,
                    at,
                )?;
                if created {
                    created_batches.push(destination.id);
                }

                let inbound = MovementDraft::new(
                    MovementKind::TransferIn,
                    BalanceKey::new(line.substance_id, destination.id, request.destination_unit),
                    drawn.quantity,
                    request.reason.clone(),
                    request.actor,
                )
                .with_links(MovementLinks {
                    origin_unit: Some(request.origin_unit),
                    transfer: Some(transfer.id),
                    ..MovementLinks::default()
                });
                let in_movement = MovementLedger::record(tx, inbound, at)?;

                transfer.add_line(TransferLine {
                    substance_id: line.substance_id,
                    origin_batch: origin.id,
                    destination_batch: destination.id,
                    quantity: drawn.quantity,
                    out_movement: drawn.movement_id,
                    in_movement: in_movement.id,
                })?;
            }
        }

        transfer.dispatch(request.actor, at)?;
        transfer.complete(request.actor, at)?;
        tx.insert_transfer(transfer.clone())?;

        debug!(
            transfer = %transfer.code,
            lines = transfer.lines.len(),
            created_batches = created_batches.len(),
            "transfer executed"
        );

        Ok(TransferResult {
            transfer,
            warnings,
            created_batches,
        })
    }

    fn validate<T: StockTx>(&self, tx: &T, request: &TransferRequest) -> Result<(), StockError> {
        if request.origin_unit == request.destination_unit {
            return Err(StockError::validation(
                "origin and destination units must be different",
            ));
        }
        if request.lines.is_empty() {
            return Err(StockError::validation("transfer must have at least one line"));
        }
        if request.reason.trim().is_empty() {
            return Err(StockError::validation("transfer reason cannot be empty"));
        }
        for unit_id in [request.origin_unit, request.destination_unit] {
            tx.unit(unit_id)?
                .ok_or_else(|| DomainError::unknown("unit", unit_id))?
                .ensure_active()?;
        }
        for line in &request.lines {
            if tx.substance(line.substance_id)?.is_none() {
                return Err(DomainError::unknown("substance", line.substance_id).into());
            }
            line.quantity.ensure_positive()?;
        }
        Ok(())
    }

    fn expiry_policy(&self, line: &TransferLineRequest) -> Result<DestinationExpiry, StockError> {
        match (line.destination_expiry, self.config.destination_expiry) {
            (Some(date), _) => Ok(DestinationExpiry::Explicit(date)),
            (None, DestinationExpiryMode::Inherit) => Ok(DestinationExpiry::InheritOrigin),
            (None, DestinationExpiryMode::Require) => Err(StockError::validation(format!(
                "destination expiry date required for substance {}",
                line.substance_id
            ))),
        }
    }

    /// Reuse the destination batch that mirrors `origin` at `expiry`, or
    /// register a new one. Returns the batch and whether it was created.
    #[allow(clippy::too_many_arguments)]
    fn resolve_destination_batch<T: StockTx>(
        &self,
        tx: &mut T,
        origin: &Batch,
        destination_unit: UnitId,
        expiry: NaiveDate,
        quantity: Quantity,
        transfer_code: &str,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(Batch, bool), StockError> {
        let existing = tx
            .batches_at(origin.substance_id, destination_unit)?
            .into_iter()
            .find(|b| b.mirrors(origin.id, expiry));
        if let Some(batch) = existing {
            return Ok((batch, false));
        }

        // One origin batch can feed several destination batches in a single
        // transfer (one per expiry), so later ones get a numeric suffix.
        let base = synthesize_lot_code(&origin.lot_code, transfer_code);
        let mut lot_code = base.clone();
        let mut suffix = 1u32;
        while tx
            .find_by_lot(origin.substance_id, destination_unit, &lot_code)?
            .is_some()
        {
            suffix += 1;
            lot_code = format!("{base}-{suffix}");
        }

        let seq = tx.next_sequence(sequences::BATCH)?;
        let batch = NewBatch {
            substance_id: origin.substance_id,
            unit_id: destination_unit,
            lot_code,
            expiry_date: expiry,
            received_quantity: quantity,
            unit_cost: origin.unit_cost,
            supplier: origin.supplier.clone(),
            invoice_ref: origin.invoice_ref.clone(),
            source_batch: Some(origin.id),
        }
        .register(BatchId::new(), seq, actor, at)?;
        tx.insert_batch(batch.clone())?;
        Ok((batch, true))
    }
}
