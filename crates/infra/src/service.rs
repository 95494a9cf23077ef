//! `StockService`: the public operations of the stock engine.
//!
//! Each stock-changing operation:
//!
//! ```text
//! request
//!   ↓
//! 1. open a store transaction
//!   ↓
//! 2. validate against the catalog (units active, substances known)
//!   ↓
//! 3. record movements through the ledger (allocation / transfer / direct)
//!   ↓
//! 4. commit (or discard everything on the first error)
//!   ↓
//! 5. publish stock events, best-effort
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use pharmastock_core::{
    BatchId, Clock, DomainError, Quantity, SubstanceId, SystemClock, TransferId,
    UnitId,
};
use pharmastock_events::{EventBus, EventEnvelope};
use pharmastock_inventory::{
    BalanceKey, Batch, BatchReceived, Direction, LowStockReached, Movement, MovementDraft,
    MovementKind, MovementLinks, MovementRecorded, NewBatch, StockEvent, Substance,
    Transfer, TransferCompleted, Unit, UnitMinimumOverride,
};

use crate::allocation::{AllocationEngine, AllocationRequest, AllocationResult};
use crate::config::EngineConfig;
use crate::error::StockError;
use crate::ledger::MovementLedger;
use crate::queries::{
    self, ExpiryAlert, LowStockEntry, StockSummary, require_active_unit, require_substance,
};
use crate::requests::{
    AdjustmentRequest, CorrectionRequest, IssueRequest, LossRequest, ReceiptRequest,
};
use crate::store::{
    AllocationRecord, BatchRepository, CatalogRepository, MovementFilter,
    MovementRepository, SequenceRepository, StockStore, StockTx, TransferRepository, sequences,
};
use crate::transfer::{TransferCoordinator, TransferRequest, TransferResult};
use crate::verify::{self, LedgerReport};

/// Envelope type published by the service.
pub type StockEnvelope = EventEnvelope<StockEvent>;

pub struct StockService<S, B> {
    store: S,
    bus: B,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    published: AtomicU64,
}

impl<S, B> StockService<S, B>
where
    S: StockStore,
    B: EventBus<StockEnvelope>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            published: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- catalog ----------------------------------------------------------

    #[instrument(skip(self, unit), fields(unit_id = %unit.id, code = %unit.code), err)]
    pub fn register_unit(&self, unit: Unit) -> Result<Unit, StockError> {
        self.store.transaction(|tx| {
            tx.put_unit(unit.clone())?;
            Ok::<_, StockError>(())
        })?;
        Ok(unit)
    }

    #[instrument(skip(self, substance), fields(substance_id = %substance.id), err)]
    pub fn register_substance(&self, substance: Substance) -> Result<Substance, StockError> {
        if substance.expiry_alert_days == 0 {
            return Err(StockError::validation("expiry alert window must be at least one day"));
        }
        self.store.transaction(|tx| {
            tx.put_substance(substance.clone())?;
            Ok::<_, StockError>(())
        })?;
        Ok(substance)
    }

    #[instrument(
        skip(self, entry),
        fields(substance_id = %entry.substance_id, unit_id = %entry.unit_id),
        err
    )]
    pub fn set_unit_minimum(&self, entry: UnitMinimumOverride) -> Result<(), StockError> {
        self.store.transaction(|tx| {
            require_substance(tx, entry.substance_id)?;
            if tx.unit(entry.unit_id)?.is_none() {
                return Err(DomainError::unknown("unit", entry.unit_id).into());
            }
            tx.put_minimum_override(entry.clone())?;
            Ok(())
        })
    }

    // ---- stock operations -------------------------------------------------

    /// Issue stock earliest-expiry-first. All-or-nothing.
    #[instrument(
        skip(self, request),
        fields(
            substance_id = %request.substance_id,
            unit_id = %request.unit_id,
            quantity = %request.quantity
        ),
        err
    )]
    pub fn issue(&self, request: IssueRequest) -> Result<AllocationResult, StockError> {
        let (at, today) = self.now();
        let (result, events) = self.store.transaction(|tx| {
            let mut events = Vec::new();
            let result = issue_in(tx, request, at, today, &mut events)?;
            if !result.replayed {
                low_stock_event(tx, result.substance_id, result.unit_id, at, &mut events)?;
            }
            Ok::<_, StockError>((result, events))
        })?;

        info!(
            batches = result.lines.len(),
            warnings = result.warnings.len(),
            replayed = result.replayed,
            "issue committed"
        );
        self.publish(events);
        Ok(result)
    }

    /// Issue several lines in one transaction; any failing line rolls back
    /// every line.
    #[instrument(skip(self, requests), fields(lines = requests.len()), err)]
    pub fn issue_many(&self, requests: Vec<IssueRequest>) -> Result<Vec<AllocationResult>, StockError> {
        if requests.is_empty() {
            return Err(StockError::validation("at least one issue line is required"));
        }
        let (at, today) = self.now();
        let (results, events) = self.store.transaction(|tx| {
            let mut events = Vec::new();
            let mut touched = BTreeSet::new();
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                let result = issue_in(tx, request, at, today, &mut events)?;
                if !result.replayed {
                    touched.insert((result.substance_id, result.unit_id));
                }
                results.push(result);
            }
            for (substance_id, unit_id) in touched {
                low_stock_event(tx, substance_id, unit_id, at, &mut events)?;
            }
            Ok::<_, StockError>((results, events))
        })?;

        info!(lines = results.len(), "multi-line issue committed");
        self.publish(events);
        Ok(results)
    }

    /// Register a batch and record its receipt.
    #[instrument(
        skip(self, request),
        fields(
            substance_id = %request.substance_id,
            unit_id = %request.unit_id,
            lot = %request.lot_code,
            quantity = %request.quantity
        ),
        err
    )]
    pub fn receive(&self, request: ReceiptRequest) -> Result<Batch, StockError> {
        let (at, today) = self.now();
        let (batch, movement) = self.store.transaction(|tx| {
            require_substance(tx, request.substance_id)?;
            require_active_unit(tx, request.unit_id)?;
            request.quantity.ensure_positive()?;

            let lot_code = request.lot_code.trim().to_string();
            if tx
                .find_by_lot(request.substance_id, request.unit_id, &lot_code)?
                .is_some()
            {
                return Err(DomainError::conflict(format!(
                    "lot {lot_code} is already registered for this substance at this unit"
                ))
                .into());
            }

            let seq = tx.next_sequence(sequences::BATCH)?;
            let batch = NewBatch {
                substance_id: request.substance_id,
                unit_id: request.unit_id,
                lot_code,
                expiry_date: request.expiry_date,
                received_quantity: request.quantity,
                unit_cost: request.unit_cost,
                supplier: request.supplier.clone(),
                invoice_ref: request.invoice_ref.clone(),
                source_batch: None,
            }
            .register(BatchId::new(), seq, request.actor, at)?;
            tx.insert_batch(batch.clone())?;

            let draft = MovementDraft::new(
                MovementKind::Receipt,
                BalanceKey::new(batch.substance_id, batch.id, batch.unit_id),
                batch.received_quantity,
                format!("receipt of lot {}", batch.lot_code),
                request.actor,
            );
            let movement = MovementLedger::record(tx, draft, at)?;
            Ok::<_, StockError>((batch, movement))
        })?;

        if batch.is_expired(today) {
            warn!(batch_id = %batch.id, expiry = %batch.expiry_date, "received an already expired batch");
        }
        info!(batch_id = %batch.id, "receipt committed");

        self.publish(vec![
            StockEvent::BatchReceived(BatchReceived {
                unit_id: batch.unit_id,
                substance_id: batch.substance_id,
                batch_id: batch.id,
                lot_code: batch.lot_code.clone(),
                expiry_date: batch.expiry_date,
                quantity: batch.received_quantity,
                occurred_at: at,
            }),
            StockEvent::MovementRecorded(MovementRecorded::from(&movement)),
        ]);
        Ok(batch)
    }

    /// Amend an earlier movement. Positive quantities add stock, negative
    /// ones remove it; the amended movement itself is never touched.
    #[instrument(skip(self, request), fields(origin = %request.movement_id, quantity = %request.quantity), err)]
    pub fn correct(&self, request: CorrectionRequest) -> Result<Movement, StockError> {
        if request.quantity.is_zero() {
            return Err(StockError::validation("correction quantity cannot be zero"));
        }
        let direction = if request.quantity.is_sign_negative() {
            Direction::Decrease
        } else {
            Direction::Increase
        };
        let quantity = Quantity::new(request.quantity.abs())?;

        let (at, _) = self.now();
        let (movement, events) = self.store.transaction(|tx| {
            let origin = tx
                .movement(request.movement_id)?
                .ok_or_else(|| DomainError::unknown("movement", request.movement_id))?;
            require_active_unit(tx, origin.unit_id)?;

            let draft = MovementDraft::correction(
                origin.key(),
                direction,
                quantity,
                origin.id,
                request.reason.clone(),
                request.actor,
            );
            let movement = MovementLedger::record(tx, draft, at)?;
            let mut events = vec![StockEvent::MovementRecorded(MovementRecorded::from(&movement))];
            if direction == Direction::Decrease {
                low_stock_event(tx, movement.substance_id, movement.unit_id, at, &mut events)?;
            }
            Ok::<_, StockError>((movement, events))
        })?;

        info!(movement_id = %movement.id, "correction committed");
        self.publish(events);
        Ok(movement)
    }

    /// Set one balance row to a counted quantity.
    #[instrument(
        skip(self, request),
        fields(batch_id = %request.batch_id, unit_id = %request.unit_id, quantity = %request.quantity),
        err
    )]
    pub fn adjust(&self, request: AdjustmentRequest) -> Result<Movement, StockError> {
        let (at, _) = self.now();
        let (movement, events) = self.store.transaction(|tx| {
            require_substance(tx, request.substance_id)?;
            require_active_unit(tx, request.unit_id)?;

            let draft = MovementDraft::new(
                MovementKind::Adjustment,
                BalanceKey::new(request.substance_id, request.batch_id, request.unit_id),
                request.quantity,
                request.reason.clone(),
                request.actor,
            );
            let movement = MovementLedger::record(tx, draft, at)?;
            let mut events = vec![StockEvent::MovementRecorded(MovementRecorded::from(&movement))];
            if movement.direction == Direction::Decrease {
                low_stock_event(tx, movement.substance_id, movement.unit_id, at, &mut events)?;
            }
            Ok::<_, StockError>((movement, events))
        })?;

        info!(movement_id = %movement.id, after = %movement.balance_after, "adjustment committed");
        self.publish(events);
        Ok(movement)
    }

    /// Write off stock of one specific batch.
    #[instrument(
        skip(self, request),
        fields(batch_id = %request.batch_id, unit_id = %request.unit_id, quantity = %request.quantity),
        err
    )]
    pub fn record_loss(&self, request: LossRequest) -> Result<Movement, StockError> {
        let (at, _) = self.now();
        let (movement, events) = self.store.transaction(|tx| {
            require_substance(tx, request.substance_id)?;
            require_active_unit(tx, request.unit_id)?;

            let draft = MovementDraft::new(
                MovementKind::Loss,
                BalanceKey::new(request.substance_id, request.batch_id, request.unit_id),
                request.quantity,
                request.reason.clone(),
                request.actor,
            );
            let movement = MovementLedger::record(tx, draft, at)?;
            let mut events = vec![StockEvent::MovementRecorded(MovementRecorded::from(&movement))];
            low_stock_event(tx, movement.substance_id, movement.unit_id, at, &mut events)?;
            Ok::<_, StockError>((movement, events))
        })?;

        info!(movement_id = %movement.id, "loss committed");
        self.publish(events);
        Ok(movement)
    }

    /// Move stock between two units in one transaction.
    #[instrument(
        skip(self, request),
        fields(
            origin = %request.origin_unit,
            destination = %request.destination_unit,
            lines = request.lines.len()
        ),
        err
    )]
    pub fn transfer(&self, request: TransferRequest) -> Result<TransferResult, StockError> {
        let (at, today) = self.now();
        let coordinator = TransferCoordinator::new(&self.config);
        let (result, events) = self.store.transaction(|tx| {
            let result = coordinator.execute(tx, request, at, today)?;
            let events = transfer_events(tx, &result, at)?;
            Ok::<_, StockError>((result, events))
        })?;

        info!(
            transfer = %result.transfer.code,
            lines = result.transfer.lines.len(),
            warnings = result.warnings.len(),
            "transfer committed"
        );
        self.publish(events);
        Ok(result)
    }

    // ---- queries ----------------------------------------------------------

    pub fn get_balance(&self, key: BalanceKey) -> Result<Quantity, StockError> {
        self.store.read(|tx| MovementLedger::balance(tx, &key))
    }

    /// Active unit override, else the substance default.
    pub fn get_minimum(&self, substance_id: SubstanceId, unit_id: UnitId) -> Result<Quantity, StockError> {
        self.store.read(|tx| {
            let substance = require_substance(tx, substance_id)?;
            queries::minimum_for(tx, &substance, unit_id)
        })
    }

    pub fn get_stock(
        &self,
        substance_id: SubstanceId,
        unit_id: Option<UnitId>,
    ) -> Result<StockSummary, StockError> {
        let today = self.clock.today();
        self.store
            .read(|tx| queries::stock_summary(tx, substance_id, unit_id, today))
    }

    pub fn expiry_alerts(&self, unit_id: UnitId, today: NaiveDate) -> Result<Vec<ExpiryAlert>, StockError> {
        self.store.read(|tx| queries::expiry_alerts(tx, unit_id, today))
    }

    pub fn low_stock(&self, unit_id: UnitId) -> Result<Vec<LowStockEntry>, StockError> {
        self.store.read(|tx| queries::low_stock(tx, unit_id))
    }

    pub fn movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StockError> {
        self.store.read(|tx| Ok(tx.movements(filter)?))
    }

    pub fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, StockError> {
        self.store.read(|tx| Ok(tx.transfer(id)?))
    }

    pub fn transfer_by_code(&self, code: &str) -> Result<Option<Transfer>, StockError> {
        self.store.read(|tx| Ok(tx.transfer_by_code(code)?))
    }

    pub fn batch(&self, id: BatchId) -> Result<Option<Batch>, StockError> {
        self.store.read(|tx| Ok(tx.batch(id)?))
    }

    /// Recompute every balance from the ledger and report mismatches.
    #[instrument(skip(self), err)]
    pub fn verify_ledger(&self) -> Result<LedgerReport, StockError> {
        let report = self.store.read(|tx| verify::verify_ledger(tx))?;
        if !report.is_consistent() {
            warn!(
                discrepancies = report.discrepancies.len(),
                "ledger and balances disagree"
            );
        }
        Ok(report)
    }

    // ---- internals --------------------------------------------------------

    fn now(&self) -> (DateTime<Utc>, NaiveDate) {
        let at = self.clock.now();
        (at, at.date_naive())
    }

    /// Best-effort post-commit publication; failures are logged only.
    fn publish(&self, events: Vec<StockEvent>) {
        for event in events {
            let sequence = self.published.fetch_add(1, Ordering::SeqCst) + 1;
            let envelope = EventEnvelope::wrap(event.unit_id(), sequence, event);
            if let Err(error) = self.bus.publish(envelope) {
                warn!(sequence, ?error, "stock event publication failed");
            }
        }
    }
}

fn issue_in<T: StockTx>(
    tx: &mut T,
    request: IssueRequest,
    at: DateTime<Utc>,
    today: NaiveDate,
    events: &mut Vec<StockEvent>,
) -> Result<AllocationResult, StockError> {
    require_substance(tx, request.substance_id)?;
    require_active_unit(tx, request.unit_id)?;
    request.quantity.ensure_positive()?;
    if request.reason.trim().is_empty() {
        return Err(StockError::validation("issue reason cannot be empty"));
    }

    if let Some(key) = request.request_key {
        if let Some(record) = tx.allocation_record(key)? {
            let same = record.substance_id == request.substance_id
                && record.unit_id == request.unit_id
                && record.quantity == request.quantity;
            if !same {
                return Err(StockError::validation(format!(
                    "request key {key} was already used for a different issue"
                )));
            }
            let mut result = record.result;
            result.replayed = true;
            return Ok(result);
        }
    }

    let result = AllocationEngine::allocate(
        tx,
        AllocationRequest {
            kind: MovementKind::Issue,
            substance_id: request.substance_id,
            unit_id: request.unit_id,
            quantity: request.quantity,
            reason: request.reason,
            actor: request.actor,
            links: MovementLinks {
                patient: request.patient,
                session: request.session,
                ..MovementLinks::default()
            },
        },
        at,
        today,
    )?;

    if let Some(key) = request.request_key {
        tx.put_allocation_record(AllocationRecord {
            request_key: key,
            substance_id: result.substance_id,
            unit_id: result.unit_id,
            quantity: result.requested,
            result: result.clone(),
        })?;
    }

    for line in &result.lines {
        events.push(StockEvent::MovementRecorded(MovementRecorded {
            movement_id: line.movement_id,
            unit_id: result.unit_id,
            substance_id: result.substance_id,
            batch_id: line.batch_id,
            kind: MovementKind::Issue,
            quantity: line.quantity,
            balance_after: line.remaining,
            occurred_at: at,
        }));
    }
    Ok(result)
}

fn low_stock_event<T: StockTx>(
    tx: &T,
    substance_id: SubstanceId,
    unit_id: UnitId,
    at: DateTime<Utc>,
    events: &mut Vec<StockEvent>,
) -> Result<(), StockError> {
    let substance = require_substance(tx, substance_id)?;
    let level = queries::stock_level(tx, &substance, unit_id)?;
    if level.is_low {
        events.push(StockEvent::LowStockReached(LowStockReached {
            unit_id,
            substance_id,
            on_hand: level.on_hand,
            minimum: level.minimum,
            occurred_at: at,
        }));
    }
    Ok(())
}

fn transfer_events<T: StockTx>(
    tx: &T,
    result: &TransferResult,
    at: DateTime<Utc>,
) -> Result<Vec<StockEvent>, StockError> {
    let transfer = &result.transfer;
    let mut events = Vec::new();

    for batch_id in &result.created_batches {
        if let Some(batch) = tx.batch(*batch_id)? {
            events.push(StockEvent::BatchReceived(BatchReceived {
                unit_id: batch.unit_id,
                substance_id: batch.substance_id,
                batch_id: batch.id,
                lot_code: batch.lot_code,
                expiry_date: batch.expiry_date,
                quantity: batch.received_quantity,
                occurred_at: at,
            }));
        }
    }

    let mut substances = BTreeSet::new();
    for line in &transfer.lines {
        substances.insert(line.substance_id);
        for id in [line.out_movement, line.in_movement] {
            let movement = tx.movement(id)?.ok_or_else(|| {
                StockError::InvariantViolation(format!("transfer movement {id} was not recorded"))
            })?;
            events.push(StockEvent::MovementRecorded(MovementRecorded::from(&movement)));
        }
    }

    events.push(StockEvent::TransferCompleted(TransferCompleted {
        transfer_id: transfer.id,
        code: transfer.code.clone(),
        origin_unit: transfer.origin_unit,
        destination_unit: transfer.destination_unit,
        lines: transfer.lines.len(),
        total_quantity: transfer.total_quantity(),
        occurred_at: at,
    }));

    for substance_id in substances {
        low_stock_event(tx, substance_id, transfer.origin_unit, at, &mut events)?;
    }
    Ok(events)
}
