use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use pharmastock_core::{BatchId, MovementId, SubstanceId, TransferId, UnitId};
use pharmastock_inventory::{
    AllocationCandidate, BalanceKey, Batch, InventoryBalance, Movement, Substance, Transfer, Unit,
    UnitMinimumOverride, order_candidates,
};

use super::r#trait::{
    AllocationRecord, AllocationRepository, BalanceRepository, BatchRepository, CatalogRepository,
    MovementFilter, MovementRepository, SequenceRepository, StockStore, StoreError,
    TransferRepository,
};

type LotKey = (SubstanceId, UnitId, String);

/// Complete state of an in-memory store. Also the transaction handle: each
/// transaction works on a private copy that replaces the committed state on
/// success.
#[derive(Debug, Clone, Default)]
pub struct StockState {
    units: BTreeMap<UnitId, Unit>,
    substances: BTreeMap<SubstanceId, Substance>,
    overrides: BTreeMap<(SubstanceId, UnitId), UnitMinimumOverride>,
    batches: BTreeMap<BatchId, Batch>,
    lots: HashMap<LotKey, BatchId>,
    balances: BTreeMap<BalanceKey, InventoryBalance>,
    movements: Vec<Movement>,
    movement_index: HashMap<MovementId, usize>,
    transfers: BTreeMap<TransferId, Transfer>,
    transfer_codes: HashMap<String, TransferId>,
    allocations: HashMap<Uuid, AllocationRecord>,
    sequences: BTreeMap<String, u64>,
}

/// Serializable dump of a [`StockState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub units: Vec<Unit>,
    pub substances: Vec<Substance>,
    pub minimum_overrides: Vec<UnitMinimumOverride>,
    pub batches: Vec<Batch>,
    pub balances: Vec<InventoryBalance>,
    pub movements: Vec<Movement>,
    pub transfers: Vec<Transfer>,
    pub allocations: Vec<AllocationRecord>,
    pub sequences: BTreeMap<String, u64>,
}

impl StockState {
    pub fn snapshot(&self) -> StockSnapshot {
        let mut allocations: Vec<_> = self.allocations.values().cloned().collect();
        allocations.sort_by_key(|r| r.request_key);

        StockSnapshot {
            units: self.units.values().cloned().collect(),
            substances: self.substances.values().cloned().collect(),
            minimum_overrides: self.overrides.values().cloned().collect(),
            batches: self.batches.values().cloned().collect(),
            balances: self.balances.values().cloned().collect(),
            movements: self.movements.clone(),
            transfers: self.transfers.values().cloned().collect(),
            allocations,
            sequences: self.sequences.clone(),
        }
    }

    /// Rebuild state (and its indexes) from a snapshot, enforcing the same
    /// uniqueness and ordering rules as live writes.
    pub fn restore(snapshot: StockSnapshot) -> Result<Self, StoreError> {
        let mut state = StockState {
            sequences: snapshot.sequences,
            ..StockState::default()
        };
        for unit in snapshot.units {
            state.put_unit(unit)?;
        }
        for substance in snapshot.substances {
            state.put_substance(substance)?;
        }
        for entry in snapshot.minimum_overrides {
            state.put_minimum_override(entry)?;
        }
        for batch in snapshot.batches {
            state.insert_batch(batch)?;
        }
        for row in snapshot.balances {
            if !state.batches.contains_key(&row.key.batch_id) {
                return Err(StoreError::Corrupt(format!(
                    "balance {} references an unknown batch",
                    row.key
                )));
            }
            state.put_balance(row)?;
        }
        for movement in snapshot.movements {
            state.append_movement(movement)?;
        }
        for transfer in snapshot.transfers {
            state.insert_transfer(transfer)?;
        }
        for record in snapshot.allocations {
            state.put_allocation_record(record)?;
        }
        Ok(state)
    }
}

impl CatalogRepository for StockState {
    fn unit(&self, id: UnitId) -> Result<Option<Unit>, StoreError> {
        Ok(self.units.get(&id).cloned())
    }

    fn units(&self) -> Result<Vec<Unit>, StoreError> {
        Ok(self.units.values().cloned().collect())
    }

    fn put_unit(&mut self, unit: Unit) -> Result<(), StoreError> {
        let clash = self
            .units
            .values()
            .any(|u| u.id != unit.id && u.code.eq_ignore_ascii_case(&unit.code));
        if clash {
            return Err(StoreError::Duplicate(format!("unit code {}", unit.code)));
        }
        self.units.insert(unit.id, unit);
        Ok(())
    }

    fn substance(&self, id: SubstanceId) -> Result<Option<Substance>, StoreError> {
        Ok(self.substances.get(&id).cloned())
    }

    fn put_substance(&mut self, substance: Substance) -> Result<(), StoreError> {
        self.substances.insert(substance.id, substance);
        Ok(())
    }

    fn minimum_override(
        &self,
        substance_id: SubstanceId,
        unit_id: UnitId,
    ) -> Result<Option<UnitMinimumOverride>, StoreError> {
        Ok(self.overrides.get(&(substance_id, unit_id)).cloned())
    }

    fn put_minimum_override(&mut self, entry: UnitMinimumOverride) -> Result<(), StoreError> {
        self.overrides.insert((entry.substance_id, entry.unit_id), entry);
        Ok(())
    }
}

impl BatchRepository for StockState {
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.batches.get(&id).cloned())
    }

    fn find_by_lot(
        &self,
        substance_id: SubstanceId,
        unit_id: UnitId,
        lot_code: &str,
    ) -> Result<Option<Batch>, StoreError> {
        let key = (substance_id, unit_id, lot_code.to_string());
        Ok(self.lots.get(&key).and_then(|id| self.batches.get(id)).cloned())
    }

    fn batches_at(
        &self,
        substance_id: SubstanceId,
        unit_id: UnitId,
    ) -> Result<Vec<Batch>, StoreError> {
        let mut found: Vec<Batch> = self
            .batches
            .values()
            .filter(|b| b.substance_id == substance_id && b.unit_id == unit_id)
            .cloned()
            .collect();
        found.sort_by_key(|b| b.registration_seq);
        Ok(found)
    }

    fn insert_batch(&mut self, batch: Batch) -> Result<(), StoreError> {
        if self.batches.contains_key(&batch.id) {
            return Err(StoreError::Duplicate(format!("batch id {}", batch.id)));
        }
        let lot_key = (batch.substance_id, batch.unit_id, batch.lot_code.clone());
        if self.lots.contains_key(&lot_key) {
            return Err(StoreError::Duplicate(format!(
                "lot {} already registered for this substance at this unit",
                batch.lot_code
            )));
        }
        self.lots.insert(lot_key, batch.id);
        self.batches.insert(batch.id, batch);
        Ok(())
    }
}

impl BalanceRepository for StockState {
    fn balance(&self, key: &BalanceKey) -> Result<Option<InventoryBalance>, StoreError> {
        Ok(self.balances.get(key).cloned())
    }

    fn balances_of(
        &self,
        substance_id: SubstanceId,
        unit_id: Option<UnitId>,
    ) -> Result<Vec<InventoryBalance>, StoreError> {
        Ok(self
            .balances
            .values()
            .filter(|row| row.key.substance_id == substance_id)
            .filter(|row| unit_id.is_none_or(|u| row.key.unit_id == u))
            .cloned()
            .collect())
    }

    fn balances_at_unit(&self, unit_id: UnitId) -> Result<Vec<InventoryBalance>, StoreError> {
        Ok(self
            .balances
            .values()
            .filter(|row| row.key.unit_id == unit_id)
            .cloned()
            .collect())
    }

    fn all_balances(&self) -> Result<Vec<InventoryBalance>, StoreError> {
        Ok(self.balances.values().cloned().collect())
    }

    fn lock_candidates(
        &mut self,
        substance_id: SubstanceId,
        unit_id: UnitId,
    ) -> Result<Vec<AllocationCandidate>, StoreError> {
        let mut candidates = Vec::new();
        for row in self.balances.values() {
            if row.key.substance_id != substance_id
                || row.key.unit_id != unit_id
                || !row.on_hand.is_positive()
            {
                continue;
            }
            let batch = self.batches.get(&row.key.batch_id).ok_or_else(|| {
                StoreError::Corrupt(format!("balance {} has no batch record", row.key))
            })?;
            candidates.push(AllocationCandidate {
                batch_id: batch.id,
                lot_code: batch.lot_code.clone(),
                expiry_date: batch.expiry_date,
                registration_seq: batch.registration_seq,
                on_hand: row.on_hand,
            });
        }
        order_candidates(&mut candidates);
        Ok(candidates)
    }

    fn put_balance(&mut self, row: InventoryBalance) -> Result<(), StoreError> {
        self.balances.insert(row.key, row);
        Ok(())
    }
}

impl MovementRepository for StockState {
    fn append_movement(&mut self, movement: Movement) -> Result<(), StoreError> {
        if self.movement_index.contains_key(&movement.id) {
            return Err(StoreError::Duplicate(format!("movement {}", movement.id)));
        }
        if let Some(last) = self.movements.last() {
            if movement.ledger_seq <= last.ledger_seq {
                return Err(StoreError::Corrupt(format!(
                    "ledger sequence {} does not follow {}",
                    movement.ledger_seq, last.ledger_seq
                )));
            }
        }
        self.movement_index.insert(movement.id, self.movements.len());
        self.movements.push(movement);
        Ok(())
    }

    fn movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        Ok(self
            .movement_index
            .get(&id)
            .and_then(|&idx| self.movements.get(idx))
            .cloned())
    }

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }
}

impl TransferRepository for StockState {
    fn insert_transfer(&mut self, transfer: Transfer) -> Result<(), StoreError> {
        if self.transfers.contains_key(&transfer.id) {
            return Err(StoreError::Duplicate(format!("transfer {}", transfer.id)));
        }
        if self.transfer_codes.contains_key(&transfer.code) {
            return Err(StoreError::Duplicate(format!("transfer code {}", transfer.code)));
        }
        self.transfer_codes.insert(transfer.code.clone(), transfer.id);
        self.transfers.insert(transfer.id, transfer);
        Ok(())
    }

    fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.transfers.get(&id).cloned())
    }

    fn transfer_by_code(&self, code: &str) -> Result<Option<Transfer>, StoreError> {
        Ok(self
            .transfer_codes
            .get(code)
            .and_then(|id| self.transfers.get(id))
            .cloned())
    }
}

impl AllocationRepository for StockState {
    fn allocation_record(&self, request_key: Uuid) -> Result<Option<AllocationRecord>, StoreError> {
        Ok(self.allocations.get(&request_key).cloned())
    }

    fn put_allocation_record(&mut self, record: AllocationRecord) -> Result<(), StoreError> {
        if self.allocations.contains_key(&record.request_key) {
            return Err(StoreError::Duplicate(format!(
                "allocation request {}",
                record.request_key
            )));
        }
        self.allocations.insert(record.request_key, record);
        Ok(())
    }
}

impl SequenceRepository for StockState {
    fn next_sequence(&mut self, name: &str) -> Result<u64, StoreError> {
        let counter = self.sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

/// In-memory transactional stock store.
///
/// Intended for tests, dev, and single-process deployments:
/// - one mutex serializes all transactions
/// - a transaction works on a copy of the state, swapped in on commit
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: Mutex<StockState>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StockSnapshot) -> Result<Self, StoreError> {
        Ok(Self {
            state: Mutex::new(StockState::restore(snapshot)?),
        })
    }

    pub fn snapshot(&self) -> Result<StockSnapshot, StoreError> {
        let state = self.lock();
        Ok(state.snapshot())
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(&self.snapshot()?)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: StockSnapshot =
            serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Committed state is only replaced after a transaction returns `Ok`, so a
    /// panic inside one leaves it intact and the poison flag can be cleared.
    fn lock(&self) -> MutexGuard<'_, StockState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("recovering stock state after a panicked transaction");
            self.state.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl StockStore for InMemoryStockStore {
    type Tx = StockState;

    fn transaction<T, E>(&self, work: impl FnOnce(&mut StockState) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut committed = self.lock();
        let mut working = committed.clone();
        let out = work(&mut working)?;
        *committed = working;
        Ok(out)
    }

    fn read<T, E>(&self, work: impl FnOnce(&StockState) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let state = self.lock();
        work(&state)
    }
}
