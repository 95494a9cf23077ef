use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use pharmastock_core::{
    BatchId, MovementId, PatientRef, Quantity, SessionRef, SubstanceId, TransferId, UnitId,
};
use pharmastock_inventory::{
    AllocationCandidate, BalanceKey, Batch, InventoryBalance, Movement, MovementKind, Substance,
    Transfer, Unit, UnitMinimumOverride,
};

use crate::allocation::AllocationResult;

/// Storage failure, as opposed to a rejected business operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store cannot be reached or its lock is poisoned.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint was violated.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Stored data contradicts itself (dangling reference, out-of-order ledger).
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Units, substances and per-unit minimum overrides.
pub trait CatalogRepository {
    fn unit(&self, id: UnitId) -> Result<Option<Unit>, StoreError>;

    fn units(&self) -> Result<Vec<Unit>, StoreError>;

    fn put_unit(&mut self, unit: Unit) -> Result<(), StoreError>;

    fn substance(&self, id: SubstanceId) -> Result<Option<Substance>, StoreError>;

    fn put_substance(&mut self, substance: Substance) -> Result<(), StoreError>;

    fn minimum_override(
        &self,
        substance_id: SubstanceId,
        unit_id: UnitId,
    ) -> Result<Option<UnitMinimumOverride>, StoreError>;

    fn put_minimum_override(&mut self, entry: UnitMinimumOverride) -> Result<(), StoreError>;
}

/// Batch registry. Lot codes are unique per (substance, unit).
pub trait BatchRepository {
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    fn find_by_lot(
        &self,
        substance_id: SubstanceId,
        unit_id: UnitId,
        lot_code: &str,
    ) -> Result<Option<Batch>, StoreError>;

    /// Batches of a substance registered at a unit, in registration order.
    fn batches_at(&self, substance_id: SubstanceId, unit_id: UnitId)
    -> Result<Vec<Batch>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the id or lot code is taken.
    fn insert_batch(&mut self, batch: Batch) -> Result<(), StoreError>;
}

/// Per-(substance, batch, unit) balance rows.
pub trait BalanceRepository {
    fn balance(&self, key: &BalanceKey) -> Result<Option<InventoryBalance>, StoreError>;

    /// Rows of one substance, optionally restricted to one unit, in key order.
    fn balances_of(
        &self,
        substance_id: SubstanceId,
        unit_id: Option<UnitId>,
    ) -> Result<Vec<InventoryBalance>, StoreError>;

    /// Every row held at a unit, in key order.
    fn balances_at_unit(&self, unit_id: UnitId) -> Result<Vec<InventoryBalance>, StoreError>;

    fn all_balances(&self) -> Result<Vec<InventoryBalance>, StoreError>;

    /// Non-empty rows for an allocation, joined with their batch data and
    /// already in allocation order.
    ///
    /// Reading them through the transaction is what locks them: no other
    /// transaction can commit a change to these rows until this one ends.
    fn lock_candidates(
        &mut self,
        substance_id: SubstanceId,
        unit_id: UnitId,
    ) -> Result<Vec<AllocationCandidate>, StoreError>;

    fn put_balance(&mut self, row: InventoryBalance) -> Result<(), StoreError>;

    /// Current on-hand quantity; a missing row reads as zero.
    fn on_hand(&self, key: &BalanceKey) -> Result<Quantity, StoreError> {
        Ok(self.balance(key)?.map(|row| row.on_hand).unwrap_or(Quantity::ZERO))
    }
}

/// Filter over the movement ledger; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub substance_id: Option<SubstanceId>,
    pub unit_id: Option<UnitId>,
    pub batch_id: Option<BatchId>,
    pub kind: Option<MovementKind>,
    pub patient: Option<PatientRef>,
    pub session: Option<SessionRef>,
    pub transfer: Option<TransferId>,
}

impl MovementFilter {
    pub fn for_key(key: &BalanceKey) -> Self {
        Self {
            substance_id: Some(key.substance_id),
            unit_id: Some(key.unit_id),
            batch_id: Some(key.batch_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, m: &Movement) -> bool {
        fn hit<T: PartialEq>(want: &Option<T>, got: &T) -> bool {
            want.as_ref().is_none_or(|w| w == got)
        }
        fn hit_opt<T: PartialEq>(want: &Option<T>, got: &Option<T>) -> bool {
            want.is_none() || want == got
        }

        hit(&self.substance_id, &m.substance_id)
            && hit(&self.unit_id, &m.unit_id)
            && hit(&self.batch_id, &m.batch_id)
            && hit(&self.kind, &m.kind)
            && hit_opt(&self.patient, &m.links.patient)
            && hit_opt(&self.session, &m.links.session)
            && hit_opt(&self.transfer, &m.links.transfer)
    }
}

/// Append-only movement ledger.
pub trait MovementRepository {
    /// Append one movement. Its `ledger_seq` must be greater than every
    /// sequence already in the ledger.
    fn append_movement(&mut self, movement: Movement) -> Result<(), StoreError>;

    fn movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Matching movements in ledger order.
    fn movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StoreError>;
}

pub trait TransferRepository {
    fn insert_transfer(&mut self, transfer: Transfer) -> Result<(), StoreError>;

    fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    fn transfer_by_code(&self, code: &str) -> Result<Option<Transfer>, StoreError>;
}

/// A completed allocation remembered under its caller-supplied request key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub request_key: Uuid,
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub quantity: Quantity,
    pub result: AllocationResult,
}

/// Idempotency records for issues.
pub trait AllocationRepository {
    fn allocation_record(&self, request_key: Uuid) -> Result<Option<AllocationRecord>, StoreError>;

    fn put_allocation_record(&mut self, record: AllocationRecord) -> Result<(), StoreError>;
}

/// Named, gap-free (within committed transactions) counters.
pub trait SequenceRepository {
    fn next_sequence(&mut self, name: &str) -> Result<u64, StoreError>;
}

/// Everything an operation may touch inside one transaction.
pub trait StockTx:
    CatalogRepository
    + BatchRepository
    + BalanceRepository
    + MovementRepository
    + TransferRepository
    + AllocationRepository
    + SequenceRepository
{
}

impl<T> StockTx for T where
    T: CatalogRepository
        + BatchRepository
        + BalanceRepository
        + MovementRepository
        + TransferRepository
        + AllocationRepository
        + SequenceRepository
{
}

/// Transactional stock store.
///
/// Implementations must:
/// - serialize transactions that touch the same balance rows
/// - apply every write of a transaction, or none of them
/// - never expose a transaction's writes before it commits
pub trait StockStore: Send + Sync {
    type Tx: StockTx;

    /// Run `work` in a transaction. Commits when it returns `Ok`; discards
    /// every write when it returns `Err`.
    fn transaction<T, E>(&self, work: impl FnOnce(&mut Self::Tx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>;

    /// Run `work` against a consistent committed snapshot.
    fn read<T, E>(&self, work: impl FnOnce(&Self::Tx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore,
{
    type Tx = S::Tx;

    fn transaction<T, E>(&self, work: impl FnOnce(&mut Self::Tx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        (**self).transaction(work)
    }

    fn read<T, E>(&self, work: impl FnOnce(&Self::Tx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        (**self).read(work)
    }
}
