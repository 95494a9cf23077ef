//! Read-side views over balances: stock summaries, expiry alerts, low stock.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, DomainError, Quantity, SubstanceId, UnitId};
use pharmastock_inventory::{ExpiryStatus, Substance, effective_minimum};

use crate::error::StockError;
use crate::store::StockTx;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStock {
    pub batch_id: BatchId,
    pub unit_id: UnitId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub on_hand: Quantity,
    pub expiry_status: ExpiryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStock {
    pub unit_id: UnitId,
    pub on_hand: Quantity,
    pub minimum: Quantity,
    pub is_low: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub substance_id: SubstanceId,
    pub total: Quantity,
    /// Batches with stock, earliest expiry first.
    pub per_batch: Vec<BatchStock>,
    pub per_unit: Vec<UnitStock>,
    /// True when any reported unit is at or below its minimum.
    pub is_low: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryAlert {
    pub substance_id: SubstanceId,
    pub batch_id: BatchId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub on_hand: Quantity,
    pub status: ExpiryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockEntry {
    pub substance_id: SubstanceId,
    pub unit_id: UnitId,
    pub on_hand: Quantity,
    pub minimum: Quantity,
}

pub(crate) fn require_substance<T: StockTx>(
    tx: &T,
    id: SubstanceId,
) -> Result<Substance, StockError> {
    Ok(tx
        .substance(id)?
        .ok_or_else(|| DomainError::unknown("substance", id))?)
}

pub(crate) fn require_active_unit<T: StockTx>(tx: &T, id: UnitId) -> Result<(), StockError> {
    tx.unit(id)?
        .ok_or_else(|| DomainError::unknown("unit", id))?
        .ensure_active()?;
    Ok(())
}

/// Active unit override, else the substance default.
pub fn minimum_for<T: StockTx>(
    tx: &T,
    substance: &Substance,
    unit_id: UnitId,
) -> Result<Quantity, StockError> {
    let entry = tx.minimum_override(substance.id, unit_id)?;
    Ok(effective_minimum(substance, entry.as_ref()))
}

/// (unit total, minimum) for one substance at one unit.
pub fn stock_level<T: StockTx>(
    tx: &T,
    substance: &Substance,
    unit_id: UnitId,
) -> Result<UnitStock, StockError> {
    let on_hand: Quantity = tx
        .balances_of(substance.id, Some(unit_id))?
        .iter()
        .map(|row| row.on_hand)
        .sum();
    let minimum = minimum_for(tx, substance, unit_id)?;
    Ok(UnitStock {
        unit_id,
        on_hand,
        minimum,
        is_low: on_hand <= minimum,
    })
}

pub fn stock_summary<T: StockTx>(
    tx: &T,
    substance_id: SubstanceId,
    unit_id: Option<UnitId>,
    today: NaiveDate,
) -> Result<StockSummary, StockError> {
    let substance = require_substance(tx, substance_id)?;
    if let Some(unit) = unit_id {
        if tx.unit(unit)?.is_none() {
            return Err(DomainError::unknown("unit", unit).into());
        }
    }

    let rows = tx.balances_of(substance_id, unit_id)?;
    let mut per_batch = Vec::new();
    let mut units: BTreeSet<UnitId> = unit_id.into_iter().collect();
    for row in &rows {
        units.insert(row.key.unit_id);
        if !row.on_hand.is_positive() {
            continue;
        }
        let batch = tx.batch(row.key.batch_id)?.ok_or_else(|| {
            StockError::InvariantViolation(format!("balance {} has no batch", row.key))
        })?;
        per_batch.push(BatchStock {
            batch_id: batch.id,
            unit_id: row.key.unit_id,
            expiry_status: batch.expiry_status(today, substance.expiry_alert_days),
            lot_code: batch.lot_code,
            expiry_date: batch.expiry_date,
            on_hand: row.on_hand,
        });
    }
    per_batch.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then(a.lot_code.cmp(&b.lot_code))
    });

    let per_unit = units
        .into_iter()
        .map(|unit| stock_level(tx, &substance, unit))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StockSummary {
        substance_id,
        total: rows.iter().map(|r| r.on_hand).sum(),
        is_low: per_unit.iter().any(|u| u.is_low),
        per_batch,
        per_unit,
    })
}

/// Batches with stock at `unit_id` that are expired or inside their
/// substance's alert window, soonest first.
pub fn expiry_alerts<T: StockTx>(
    tx: &T,
    unit_id: UnitId,
    today: NaiveDate,
) -> Result<Vec<ExpiryAlert>, StockError> {
    if tx.unit(unit_id)?.is_none() {
        return Err(DomainError::unknown("unit", unit_id).into());
    }
    let mut substances: BTreeMap<SubstanceId, Substance> = BTreeMap::new();
    let mut alerts = Vec::new();

    for row in tx.balances_at_unit(unit_id)? {
        if !row.on_hand.is_positive() {
            continue;
        }
        let substance = match substances.get(&row.key.substance_id) {
            Some(s) => s.clone(),
            None => {
                let s = require_substance(tx, row.key.substance_id)?;
                substances.insert(s.id, s.clone());
                s
            }
        };
        let Some(batch) = tx.batch(row.key.batch_id)? else {
            continue;
        };
        let status = batch.expiry_status(today, substance.expiry_alert_days);
        if status == ExpiryStatus::Valid {
            continue;
        }
        alerts.push(ExpiryAlert {
            substance_id: substance.id,
            batch_id: batch.id,
            lot_code: batch.lot_code,
            expiry_date: batch.expiry_date,
            on_hand: row.on_hand,
            status,
        });
    }

    alerts.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then(a.lot_code.cmp(&b.lot_code))
    });
    Ok(alerts)
}

/// Substances stocked at `unit_id` whose unit total is at or below minimum.
pub fn low_stock<T: StockTx>(tx: &T, unit_id: UnitId) -> Result<Vec<LowStockEntry>, StockError> {
    if tx.unit(unit_id)?.is_none() {
        return Err(DomainError::unknown("unit", unit_id).into());
    }
    let stocked: BTreeSet<SubstanceId> = tx
        .balances_at_unit(unit_id)?
        .iter()
        .map(|row| row.key.substance_id)
        .collect();

    let mut out = Vec::new();
    for substance_id in stocked {
        let substance = require_substance(tx, substance_id)?;
        let level = stock_level(tx, &substance, unit_id)?;
        if level.is_low {
            out.push(LowStockEntry {
                substance_id,
                unit_id,
                on_hand: level.on_hand,
                minimum: level.minimum,
            });
        }
    }
    Ok(out)
}
