//! The movement ledger: the only way stock changes.

use chrono::{DateTime, Utc};
use tracing::debug;

use pharmastock_core::{DomainError, MovementId, Quantity};
use pharmastock_inventory::{BalanceEffect, BalanceKey, InventoryBalance, Movement, MovementDraft};

use crate::error::StockError;
use crate::store::{StockTx, sequences};

/// Records movements and applies their balance effect, inside the caller's
/// transaction.
pub struct MovementLedger;

impl MovementLedger {
    /// Record one movement.
    ///
    /// Validates the draft, checks the batch belongs to the balance key,
    /// applies exactly one balance mutation and appends the movement. If the
    /// mutation would overdraw the row, returns `InsufficientStock` and the
    /// caller's transaction must be discarded.
    pub fn record<T: StockTx>(
        tx: &mut T,
        draft: MovementDraft,
        at: DateTime<Utc>,
    ) -> Result<Movement, StockError> {
        let key = draft.key;
        let batch = tx
            .batch(key.batch_id)?
            .ok_or_else(|| DomainError::unknown("batch", key.batch_id))?;
        if batch.substance_id != key.substance_id || batch.unit_id != key.unit_id {
            return Err(StockError::validation(format!(
                "batch {} does not hold substance {} at unit {}",
                batch.lot_code, key.substance_id, key.unit_id
            )));
        }

        let effect = draft.effect()?;
        let mut row = tx
            .balance(&key)?
            .unwrap_or_else(|| InventoryBalance::opened(key, at));
        let before = row.on_hand;

        let seq = tx.next_sequence(sequences::LEDGER)?;
        let movement = draft.commit(MovementId::new(), seq, before, at)?;

        let after = Self::apply(&mut row, effect, at)?;
        if after != movement.balance_after {
            return Err(StockError::InvariantViolation(format!(
                "balance {key} moved to {after}, ledger expected {}",
                movement.balance_after
            )));
        }

        tx.put_balance(row)?;
        tx.append_movement(movement.clone())?;

        debug!(
            movement_id = %movement.id,
            kind = %movement.kind,
            balance = %key,
            before = %movement.balance_before,
            after = %movement.balance_after,
            "movement recorded"
        );
        Ok(movement)
    }

    fn apply(
        row: &mut InventoryBalance,
        effect: BalanceEffect,
        at: DateTime<Utc>,
    ) -> Result<Quantity, StockError> {
        match effect {
            BalanceEffect::Delta(delta) => Ok(row.apply_delta(delta, at)?),
            BalanceEffect::SetTo(quantity) => {
                row.set(quantity, at);
                Ok(quantity)
            }
        }
    }

    /// Balance of one row as of the committed ledger.
    pub fn balance<T: StockTx>(tx: &T, key: &BalanceKey) -> Result<Quantity, StockError> {
        Ok(tx.on_hand(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pharmastock_core::{Money, SubstanceId, UnitId, UserId};
    use pharmastock_inventory::{Batch, MovementKind};
    use rust_decimal_macros::dec;

    use crate::store::{BatchRepository, MovementFilter, MovementRepository, StockState};

    fn seeded() -> (StockState, BalanceKey) {
        let mut state = StockState::default();
        let (s, u) = (SubstanceId::new(), UnitId::new());
        let batch = Batch {
            id: pharmastock_core::BatchId::new(),
            substance_id: s,
            unit_id: u,
            lot_code: "L1".into(),
            expiry_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            received_quantity: Quantity::from(10),
            unit_cost: Money::ZERO,
            supplier: "acme".into(),
            invoice_ref: None,
            registration_seq: 1,
            source_batch: None,
            created_by: UserId::new(),
            created_at: Utc::now(),
        };
        let key = BalanceKey::new(s, batch.id, u);
        state.insert_batch(batch).unwrap();
        (state, key)
    }

    fn draft(kind: MovementKind, key: BalanceKey, qty: u32) -> MovementDraft {
        MovementDraft::new(kind, key, Quantity::from(qty), "test", UserId::new())
    }

    #[test]
    fn receipt_then_issue_updates_row_and_ledger() {
        let (mut tx, key) = seeded();
        MovementLedger::record(&mut tx, draft(MovementKind::Receipt, key, 10), Utc::now()).unwrap();
        let m = MovementLedger::record(&mut tx, draft(MovementKind::Issue, key, 4), Utc::now()).unwrap();

        assert_eq!(m.balance_before, Quantity::from(10));
        assert_eq!(m.balance_after, Quantity::from(6));
        assert_eq!(MovementLedger::balance(&tx, &key).unwrap(), Quantity::from(6));

        let history = tx.movements(&MovementFilter::for_key(&key)).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].ledger_seq < history[1].ledger_seq);
    }

    #[test]
    fn overdraw_fails_without_touching_the_row() {
        let (mut tx, key) = seeded();
        MovementLedger::record(&mut tx, draft(MovementKind::Receipt, key, 3), Utc::now()).unwrap();

        let err = MovementLedger::record(&mut tx, draft(MovementKind::Loss, key, 5), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientStock {
                requested: Quantity::from(5),
                available: Quantity::from(3)
            }
        );
        assert_eq!(MovementLedger::balance(&tx, &key).unwrap(), Quantity::from(3));
        assert_eq!(tx.movements(&MovementFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn adjustment_sets_absolute_balance() {
        let (mut tx, key) = seeded();
        MovementLedger::record(&mut tx, draft(MovementKind::Receipt, key, 10), Utc::now()).unwrap();
        let mut adj = draft(MovementKind::Adjustment, key, 0);
        adj.quantity = Quantity::new(dec!(7.5)).unwrap();
        let m = MovementLedger::record(&mut tx, adj, Utc::now()).unwrap();

        assert_eq!(m.signed_delta(), dec!(-2.5));
        assert_eq!(MovementLedger::balance(&tx, &key).unwrap(), Quantity::new(dec!(7.5)).unwrap());
    }

    #[test]
    fn batch_must_belong_to_the_key() {
        let (mut tx, key) = seeded();
        let wrong = BalanceKey::new(key.substance_id, key.batch_id, UnitId::new());
        let err = MovementLedger::record(&mut tx, draft(MovementKind::Receipt, wrong, 1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
    }
}
