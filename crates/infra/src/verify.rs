//! Ledger consistency check: every balance must equal the sum of its
//! movements' signed contributions.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmastock_core::Quantity;
use pharmastock_inventory::{BalanceKey, Movement, MovementKind};

use crate::error::StockError;
use crate::store::{MovementFilter, StockTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDiscrepancy {
    pub key: BalanceKey,
    /// Sum of signed contributions recorded in the ledger.
    pub ledger_total: Decimal,
    /// Stored balance; `None` when the row is missing.
    pub balance: Option<Quantity>,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReport {
    pub balances_checked: usize,
    pub movements_checked: usize,
    pub discrepancies: Vec<LedgerDiscrepancy>,
}

impl LedgerReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

fn chain_error(m: &Movement, running: Decimal) -> Option<String> {
    if m.balance_before.value() != running {
        return Some(format!(
            "movement {} starts from {} but the ledger stands at {running}",
            m.id, m.balance_before
        ));
    }
    let expected = match m.kind {
        MovementKind::Adjustment => return None,
        _ => m.direction.signed(m.quantity),
    };
    if m.signed_delta() != expected {
        return Some(format!(
            "{} movement {} changed the balance by {} instead of {expected}",
            m.kind,
            m.id,
            m.signed_delta()
        ));
    }
    None
}

pub fn verify_ledger<T: StockTx>(tx: &T) -> Result<LedgerReport, StockError> {
    let movements = tx.movements(&MovementFilter::default())?;
    let mut report = LedgerReport {
        movements_checked: movements.len(),
        ..LedgerReport::default()
    };

    let mut running: BTreeMap<BalanceKey, Decimal> = BTreeMap::new();
    let mut broken: BTreeMap<BalanceKey, String> = BTreeMap::new();
    for m in &movements {
        let total = running.entry(m.key()).or_default();
        if let Some(detail) = chain_error(m, *total) {
            broken.entry(m.key()).or_insert(detail);
        }
        *total += m.signed_delta();
    }

    let balances = tx.all_balances()?;
    report.balances_checked = balances.len();
    for row in &balances {
        let ledger_total = running.remove(&row.key).unwrap_or_default();
        let detail = broken.remove(&row.key).or_else(|| {
            (ledger_total != row.on_hand.value()).then(|| {
                format!(
                    "balance {} differs from ledger total {ledger_total}",
                    row.on_hand
                )
            })
        });
        if let Some(detail) = detail {
            report.discrepancies.push(LedgerDiscrepancy {
                key: row.key,
                ledger_total,
                balance: Some(row.on_hand),
                detail,
            });
        }
    }

    for (key, ledger_total) in running {
        report.discrepancies.push(LedgerDiscrepancy {
            key,
            ledger_total,
            balance: None,
            detail: "movements recorded for a missing balance row".to_string(),
        });
    }
    Ok(report)
}
