//! Earliest-expiry-first allocation planning.
//!
//! Pure planning step: given the candidate balances of one (substance, unit)
//! and a requested quantity, decide which batches to draw from and how much.
//! Recording the resulting movements is the infrastructure's job.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, DomainError, DomainResult, Quantity};

/// One balance row eligible for allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCandidate {
    pub batch_id: BatchId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub registration_seq: u64,
    pub on_hand: Quantity,
}

/// Quantity taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub batch_id: BatchId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub quantity: Quantity,
    /// Balance left in the batch after this draw.
    pub remaining: Quantity,
}

/// Non-fatal notice that expired stock was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryWarning {
    pub batch_id: BatchId,
    pub lot_code: String,
    pub expiry_date: NaiveDate,
    pub quantity_drawn: Quantity,
}

impl core::fmt::Display for ExpiryWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "lot {} expired on {} ({} drawn)",
            self.lot_code, self.expiry_date, self.quantity_drawn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested: Quantity,
    pub draws: Vec<Draw>,
    pub warnings: Vec<ExpiryWarning>,
}

impl AllocationPlan {
    pub fn total_drawn(&self) -> Quantity {
        self.draws.iter().map(|d| d.quantity).sum()
    }
}

/// Deterministic allocation order: expiry ascending, then registration order.
///
/// The batch id is a final tie-break so the order is total even for
/// malformed data with duplicate registration numbers.
pub fn order_candidates(candidates: &mut [AllocationCandidate]) {
    candidates.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then(a.registration_seq.cmp(&b.registration_seq))
            .then(a.batch_id.cmp(&b.batch_id))
    });
}

/// Plan an issue of `requested` across `candidates`.
///
/// - zero `requested` is a validation error
/// - empty balances are never drawn from
/// - if the candidates hold less than `requested` in total, nothing is planned
///   and `InsufficientStock` is returned
/// - each batch is exhausted before the next one is touched
pub fn plan_allocation(
    mut candidates: Vec<AllocationCandidate>,
    requested: Quantity,
    today: NaiveDate,
) -> DomainResult<AllocationPlan> {
    requested.ensure_positive()?;

    candidates.retain(|c| c.on_hand.is_positive());
    order_candidates(&mut candidates);

    let available: Quantity = candidates.iter().map(|c| c.on_hand).sum();
    if available < requested {
        return Err(DomainError::insufficient(requested, available));
    }

    let mut outstanding = requested;
    let mut draws = Vec::new();
    let mut warnings = Vec::new();

    for c in candidates {
        if outstanding.is_zero() {
            break;
        }
        let take = c.on_hand.min(outstanding);
        let remaining = c
            .on_hand
            .checked_sub(take)
            .ok_or_else(|| DomainError::invariant("allocation drew more than the batch holds"))?;
        outstanding = outstanding
            .checked_sub(take)
            .ok_or_else(|| DomainError::invariant("allocation overshot the request"))?;

        if c.expiry_date < today {
            warnings.push(ExpiryWarning {
                batch_id: c.batch_id,
                lot_code: c.lot_code.clone(),
                expiry_date: c.expiry_date,
                quantity_drawn: take,
            });
        }
        draws.push(Draw {
            batch_id: c.batch_id,
            lot_code: c.lot_code,
            expiry_date: c.expiry_date,
            quantity: take,
            remaining,
        });
    }

    Ok(AllocationPlan {
        requested,
        draws,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Days::new(u64::from(n))
    }

    fn candidate(lot: &str, expiry: u32, seq: u64, on_hand: Decimal) -> AllocationCandidate {
        AllocationCandidate {
            batch_id: BatchId::new(),
            lot_code: lot.to_string(),
            expiry_date: day(expiry),
            registration_seq: seq,
            on_hand: Quantity::new(on_hand).unwrap(),
        }
    }

    fn q(v: Decimal) -> Quantity {
        Quantity::new(v).unwrap()
    }

    #[test]
    fn splits_across_batches_earliest_expiry_first() {
        let a = candidate("A", 10, 1, dec!(3));
        let b = candidate("B", 20, 2, dec!(5));
        // Registered out of expiry order on purpose.
        let plan = plan_allocation(vec![b.clone(), a.clone()], q(dec!(4)), day(0)).unwrap();

        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].batch_id, a.batch_id);
        assert_eq!(plan.draws[0].quantity, q(dec!(3)));
        assert_eq!(plan.draws[0].remaining, Quantity::ZERO);
        assert_eq!(plan.draws[1].batch_id, b.batch_id);
        assert_eq!(plan.draws[1].quantity, q(dec!(1)));
        assert_eq!(plan.draws[1].remaining, q(dec!(4)));
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn insufficient_total_plans_nothing() {
        let err = plan_allocation(
            vec![candidate("A", 10, 1, dec!(3)), candidate("B", 20, 2, dec!(5))],
            q(dec!(10)),
            day(0),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::insufficient(q(dec!(10)), q(dec!(8))));
    }

    #[test]
    fn exact_total_drains_every_batch() {
        let plan = plan_allocation(
            vec![candidate("A", 10, 1, dec!(3)), candidate("B", 20, 2, dec!(5))],
            q(dec!(8)),
            day(0),
        )
        .unwrap();
        assert!(plan.draws.iter().all(|d| d.remaining.is_zero()));
        assert_eq!(plan.total_drawn(), q(dec!(8)));
    }

    #[test]
    fn equal_expiry_is_drawn_in_registration_order() {
        let first = candidate("FIRST", 15, 1, dec!(2));
        let second = candidate("SECOND", 15, 2, dec!(2));
        let plan = plan_allocation(vec![second.clone(), first.clone()], q(dec!(3)), day(0)).unwrap();
        assert_eq!(plan.draws[0].batch_id, first.batch_id);
        assert_eq!(plan.draws[1].batch_id, second.batch_id);
    }

    #[test]
    fn zero_balances_are_not_candidates() {
        let empty = candidate("EMPTY", 1, 1, dec!(0));
        let full = candidate("FULL", 30, 2, dec!(4));
        let plan = plan_allocation(vec![empty, full.clone()], q(dec!(1)), day(0)).unwrap();
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].batch_id, full.batch_id);
    }

    #[test]
    fn zero_request_is_a_validation_error() {
        let err = plan_allocation(vec![candidate("A", 1, 1, dec!(1))], Quantity::ZERO, day(0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn expired_batches_warn_but_are_used() {
        let old = candidate("OLD", 5, 1, dec!(1));
        let fresh = candidate("NEW", 50, 2, dec!(5));
        let plan = plan_allocation(vec![old.clone(), fresh], q(dec!(2)), day(6)).unwrap();
        assert_eq!(plan.total_drawn(), q(dec!(2)));
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.warnings[0].batch_id, old.batch_id);
        assert_eq!(plan.warnings[0].quantity_drawn, q(dec!(1)));
    }

    #[test]
    fn batch_expiring_today_is_not_expired() {
        let plan = plan_allocation(vec![candidate("TODAY", 6, 1, dec!(1))], q(dec!(1)), day(6)).unwrap();
        assert!(plan.warnings.is_empty());
    }

    fn candidates_strategy() -> impl Strategy<Value = Vec<(u32, u64)>> {
        // (expiry day, on hand in hundredths)
        prop::collection::vec((0u32..60, 0u64..5_000), 1..12)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a satisfiable request is met exactly; earlier-expiring batches
        /// are exhausted before later ones are touched; no draw exceeds its batch.
        #[test]
        fn plan_respects_ordering_law(raw in candidates_strategy(), pct in 1u64..=100) {
            let candidates: Vec<_> = raw
                .iter()
                .enumerate()
                .map(|(i, (exp, hundredths))| {
                    candidate(&format!("L{i}"), *exp, i as u64, Decimal::new(*hundredths as i64, 2))
                })
                .collect();
            let total: u64 = raw.iter().map(|(_, h)| *h).sum();
            prop_assume!(total > 0);
            let requested_hundredths = (total * pct / 100).max(1);
            let requested = q(Decimal::new(requested_hundredths as i64, 2));

            let plan = plan_allocation(candidates.clone(), requested, day(0)).unwrap();
            prop_assert_eq!(plan.total_drawn(), requested);

            for (i, d) in plan.draws.iter().enumerate() {
                let src = candidates.iter().find(|c| c.batch_id == d.batch_id).unwrap();
                prop_assert!(d.quantity <= src.on_hand);
                prop_assert!(d.quantity.is_positive());
                if i + 1 < plan.draws.len() {
                    prop_assert!(d.remaining.is_zero());
                    prop_assert!(d.expiry_date <= plan.draws[i + 1].expiry_date);
                }
            }

            // Determinism: the same input yields the same split.
            let again = plan_allocation(candidates, requested, day(0)).unwrap();
            prop_assert_eq!(plan, again);
        }
    }
}
