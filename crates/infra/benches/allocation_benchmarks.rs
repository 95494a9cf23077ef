use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use pharmastock_core::{BatchId, FixedClock, Money, Quantity, SubstanceId, UnitId, UserId};
use pharmastock_events::InMemoryEventBus;
use pharmastock_infra::{
    InMemoryStockStore, IssueRequest, ReceiptRequest, StockEnvelope, StockService,
};
use pharmastock_inventory::{AllocationCandidate, Substance, Unit, plan_allocation};
use rust_decimal::Decimal;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default()
}

fn candidates(n: usize) -> Vec<AllocationCandidate> {
    (0..n)
        .map(|i| AllocationCandidate {
            batch_id: BatchId::new(),
            lot_code: format!("L{i}"),
            // Spread expiries so ordering has real work to do.
            expiry_date: today() + Days::new(((i * 7919) % 365) as u64),
            registration_seq: i as u64,
            on_hand: Quantity::from(10),
        })
        .collect()
}

/// Pure planning over an unordered candidate list.
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_allocation");
    for &n in &[10usize, 100, 1_000] {
        let input = candidates(n);
        // Needs about half the batches.
        let requested = Quantity::from((n as u32) * 5);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, input| {
            b.iter_batched(
                || input.clone(),
                |cands| plan_allocation(black_box(cands), requested, today()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

type Service = StockService<Arc<InMemoryStockStore>, Arc<InMemoryEventBus<StockEnvelope>>>;

fn stocked_service(batches: usize) -> (Service, SubstanceId, UnitId) {
    let service: Service = StockService::new(
        Arc::new(InMemoryStockStore::new()),
        Arc::new(InMemoryEventBus::new()),
    )
    .with_clock(Arc::new(FixedClock::on(today())));

    let unit = UnitId::new();
    let substance = SubstanceId::new();
    let actor = UserId::new();
    let setup = || -> Result<(), pharmastock_infra::StockError> {
        service.register_unit(Unit::new(unit, "BENCH", "Bench unit")?)?;
        service.register_substance(Substance::new(substance, "Bench", "unit")?)?;
        for i in 0..batches {
            service.receive(ReceiptRequest {
                substance_id: substance,
                unit_id: unit,
                lot_code: format!("L{i}"),
                expiry_date: today() + Days::new(((i * 7919) % 365) as u64 + 1),
                quantity: Quantity::from(1_000),
                supplier: "bench".to_string(),
                unit_cost: Money::new(Decimal::ONE)?,
                invoice_ref: None,
                actor,
            })?;
        }
        Ok(())
    };
    if let Err(e) = setup() {
        panic!("bench setup failed: {e}");
    }
    (service, substance, unit)
}

/// Full issue path: transaction, locking, ledger writes, publication.
fn bench_issue(c: &mut Criterion) {
    let mut group = c.benchmark_group("issue");
    group.sample_size(20);
    for &n in &[10usize, 100] {
        let actor = UserId::new();
        // Drains about half the batches.
        let requested = Quantity::from((n as u32) * 500);
        group.bench_function(BenchmarkId::new("split_over_batches", n), |b| {
            b.iter_batched(
                || stocked_service(n),
                |(service, substance, unit)| {
                    let req = IssueRequest::new(substance, unit, requested, "bench", actor);
                    black_box(service.issue(req))
                },
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan, bench_issue);
criterion_main!(benches);
