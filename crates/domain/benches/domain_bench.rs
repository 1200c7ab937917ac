use criterion::{Criterion, criterion_group, criterion_main};
use domain::{InventoryValidator, Money, OrderItem, PricingPolicy, RequestedItem};
use inventory_store::{InMemoryInventoryStore, ProductRecord};

fn bench_price_items(c: &mut Criterion) {
    let policy = PricingPolicy::default();
    let items: Vec<OrderItem> = (0..20)
        .map(|i| OrderItem::new(format!("p{i}"), "Item", 2, Money::from_cents(1999)))
        .collect();

    c.bench_function("domain/price_20_items", |b| {
        b.iter(|| policy.price_items(&items));
    });
}

fn bench_validate_items(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(InMemoryInventoryStore::with_products(
        (0..20).map(|i| ProductRecord::new(format!("p{i}"), "Item", 1999, 1000)),
    ));
    let validator = InventoryValidator::new(store);
    let items: Vec<RequestedItem> = (0..20)
        .map(|i| RequestedItem::new(format!("p{i}"), 2))
        .collect();

    c.bench_function("domain/validate_20_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = validator.validate(&items).await.unwrap();
                assert!(report.valid);
            });
        });
    });
}

criterion_group!(benches, bench_price_items, bench_validate_items);
criterion_main!(benches);
