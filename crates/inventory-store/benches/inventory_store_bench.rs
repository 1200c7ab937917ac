use criterion::{Criterion, criterion_group, criterion_main};
use inventory_store::{
    IdempotencyKey, InMemoryInventoryStore, InventoryStoreExt, OrderId, ProductId, ProductRecord,
    ReservationGroupId, ReservationRecord, TransactWriteItem, store::InventoryStore,
};

fn reservation(order: &OrderId, product: &ProductId) -> ReservationRecord {
    ReservationRecord::builder()
        .order_id(order.clone())
        .product_id(product.clone())
        .reservation_group_id(ReservationGroupId::generate(order))
        .quantity(1)
        .idempotency_key(IdempotencyKey::derived(order, "reserve"))
        .build()
}

async fn seeded_store(products: usize) -> InMemoryInventoryStore {
    InMemoryInventoryStore::with_products(
        (0..products).map(|i| ProductRecord::new(format!("p{i}"), "Item", 1000, 1_000_000)),
    )
    .await
}

fn bench_reserve_single_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(seeded_store(1));
    let product = ProductId::new("p0");

    c.bench_function("inventory_store/reserve_single_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = OrderId::generate();
                store
                    .transact_write(vec![
                        TransactWriteItem::decrement_stock(product.clone(), 1),
                        TransactWriteItem::put_reservation(reservation(&order, &product)),
                    ])
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_ten_items(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(seeded_store(10));
    let products: Vec<ProductId> = (0..10).map(|i| ProductId::new(format!("p{i}"))).collect();

    c.bench_function("inventory_store/reserve_ten_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = OrderId::generate();
                let items = products
                    .iter()
                    .flat_map(|p| {
                        [
                            TransactWriteItem::decrement_stock(p.clone(), 1),
                            TransactWriteItem::put_reservation(reservation(&order, p)),
                        ]
                    })
                    .collect();
                store.transact_write(items).await.unwrap();
            });
        });
    });
}

fn bench_active_reservations_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(seeded_store(1));
    let product = ProductId::new("p0");
    let target = OrderId::new("target");

    rt.block_on(async {
        for i in 0..1000 {
            let order = OrderId::new(format!("o-{i}"));
            store
                .transact_write(vec![TransactWriteItem::put_reservation(reservation(
                    &order, &product,
                ))])
                .await
                .unwrap();
        }
        store
            .transact_write(vec![TransactWriteItem::put_reservation(reservation(
                &target, &product,
            ))])
            .await
            .unwrap();
    });

    c.bench_function("inventory_store/active_reservations_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.active_reservations(&target).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_single_item,
    bench_reserve_ten_items,
    bench_active_reservations_lookup,
);
criterion_main!(benches);
