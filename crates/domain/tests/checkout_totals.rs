//! Integration tests running validation and pricing together, the way the
//! checkout step combines them.

use domain::{
    FailureReason, InventoryValidator, OrderDraft, PricingPolicy, RequestedItem, ShippingAddress,
};
use inventory_store::{InMemoryInventoryStore, InventoryStoreExt, ProductId, ProductRecord, UserId};

async fn store() -> InMemoryInventoryStore {
    InMemoryInventoryStore::with_products([
        ProductRecord::new("tee", "Tee", 1500, 10),
        ProductRecord::new("mug", "Mug", 1500, 3),
        ProductRecord::new("poster", "Poster", 3000, 10),
    ])
    .await
}

async fn draft_for(items: &[RequestedItem]) -> OrderDraft {
    let validator = InventoryValidator::new(store().await);
    let report = validator.validate(items).await.unwrap();
    assert!(report.valid, "unexpected failures: {:?}", report.failures);

    let order_items = report.order_items();
    let pricing = PricingPolicy::default().price_items(&order_items);
    OrderDraft::new(
        UserId::new("user-1"),
        order_items,
        pricing,
        ShippingAddress::new("1 Main St", "Springfield", "IL", "62701"),
        None,
    )
}

#[tokio::test]
async fn subtotal_45_pays_shipping() {
    let draft = draft_for(&[RequestedItem::new("tee", 2), RequestedItem::new("mug", 1)]).await;

    assert_eq!(draft.pricing.subtotal.cents(), 4500);
    assert_eq!(draft.pricing.tax.cents(), 360);
    assert_eq!(draft.pricing.shipping.cents(), 999);
    assert_eq!(draft.pricing.total.cents(), 5859);
}

#[tokio::test]
async fn subtotal_60_ships_free() {
    let draft = draft_for(&[RequestedItem::new("poster", 2)]).await;

    assert_eq!(draft.pricing.subtotal.cents(), 6000);
    assert_eq!(draft.pricing.tax.cents(), 480);
    assert_eq!(draft.pricing.shipping.cents(), 0);
    assert_eq!(draft.pricing.total.cents(), 6480);
}

#[tokio::test]
async fn short_and_unknown_items_are_reported() {
    let store = store().await;
    let validator = InventoryValidator::new(store.clone());

    let report = validator
        .validate(&[RequestedItem::new("mug", 5), RequestedItem::new("nope", 1)])
        .await
        .unwrap();

    assert!(!report.valid);
    assert_eq!(
        report.failures[0].reason,
        FailureReason::InsufficientStock {
            requested: 5,
            available: 3
        }
    );
    assert_eq!(report.failures[1].reason, FailureReason::NotFound);
    assert_eq!(store.stock_of(&ProductId::new("mug")).await.unwrap(), Some(3));
}
