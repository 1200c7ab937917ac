use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::record::{IdempotencyRecord, ProductRecord, ReservationRecord};
use crate::transaction::TransactWriteItem;
use crate::{IdempotencyKey, OrderId, ProductId, ReservationQuery, Result};

/// Core trait for inventory store implementations.
///
/// Covers the catalog's product stock records, the reservation log and the
/// idempotency records. All implementations must be thread-safe
/// (Send + Sync); the only serialization point between concurrent callers is
/// the conditional write itself.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Fetches a product stock record.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductRecord>>;

    /// Inserts or replaces a product record. Catalog seeding only; stock
    /// changes on the checkout path go through the conditional primitives.
    async fn put_product(&self, product: ProductRecord) -> Result<()>;

    /// Adds `delta` to a product's stock in a single conditional update.
    ///
    /// Fails with `ConditionFailed` if the product is missing, if
    /// `expected_min_stock` is set and not met, or if the result would be
    /// negative. Returns the updated record.
    async fn conditional_update_stock(
        &self,
        product_id: &ProductId,
        delta: i64,
        expected_min_stock: Option<u32>,
    ) -> Result<ProductRecord>;

    /// Applies every write atomically, or none of them.
    ///
    /// If any write's condition fails the whole transaction is cancelled with
    /// `TransactionCanceled`, reporting every failed condition.
    async fn transact_write(&self, items: Vec<TransactWriteItem>) -> Result<()>;

    /// Fetches the reservation record for an (order, product) pair.
    async fn get_reservation(
        &self,
        order_id: &OrderId,
        product_id: &ProductId,
    ) -> Result<Option<ReservationRecord>>;

    /// Retrieves reservation records matching a query, oldest first.
    async fn query_reservations(&self, query: ReservationQuery) -> Result<Vec<ReservationRecord>>;

    /// Fetches an unexpired idempotency record.
    async fn get_idempotency_record(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>>;

    /// Writes an idempotency record unless an unexpired one already exists
    /// for the key, in which case `DuplicateKey` is returned.
    async fn put_idempotency_record(&self, record: IdempotencyRecord) -> Result<()>;

    /// Deletes idempotency records and settled (committed or released)
    /// reservations whose expiry is at or before `cutoff`.
    ///
    /// Active reservations are kept whatever their expiry: their stock has
    /// to be returned by a release first. Returns the number of rows removed.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Extension trait providing convenience methods for inventory stores.
#[async_trait]
pub trait InventoryStoreExt: InventoryStore {
    /// Returns the active reservations of an order.
    async fn active_reservations(&self, order_id: &OrderId) -> Result<Vec<ReservationRecord>> {
        self.query_reservations(ReservationQuery::active_for_order(order_id.clone()))
            .await
    }

    /// Returns the current stock of a product, or None if it does not exist.
    async fn stock_of(&self, product_id: &ProductId) -> Result<Option<u32>> {
        Ok(self.get_product(product_id).await?.map(|p| p.stock))
    }
}

// Blanket implementation for all InventoryStore implementations
impl<T: InventoryStore + ?Sized> InventoryStoreExt for T {}
