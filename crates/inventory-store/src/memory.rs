use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::record::{IdempotencyRecord, ProductRecord, ReservationRecord, ReservationStatus};
use crate::store::InventoryStore;
use crate::transaction::{
    ConditionFailure, FailedCondition, StockCondition, TransactWriteItem, validate_transaction,
};
use crate::{IdempotencyKey, OrderId, ProductId, ReservationQuery, Result, StoreError};

#[derive(Default)]
struct InventoryState {
    products: HashMap<ProductId, ProductRecord>,
    reservations: BTreeMap<(OrderId, ProductId), ReservationRecord>,
    idempotency: HashMap<IdempotencyKey, IdempotencyRecord>,
    unavailable: bool,
    fail_idempotency_writes: bool,
}

/// In-memory inventory store implementation for testing and local runs.
///
/// A single write lock around all three record families makes every
/// transaction atomic with respect to every other.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InventoryState>>,
    product_reads: Arc<AtomicUsize>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given products.
    pub async fn with_products(products: impl IntoIterator<Item = ProductRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for product in products {
                state.products.insert(product.product_id.clone(), product);
            }
        }
        store
    }

    /// Makes every operation fail as if the backing store were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Makes idempotency record writes fail while everything else works.
    pub async fn set_fail_idempotency_writes(&self, fail: bool) {
        self.state.write().await.fail_idempotency_writes = fail;
    }

    /// Removes a product record, simulating a catalog delete.
    pub async fn remove_product(&self, product_id: &ProductId) -> Option<ProductRecord> {
        self.state.write().await.products.remove(product_id)
    }

    /// Returns how many product reads have been served.
    pub fn product_reads(&self) -> usize {
        self.product_reads.load(Ordering::SeqCst)
    }

    /// Returns the total number of reservation records held.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Returns the number of idempotency records held, expired or not.
    pub async fn idempotency_record_count(&self) -> usize {
        self.state.read().await.idempotency.len()
    }

    /// Overwrites a stored reservation. Lets tests age records without
    /// waiting for their TTL.
    pub async fn replace_reservation(&self, record: ReservationRecord) {
        let key = (record.order_id.clone(), record.product_id.clone());
        self.state.write().await.reservations.insert(key, record);
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("in-memory store marked unavailable".to_string())
}

/// Evaluates one write's condition against the current state.
fn check_condition(
    state: &InventoryState,
    index: usize,
    item: &TransactWriteItem,
) -> Result<Option<ConditionFailure>> {
    let failed = |condition| {
        Some(ConditionFailure {
            index,
            target: item.target(),
            condition,
        })
    };

    match item {
        TransactWriteItem::AdjustStock {
            product_id,
            delta,
            condition,
        } => {
            let Some(product) = state.products.get(product_id) else {
                return Ok(failed(FailedCondition::ProductMissing));
            };
            let next = i64::from(product.stock) + delta;
            if let StockCondition::AtLeast(min) = condition
                && product.stock < *min
            {
                return Ok(failed(FailedCondition::InsufficientStock {
                    requested: *min,
                    available: product.stock,
                }));
            }
            if next < 0 {
                return Ok(failed(FailedCondition::InsufficientStock {
                    requested: u32::try_from(-delta).unwrap_or(u32::MAX),
                    available: product.stock,
                }));
            }
            if next > i64::from(u32::MAX) {
                return Err(StoreError::InvalidTransaction(format!(
                    "stock for {product_id} would overflow"
                )));
            }
            Ok(None)
        }
        TransactWriteItem::PutReservation(record) => {
            let key = (record.order_id.clone(), record.product_id.clone());
            match state.reservations.get(&key) {
                Some(existing) if existing.status != ReservationStatus::Released => {
                    Ok(failed(FailedCondition::ReservationHeld))
                }
                _ => Ok(None),
            }
        }
        TransactWriteItem::ReleaseReservation {
            order_id,
            product_id,
            ..
        }
        | TransactWriteItem::CommitReservation {
            order_id,
            product_id,
            ..
        } => {
            let key = (order_id.clone(), product_id.clone());
            match state.reservations.get(&key) {
                Some(existing) if existing.is_active() => Ok(None),
                _ => Ok(failed(FailedCondition::ReservationNotActive)),
            }
        }
    }
}

fn apply_write(state: &mut InventoryState, item: TransactWriteItem, now: DateTime<Utc>) {
    match item {
        TransactWriteItem::AdjustStock {
            product_id, delta, ..
        } => {
            if let Some(product) = state.products.get_mut(&product_id) {
                // Conditions were checked under the same lock.
                product.stock = (i64::from(product.stock) + delta) as u32;
                product.updated_at = now;
            }
        }
        TransactWriteItem::PutReservation(record) => {
            let key = (record.order_id.clone(), record.product_id.clone());
            state.reservations.insert(key, record);
        }
        TransactWriteItem::ReleaseReservation {
            order_id,
            product_id,
            released_at,
        } => {
            if let Some(record) = state.reservations.get_mut(&(order_id, product_id)) {
                record.status = ReservationStatus::Released;
                record.released_at = Some(released_at);
            }
        }
        TransactWriteItem::CommitReservation {
            order_id,
            product_id,
            committed_at,
        } => {
            if let Some(record) = state.reservations.get_mut(&(order_id, product_id)) {
                record.status = ReservationStatus::Committed;
                record.committed_at = Some(committed_at);
            }
        }
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductRecord>> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(unavailable());
        }
        self.product_reads.fetch_add(1, Ordering::SeqCst);
        Ok(state.products.get(product_id).cloned())
    }

    async fn put_product(&self, product: ProductRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(unavailable());
        }
        state.products.insert(product.product_id.clone(), product);
        Ok(())
    }

    async fn conditional_update_stock(
        &self,
        product_id: &ProductId,
        delta: i64,
        expected_min_stock: Option<u32>,
    ) -> Result<ProductRecord> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(unavailable());
        }

        let condition = match expected_min_stock {
            Some(min) => StockCondition::AtLeast(min),
            None => StockCondition::Exists,
        };
        let item = TransactWriteItem::AdjustStock {
            product_id: product_id.clone(),
            delta,
            condition,
        };
        if check_condition(&state, 0, &item)?.is_some() {
            return Err(StoreError::ConditionFailed {
                product_id: product_id.clone(),
            });
        }

        apply_write(&mut state, item, Utc::now());
        state
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| StoreError::ConditionFailed {
                product_id: product_id.clone(),
            })
    }

    async fn transact_write(&self, items: Vec<TransactWriteItem>) -> Result<()> {
        validate_transaction(&items).map_err(StoreError::InvalidTransaction)?;

        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(unavailable());
        }

        let mut failures = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if let Some(failure) = check_condition(&state, index, item)? {
                failures.push(failure);
            }
        }

        if !failures.is_empty() {
            tracing::debug!(failed = failures.len(), "in-memory transaction cancelled");
            return Err(StoreError::TransactionCanceled { failures });
        }

        let now = Utc::now();
        for item in items {
            apply_write(&mut state, item, now);
        }
        Ok(())
    }

    async fn get_reservation(
        &self,
        order_id: &OrderId,
        product_id: &ProductId,
    ) -> Result<Option<ReservationRecord>> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(unavailable());
        }
        Ok(state
            .reservations
            .get(&(order_id.clone(), product_id.clone()))
            .cloned())
    }

    async fn query_reservations(&self, query: ReservationQuery) -> Result<Vec<ReservationRecord>> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(unavailable());
        }

        let mut records: Vec<_> = state
            .reservations
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });

        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn get_idempotency_record(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(unavailable());
        }
        let now = Utc::now();
        Ok(state
            .idempotency
            .get(key)
            .filter(|r| !r.is_expired_at(now))
            .cloned())
    }

    async fn put_idempotency_record(&self, record: IdempotencyRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.unavailable || state.fail_idempotency_writes {
            return Err(unavailable());
        }

        let now = Utc::now();
        if let Some(existing) = state.idempotency.get(&record.idempotency_key)
            && !existing.is_expired_at(now)
        {
            return Err(StoreError::DuplicateKey(record.idempotency_key));
        }
        state
            .idempotency
            .insert(record.idempotency_key.clone(), record);
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(unavailable());
        }

        let before = state.idempotency.len() + state.reservations.len();
        state.idempotency.retain(|_, r| !r.is_expired_at(cutoff));
        state
            .reservations
            .retain(|_, r| r.is_active() || !r.is_expired_at(cutoff));
        let after = state.idempotency.len() + state.reservations.len();
        Ok(before - after)
    }
}
