//! Reservation coordinator: atomic stock decrement plus reservation log writes.

use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::{FailureReason, ValidationFailure};
use inventory_store::{
    ConditionFailure, FailedCondition, IdempotencyKey, InventoryStore, MAX_TRANSACTION_ITEMS,
    OrderId, ReservationGroupId, ReservationRecord, StoreError, TransactWriteItem, UserId,
};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::idempotency::IdempotencyCache;
use crate::request::{LineItem, LineItemInput, NotApplicable, foreign_action, parse_lines};
use crate::settings::ReservationSettings;
use crate::transaction;

const STEP: &str = "reserve";

/// Most distinct products one reserve call may hold; each takes two writes.
pub const MAX_RESERVE_ITEMS: usize = MAX_TRANSACTION_ITEMS / 2;

const DEFAULT_USER: &str = "unknown";
const DEFAULT_PRODUCT_NAME: &str = "Unknown";

/// Payload of a reserve call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
    #[serde(default)]
    pub action: Option<String>,
}

/// Result of a successful reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResult {
    pub order_id: OrderId,
    pub reservation_group_id: ReservationGroupId,
    pub idempotency_key: IdempotencyKey,
    pub reserved_items: Vec<LineItem>,
    pub expires_at: DateTime<Utc>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// What a reserve call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReserveOutcome {
    Reserved(ReserveResult),
    NotApplicable(NotApplicable),
}

impl ReserveOutcome {
    /// Returns the reservation, if one was made or replayed.
    pub fn reserved(&self) -> Option<&ReserveResult> {
        match self {
            ReserveOutcome::Reserved(result) => Some(result),
            ReserveOutcome::NotApplicable(_) => None,
        }
    }
}

/// Atomically decrements stock and writes one active reservation record per
/// product, all or nothing.
#[derive(Clone)]
pub struct ReservationCoordinator<S: InventoryStore> {
    store: S,
    cache: IdempotencyCache<S>,
    settings: ReservationSettings,
}

impl<S> ReservationCoordinator<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, settings: ReservationSettings) -> Self {
        Self {
            cache: IdempotencyCache::new(store.clone()),
            store,
            settings,
        }
    }

    /// Reserves every valid item of the request.
    ///
    /// A caller-supplied idempotency key replays the first successful result
    /// without touching stock.
    #[tracing::instrument(
        skip(self, request),
        fields(order_id = tracing::field::Empty, idempotency_key = tracing::field::Empty)
    )]
    pub async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome, InventoryError> {
        if let Some(action) = foreign_action(request.action.as_deref(), STEP) {
            tracing::info!(action, "action not applicable, skipping reserve");
            return Ok(ReserveOutcome::NotApplicable(NotApplicable::new(
                request.order_id,
                action,
                STEP,
            )));
        }

        let order_id = match request.order_id {
            Some(id) if !id.is_blank() && !request.items.is_empty() => id,
            _ => {
                return Err(InventoryError::Validation(
                    "orderId and items are required".to_string(),
                ));
            }
        };
        tracing::Span::current().record("order_id", order_id.as_str());

        let caller_key = request.idempotency_key.filter(|k| !k.is_blank());
        if let Some(key) = &caller_key {
            tracing::Span::current().record("idempotency_key", key.as_str());
            if let Some(cached) = self.cache.lookup::<ReserveResult>(key, STEP).await {
                metrics::counter!("inventory_reservations_total", "outcome" => "cached")
                    .increment(1);
                return Ok(ReserveOutcome::Reserved(cached));
            }
        }
        let idempotency_key = caller_key
            .clone()
            .unwrap_or_else(|| IdempotencyKey::derived(&order_id, STEP));

        let lines = parse_lines(&order_id, &request.items);
        if lines.is_empty() {
            return Err(InventoryError::Validation(
                "no valid items to reserve".to_string(),
            ));
        }
        if lines.len() > MAX_RESERVE_ITEMS {
            return Err(InventoryError::Validation(format!(
                "at most {MAX_RESERVE_ITEMS} distinct products can be reserved at once, got {}",
                lines.len()
            )));
        }

        let started = Instant::now();
        let user_id = request
            .user_id
            .filter(|u| !u.is_blank())
            .unwrap_or_else(|| UserId::new(DEFAULT_USER));
        let group_id = ReservationGroupId::generate(&order_id);
        let now = Utc::now();

        let mut writes = Vec::with_capacity(lines.len() * 2);
        let mut reserved_items = Vec::with_capacity(lines.len());
        for line in lines {
            let product_name = line
                .product_name
                .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string());
            let record = ReservationRecord::builder()
                .order_id(order_id.clone())
                .product_id(line.product_id.clone())
                .reservation_group_id(group_id.clone())
                .user_id(user_id.clone())
                .product_name(product_name.clone())
                .price_cents(line.price.map(|p| p.cents()).unwrap_or(0))
                .quantity(line.quantity)
                .idempotency_key(idempotency_key.clone())
                .created_at(now)
                .ttl(self.settings.reservation_ttl)
                .build();

            writes.push(TransactWriteItem::decrement_stock(
                line.product_id.clone(),
                line.quantity,
            ));
            writes.push(TransactWriteItem::put_reservation(record));
            reserved_items.push(LineItem {
                product_id: line.product_id,
                product_name,
                quantity: line.quantity,
            });
        }

        if let Err(e) = transaction::strict(&self.store, writes).await {
            let err = map_store_error(&order_id, e);
            metrics::counter!("inventory_reservations_total", "outcome" => err.kind().as_str())
                .increment(1);
            return Err(err);
        }

        let result = ReserveResult {
            order_id,
            reservation_group_id: group_id,
            idempotency_key,
            reserved_items,
            expires_at: now + self.settings.reservation_ttl,
            message: "Inventory reserved successfully".to_string(),
            timestamp: now,
        };

        if let Some(key) = &caller_key {
            self.cache
                .store(key, &result, self.settings.reserve_idempotency_ttl)
                .await;
        }

        metrics::counter!("inventory_reservations_total", "outcome" => "reserved").increment(1);
        metrics::histogram!("inventory_reserve_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            reservation_group_id = %result.reservation_group_id,
            items = result.reserved_items.len(),
            "inventory reserved"
        );

        Ok(ReserveOutcome::Reserved(result))
    }
}

/// Maps a failed reserve transaction onto the error taxonomy.
fn map_store_error(order_id: &OrderId, err: StoreError) -> InventoryError {
    let failures = match err {
        StoreError::TransactionCanceled { failures } => failures,
        StoreError::InvalidTransaction(msg) => return InventoryError::Validation(msg),
        contended @ StoreError::Contention(_) => return InventoryError::Contention(contended),
        other => return InventoryError::Unavailable(other),
    };

    let active: Vec<_> = failures
        .iter()
        .filter(|f| f.condition == FailedCondition::ReservationHeld)
        .map(|f| f.target.product_id().clone())
        .collect();
    if !active.is_empty() {
        tracing::warn!(%order_id, products = ?active, "order already holds reservations");
        return InventoryError::Conflict {
            order_id: order_id.clone(),
            product_ids: active,
        };
    }

    InventoryError::InsufficientStock {
        failures: failures.iter().filter_map(stock_failure).collect(),
    }
}

fn stock_failure(failure: &ConditionFailure) -> Option<ValidationFailure> {
    let reason = match failure.condition {
        FailedCondition::ProductMissing => FailureReason::NotFound,
        FailedCondition::InsufficientStock {
            requested,
            available,
        } => FailureReason::InsufficientStock {
            requested,
            available,
        },
        FailedCondition::ReservationHeld | FailedCondition::ReservationNotActive => return None,
    };
    Some(ValidationFailure {
        product_id: failure.target.product_id().clone(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use domain::Money;
    use inventory_store::{
        InMemoryInventoryStore, InventoryStoreExt, ProductId, ProductRecord, ReservationStatus,
    };

    use super::*;
    use crate::error::ErrorKind;

    async fn coordinator() -> (ReservationCoordinator<InMemoryInventoryStore>, InMemoryInventoryStore)
    {
        let store = InMemoryInventoryStore::with_products([
            ProductRecord::new("p1", "Tee", 1500, 5),
            ProductRecord::new("p2", "Mug", 900, 1),
        ])
        .await;
        (
            ReservationCoordinator::new(store.clone(), ReservationSettings::default()),
            store,
        )
    }

    fn request(order: &str, items: Vec<LineItemInput>) -> ReserveRequest {
        ReserveRequest {
            order_id: Some(OrderId::new(order)),
            user_id: Some(UserId::new("user-1")),
            items,
            ..Default::default()
        }
    }

    async fn stock(store: &InMemoryInventoryStore, product: &str) -> u32 {
        store.stock_of(&ProductId::new(product)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn reserves_all_items() {
        let (coordinator, store) = coordinator().await;

        let outcome = coordinator
            .reserve(request(
                "o-1",
                vec![
                    LineItemInput::new("p1", 2)
                        .with_name("Tee")
                        .with_price(Money::from_cents(1500)),
                    LineItemInput::new("p2", 1),
                ],
            ))
            .await
            .unwrap();

        let result = outcome.reserved().unwrap();
        assert_eq!(result.reserved_items.len(), 2);
        assert_eq!(result.message, "Inventory reserved successfully");
        assert!(
            result
                .reservation_group_id
                .as_str()
                .starts_with("RESERVATION#o-1#")
        );
        assert!(result.idempotency_key.as_str().starts_with("o-1-reserve-"));

        assert_eq!(stock(&store, "p1").await, 3);
        assert_eq!(stock(&store, "p2").await, 0);

        let records = store.active_reservations(&OrderId::new("o-1")).await.unwrap();
        assert_eq!(records.len(), 2);
        let tee = records.iter().find(|r| r.product_id.as_str() == "p1").unwrap();
        assert_eq!(tee.price_cents, 1500);
        assert_eq!(tee.status, ReservationStatus::Active);
        assert_eq!(tee.expires_at, result.expires_at);
        let mug = records.iter().find(|r| r.product_id.as_str() == "p2").unwrap();
        assert_eq!(mug.product_name, "Unknown");
        assert_eq!(mug.price_cents, 0);
    }

    #[tokio::test]
    async fn one_short_item_reserves_nothing() {
        let (coordinator, store) = coordinator().await;

        let err = coordinator
            .reserve(request(
                "o-1",
                vec![LineItemInput::new("p1", 2), LineItemInput::new("p2", 3)],
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        let InventoryError::InsufficientStock { failures } = err else {
            unreachable!()
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].product_id.as_str(), "p2");
        assert_eq!(
            failures[0].reason,
            FailureReason::InsufficientStock {
                requested: 3,
                available: 1
            }
        );

        assert_eq!(stock(&store, "p1").await, 5);
        assert_eq!(stock(&store, "p2").await, 1);
        assert_eq!(store.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_reported() {
        let (coordinator, _) = coordinator().await;
        let err = coordinator
            .reserve(request("o-1", vec![LineItemInput::new("ghost", 1)]))
            .await
            .unwrap_err();
        let InventoryError::InsufficientStock { failures } = err else {
            panic!("expected insufficient stock");
        };
        assert_eq!(failures[0].reason, FailureReason::NotFound);
    }

    #[tokio::test]
    async fn same_key_replays_result_without_touching_stock() {
        let (coordinator, store) = coordinator().await;
        let mut req = request("o-1", vec![LineItemInput::new("p1", 2)]);
        req.idempotency_key = Some(IdempotencyKey::new("key-1"));

        let first = coordinator.reserve(req.clone()).await.unwrap();
        let second = coordinator.reserve(req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(stock(&store, "p1").await, 3);
        assert_eq!(
            first.reserved().unwrap().idempotency_key,
            IdempotencyKey::new("key-1")
        );
    }

    #[tokio::test]
    async fn repeat_without_key_is_a_conflict() {
        let (coordinator, store) = coordinator().await;

        coordinator
            .reserve(request("o-1", vec![LineItemInput::new("p1", 2)]))
            .await
            .unwrap();
        let err = coordinator
            .reserve(request("o-1", vec![LineItemInput::new("p1", 2)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(stock(&store, "p1").await, 3);
    }

    #[tokio::test]
    async fn invalid_lines_are_skipped() {
        let (coordinator, store) = coordinator().await;

        let outcome = coordinator
            .reserve(request(
                "o-1",
                vec![
                    LineItemInput::new("p1", 1),
                    LineItemInput::new("p2", 0),
                    LineItemInput {
                        quantity: Some(1),
                        ..Default::default()
                    },
                ],
            ))
            .await
            .unwrap();

        assert_eq!(outcome.reserved().unwrap().reserved_items.len(), 1);
        assert_eq!(stock(&store, "p2").await, 1);
    }

    #[tokio::test]
    async fn duplicate_products_are_reserved_once() {
        let (coordinator, store) = coordinator().await;

        let outcome = coordinator
            .reserve(request(
                "o-1",
                vec![LineItemInput::new("p1", 2), LineItemInput::new("p1", 1)],
            ))
            .await
            .unwrap();

        assert_eq!(outcome.reserved().unwrap().reserved_items[0].quantity, 3);
        assert_eq!(stock(&store, "p1").await, 2);
    }

    #[tokio::test]
    async fn validation_errors() {
        let (coordinator, _) = coordinator().await;

        let missing_order = ReserveRequest {
            items: vec![LineItemInput::new("p1", 1)],
            ..Default::default()
        };
        assert_eq!(
            coordinator.reserve(missing_order).await.unwrap_err().kind(),
            ErrorKind::ValidationError
        );

        let no_items = request("o-1", vec![]);
        assert_eq!(
            coordinator.reserve(no_items).await.unwrap_err().kind(),
            ErrorKind::ValidationError
        );

        let all_invalid = request("o-1", vec![LineItemInput::new("p1", -2)]);
        assert_eq!(
            coordinator.reserve(all_invalid).await.unwrap_err().kind(),
            ErrorKind::ValidationError
        );
    }

    #[tokio::test]
    async fn foreign_action_is_a_no_op() {
        let (coordinator, store) = coordinator().await;
        let mut req = request("o-1", vec![LineItemInput::new("p1", 1)]);
        req.action = Some("release".into());

        let outcome = coordinator.reserve(req).await.unwrap();
        let ReserveOutcome::NotApplicable(skipped) = outcome else {
            panic!("expected a no-op");
        };
        assert_eq!(skipped.message, "Action release not applicable for reserve");
        assert_eq!(stock(&store, "p1").await, 5);
    }

    #[tokio::test]
    async fn idempotency_write_failure_does_not_fail_reserve() {
        let (coordinator, store) = coordinator().await;
        store.set_fail_idempotency_writes(true).await;
        let mut req = request("o-1", vec![LineItemInput::new("p1", 1)]);
        req.idempotency_key = Some(IdempotencyKey::new("key-1"));

        assert!(coordinator.reserve(req).await.is_ok());
        assert_eq!(stock(&store, "p1").await, 4);
    }

    #[tokio::test]
    async fn unreachable_store_is_dependency_unavailable() {
        let (coordinator, store) = coordinator().await;
        store.set_unavailable(true).await;

        let err = coordinator
            .reserve(request("o-1", vec![LineItemInput::new("p1", 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let store = InMemoryInventoryStore::with_products([ProductRecord::new("p1", "Tee", 1500, 10)])
            .await;
        let coordinator = ReservationCoordinator::new(store.clone(), ReservationSettings::default());

        let mut handles = Vec::new();
        for i in 0..30 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .reserve(request(&format!("o-{i}"), vec![LineItemInput::new("p1", 1)]))
                    .await
                    .is_ok()
            }));
        }

        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap() {
                reserved += 1;
            }
        }

        assert_eq!(reserved, 10);
        assert_eq!(stock(&store, "p1").await, 0);
    }
}
