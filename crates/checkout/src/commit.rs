//! Commit coordinator: settles an order's reservations once it went through.
//!
//! A committed reservation keeps its units out of stock for good. Release
//! and the expiry sweeper only act on active reservations, so they never
//! return sold units.

use chrono::{DateTime, Utc};
use inventory_store::{
    FailedCondition, InventoryStore, InventoryStoreExt, MAX_TRANSACTION_ITEMS, OrderId,
    ReservationRecord, StoreError, TransactWriteItem,
};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::request::{LineItem, NotApplicable, foreign_action};
use crate::transaction;

const STEP: &str = "commit";

const COMMITTED: &str = "Inventory committed successfully";
const NOTHING_TO_COMMIT: &str = "No active reservations to commit";

/// Payload of a commit call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub action: Option<String>,
}

impl CommitRequest {
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub order_id: OrderId,
    pub committed_items: Vec<LineItem>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// What a commit call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommitOutcome {
    Committed(CommitResult),
    NotApplicable(NotApplicable),
}

impl CommitOutcome {
    pub fn committed(&self) -> Option<&CommitResult> {
        match self {
            CommitOutcome::Committed(result) => Some(result),
            CommitOutcome::NotApplicable(_) => None,
        }
    }
}

/// Marks every active reservation of an order committed.
///
/// Repeating a commit is harmless: once nothing is active it reports an
/// empty commit.
#[derive(Clone)]
pub struct CommitCoordinator<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore> CommitCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, request), fields(order_id = tracing::field::Empty))]
    pub async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, InventoryError> {
        if let Some(action) = foreign_action(request.action.as_deref(), STEP) {
            tracing::info!(action, "action not applicable, skipping commit");
            return Ok(CommitOutcome::NotApplicable(NotApplicable::new(
                request.order_id,
                action,
                STEP,
            )));
        }

        let Some(order_id) = request.order_id.filter(|id| !id.is_blank()) else {
            return Err(InventoryError::Validation("orderId is required".to_string()));
        };
        tracing::Span::current().record("order_id", order_id.as_str());

        let active = self
            .store
            .active_reservations(&order_id)
            .await
            .map_err(InventoryError::Unavailable)?;

        let now = Utc::now();
        if active.is_empty() {
            tracing::info!("no active reservations to commit");
            metrics::counter!("inventory_commits_total", "outcome" => "empty").increment(1);
            return Ok(CommitOutcome::Committed(CommitResult {
                order_id,
                committed_items: Vec::new(),
                message: NOTHING_TO_COMMIT.to_string(),
                timestamp: now,
            }));
        }

        // A retry after a failed chunk picks up whatever is still active.
        for chunk in active.chunks(MAX_TRANSACTION_ITEMS) {
            let writes = chunk
                .iter()
                .map(|r| {
                    TransactWriteItem::commit_reservation(order_id.clone(), r.product_id.clone(), now)
                })
                .collect();
            if let Err(e) = transaction::strict(&self.store, writes).await {
                let err = map_store_error(&order_id, e);
                metrics::counter!("inventory_commits_total", "outcome" => err.kind().as_str())
                    .increment(1);
                return Err(err);
            }
        }

        metrics::counter!("inventory_commits_total", "outcome" => "committed").increment(1);
        tracing::info!(items = active.len(), "inventory committed");

        Ok(CommitOutcome::Committed(CommitResult {
            order_id,
            committed_items: active.iter().map(line_item).collect(),
            message: COMMITTED.to_string(),
            timestamp: now,
        }))
    }
}

fn line_item(record: &ReservationRecord) -> LineItem {
    LineItem {
        product_id: record.product_id.clone(),
        product_name: record.product_name.clone(),
        quantity: record.quantity,
    }
}

/// A cancelled commit means a release or the sweeper settled a reservation
/// between the read and the write.
fn map_store_error(order_id: &OrderId, err: StoreError) -> InventoryError {
    match err {
        StoreError::TransactionCanceled { failures } => {
            let settled: Vec<_> = failures
                .iter()
                .filter(|f| f.condition == FailedCondition::ReservationNotActive)
                .map(|f| f.target.product_id().clone())
                .collect();
            tracing::warn!(%order_id, products = ?settled, "reservations settled concurrently");
            InventoryError::Conflict {
                order_id: order_id.clone(),
                product_ids: settled,
            }
        }
        StoreError::InvalidTransaction(msg) => InventoryError::Validation(msg),
        contended @ StoreError::Contention(_) => InventoryError::Contention(contended),
        other => InventoryError::Unavailable(other),
    }
}

#[cfg(test)]
mod tests {
    use inventory_store::{
        InMemoryInventoryStore, ProductId, ProductRecord, ReservationStatus,
    };

    use super::*;
    use crate::error::ErrorKind;
    use crate::release::{ReleaseCoordinator, ReleaseRequest};
    use crate::request::LineItemInput;
    use crate::reserve::{ReservationCoordinator, ReserveRequest};
    use crate::settings::ReservationSettings;

    struct Fixture {
        store: InMemoryInventoryStore,
        reserve: ReservationCoordinator<InMemoryInventoryStore>,
        commit: CommitCoordinator<InMemoryInventoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryInventoryStore::with_products([
            ProductRecord::new("p1", "Tee", 1500, 5),
            ProductRecord::new("p2", "Mug", 900, 4),
        ])
        .await;
        Fixture {
            reserve: ReservationCoordinator::new(store.clone(), ReservationSettings::default()),
            commit: CommitCoordinator::new(store.clone()),
            store,
        }
    }

    impl Fixture {
        async fn reserve(&self, order: &str) {
            self.reserve
                .reserve(ReserveRequest {
                    order_id: Some(OrderId::new(order)),
                    items: vec![
                        LineItemInput::new("p1", 2).with_name("Tee"),
                        LineItemInput::new("p2", 1).with_name("Mug"),
                    ],
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        async fn stock(&self, product: &str) -> u32 {
            self.store
                .stock_of(&ProductId::new(product))
                .await
                .unwrap()
                .unwrap()
        }
    }

    #[tokio::test]
    async fn commits_every_active_reservation() {
        let f = fixture().await;
        f.reserve("o-1").await;

        let outcome = f
            .commit
            .commit(CommitRequest::for_order(OrderId::new("o-1")))
            .await
            .unwrap();

        let result = outcome.committed().unwrap();
        assert_eq!(result.message, COMMITTED);
        assert_eq!(result.committed_items.len(), 2);
        assert_eq!(f.stock("p1").await, 3);
        assert_eq!(f.stock("p2").await, 3);

        let record = f
            .store
            .get_reservation(&OrderId::new("o-1"), &ProductId::new("p1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ReservationStatus::Committed);
    }

    #[tokio::test]
    async fn second_commit_is_empty() {
        let f = fixture().await;
        f.reserve("o-1").await;
        let request = CommitRequest::for_order(OrderId::new("o-1"));

        f.commit.commit(request.clone()).await.unwrap();
        let again = f.commit.commit(request).await.unwrap();

        let result = again.committed().unwrap();
        assert!(result.committed_items.is_empty());
        assert_eq!(result.message, NOTHING_TO_COMMIT);
    }

    #[tokio::test]
    async fn release_after_commit_returns_nothing() {
        let f = fixture().await;
        f.reserve("o-1").await;
        f.commit
            .commit(CommitRequest::for_order(OrderId::new("o-1")))
            .await
            .unwrap();

        let release = ReleaseCoordinator::new(f.store.clone(), ReservationSettings::default());
        let result = release
            .release(ReleaseRequest::for_order(OrderId::new("o-1")))
            .await;

        assert!(result.released_items.is_empty());
        assert_eq!(f.stock("p1").await, 3);
        assert_eq!(f.stock("p2").await, 3);
    }

    #[tokio::test]
    async fn requires_an_order() {
        let f = fixture().await;
        let err = f.commit.commit(CommitRequest::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn foreign_action_is_a_no_op() {
        let f = fixture().await;
        f.reserve("o-1").await;

        let outcome = f
            .commit
            .commit(CommitRequest {
                action: Some("release".into()),
                ..CommitRequest::for_order(OrderId::new("o-1"))
            })
            .await
            .unwrap();

        assert!(outcome.committed().is_none());
        assert_eq!(
            f.store
                .active_reservations(&OrderId::new("o-1"))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn unavailable_store_is_surfaced() {
        let f = fixture().await;
        f.store.set_unavailable(true).await;
        let err = f
            .commit
            .commit(CommitRequest::for_order(OrderId::new("o-1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    }

    #[test]
    fn cancelled_commit_is_a_conflict() {
        let err = map_store_error(
            &OrderId::new("o-1"),
            StoreError::TransactionCanceled {
                failures: vec![inventory_store::ConditionFailure {
                    index: 0,
                    target: inventory_store::WriteTarget::Reservation {
                        order_id: OrderId::new("o-1"),
                        product_id: ProductId::new("p1"),
                    },
                    condition: FailedCondition::ReservationNotActive,
                }],
            },
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.details().unwrap(), serde_json::json!(["p1"]));
    }
}
