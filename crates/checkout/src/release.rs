//! Release coordinator: returns reserved stock and marks reservations released.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use inventory_store::{
    FailedCondition, IdempotencyKey, InventoryStore, InventoryStoreExt, MAX_TRANSACTION_ITEMS,
    OrderId, ProductId, ReservationRecord, TransactWriteItem,
};
use serde::{Deserialize, Serialize};

use crate::idempotency::IdempotencyCache;
use crate::request::{LineItem, LineItemInput, foreign_action, parse_lines};
use crate::settings::ReservationSettings;
use crate::transaction::{self, BestEffort};

const STEP: &str = "release";

const RELEASED: &str = "Inventory released successfully";
const NOTHING_TO_RELEASE: &str = "No active reservations to release";
const WITH_WARNINGS: &str = "Release completed with warnings";

/// Payload of a release call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    /// Products to release. Empty means every active reservation of the order.
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
    #[serde(default)]
    pub action: Option<String>,
}

impl ReleaseRequest {
    /// Creates a request releasing every active reservation of an order.
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }
}

/// Result of a release call. Always success-shaped; problems are reported in
/// `warning` (partial release) or `error` (nothing could be done).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    pub released_items: Vec<LineItem>,
    /// Requested products that held no active reservation.
    pub skipped_items: Vec<ProductId>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReleaseResult {
    fn empty(order_id: Option<OrderId>, message: impl Into<String>) -> Self {
        Self {
            order_id,
            idempotency_key: None,
            released_items: Vec::new(),
            skipped_items: Vec::new(),
            message: message.into(),
            warning: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn degraded(order_id: Option<OrderId>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(order_id, WITH_WARNINGS)
        }
    }

    /// Returns true if any problem was reported.
    pub fn has_warnings(&self) -> bool {
        self.warning.is_some() || self.error.is_some()
    }
}

/// Returns reserved stock. Never fails: whatever goes wrong is logged and
/// reported in the result.
#[derive(Clone)]
pub struct ReleaseCoordinator<S: InventoryStore> {
    store: S,
    cache: IdempotencyCache<S>,
    settings: ReservationSettings,
}

impl<S> ReleaseCoordinator<S>
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

    pub fn settings(&self) -> ReservationSettings {
        self.settings
    }

    #[tracing::instrument(
        skip(self, request),
        fields(order_id = tracing::field::Empty, idempotency_key = tracing::field::Empty)
    )]
    pub async fn release(&self, request: ReleaseRequest) -> ReleaseResult {
        if let Some(action) = foreign_action(request.action.as_deref(), STEP) {
            tracing::info!(action, "action not applicable, skipping release");
            metrics::counter!("inventory_releases_total", "outcome" => "skipped").increment(1);
            return ReleaseResult::empty(
                request.order_id,
                format!("Action {action} not applicable for release"),
            );
        }

        let Some(order_id) = request.order_id.filter(|id| !id.is_blank()) else {
            tracing::warn!("release called without an orderId");
            metrics::counter!("inventory_releases_total", "outcome" => "degraded").increment(1);
            return ReleaseResult::degraded(None, "Invalid input: orderId is required");
        };
        tracing::Span::current().record("order_id", order_id.as_str());

        let caller_key = request.idempotency_key.filter(|k| !k.is_blank());
        if let Some(key) = &caller_key {
            tracing::Span::current().record("idempotency_key", key.as_str());
            if let Some(cached) = self.cache.lookup::<ReleaseResult>(key, STEP).await {
                metrics::counter!("inventory_releases_total", "outcome" => "cached").increment(1);
                return cached;
            }
        }
        let idempotency_key = caller_key
            .clone()
            .unwrap_or_else(|| IdempotencyKey::derived(&order_id, STEP));

        let active = match self.store.active_reservations(&order_id).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "could not load reservations, nothing released");
                metrics::counter!("inventory_releases_total", "outcome" => "degraded")
                    .increment(1);
                let mut result = ReleaseResult::degraded(Some(order_id), e.to_string());
                result.idempotency_key = Some(idempotency_key);
                return result;
            }
        };

        let (targets, skipped_items) = select_targets(&order_id, active, &request.items);

        let mut result = if targets.is_empty() {
            tracing::info!("no active reservations to release");
            ReleaseResult::empty(Some(order_id), NOTHING_TO_RELEASE)
        } else {
            self.release_records(order_id, targets).await
        };
        result.idempotency_key = Some(idempotency_key);
        result.skipped_items = skipped_items;

        let outcome = if result.has_warnings() {
            "partial"
        } else if result.released_items.is_empty() {
            "empty"
        } else {
            "released"
        };
        metrics::counter!("inventory_releases_total", "outcome" => outcome).increment(1);

        if let Some(key) = &caller_key
            && !result.has_warnings()
        {
            self.cache
                .store(key, &result, self.settings.release_idempotency_ttl)
                .await;
        }

        result
    }

    /// Releases the given active reservations, atomically where possible.
    async fn release_records(&self, order_id: OrderId, targets: Vec<ReservationRecord>) -> ReleaseResult {
        let mut released = Vec::new();
        let mut problems = Vec::new();

        // Each reservation takes two writes.
        for chunk in targets.chunks(MAX_TRANSACTION_ITEMS / 2) {
            let now = Utc::now();
            let writes = chunk
                .iter()
                .flat_map(|r| release_writes(&order_id, r, now))
                .collect();

            match transaction::best_effort(&self.store, writes).await {
                BestEffort::Applied => released.extend(chunk.iter().map(line_item)),
                BestEffort::Aborted(e) => {
                    tracing::warn!(error = %e, "atomic release aborted, releasing item by item");
                    for record in chunk {
                        match self.release_one(&order_id, record).await {
                            Ok(()) => released.push(line_item(record)),
                            Err(problem) => problems.push(problem),
                        }
                    }
                }
            }
        }

        tracing::info!(released = released.len(), failed = problems.len(), "inventory released");

        let mut result = ReleaseResult::empty(
            Some(order_id),
            if problems.is_empty() { RELEASED } else { WITH_WARNINGS },
        );
        result.released_items = released;
        if !problems.is_empty() {
            result.warning = Some(problems.join("; "));
        }
        result
    }

    /// Releases a single reservation in its own transaction.
    ///
    /// If the product record is gone, the reservation is still marked
    /// released so it stops being retried; there is no stock to return.
    async fn release_one(&self, order_id: &OrderId, record: &ReservationRecord) -> Result<(), String> {
        let now = Utc::now();
        let err = match transaction::best_effort(&self.store, release_writes(order_id, record, now))
            .await
        {
            BestEffort::Applied => return Ok(()),
            BestEffort::Aborted(e) => e,
        };

        let product_missing = err.condition_failures().is_some_and(|failures| {
            failures
                .iter()
                .all(|f| f.condition == FailedCondition::ProductMissing)
        });
        if !product_missing {
            return Err(format!("{}: {err}", record.product_id));
        }

        let status_only = vec![TransactWriteItem::release_reservation(
            order_id.clone(),
            record.product_id.clone(),
            now,
        )];
        match transaction::best_effort(&self.store, status_only).await {
            BestEffort::Applied => Err(format!(
                "{}: product no longer exists, reservation released without restoring stock",
                record.product_id
            )),
            BestEffort::Aborted(e) => Err(format!("{}: {e}", record.product_id)),
        }
    }
}

fn release_writes(
    order_id: &OrderId,
    record: &ReservationRecord,
    now: DateTime<Utc>,
) -> Vec<TransactWriteItem> {
    vec![
        TransactWriteItem::increment_stock(record.product_id.clone(), record.quantity),
        TransactWriteItem::release_reservation(order_id.clone(), record.product_id.clone(), now),
    ]
}

fn line_item(record: &ReservationRecord) -> LineItem {
    LineItem {
        product_id: record.product_id.clone(),
        product_name: record.product_name.clone(),
        quantity: record.quantity,
    }
}

/// Picks the active reservations to release.
///
/// Without explicit items every active reservation is released. With them,
/// only requested products holding an active reservation are released, at
/// the reserved quantity; the rest are returned as skipped.
fn select_targets(
    order_id: &OrderId,
    active: Vec<ReservationRecord>,
    items: &[LineItemInput],
) -> (Vec<ReservationRecord>, Vec<ProductId>) {
    if items.is_empty() {
        return (active, Vec::new());
    }

    let requested: Vec<ProductId> = parse_lines(order_id, items)
        .into_iter()
        .map(|line| line.product_id)
        .collect();
    let wanted: HashSet<&ProductId> = requested.iter().collect();
    let held: HashSet<&ProductId> = active.iter().map(|r| &r.product_id).collect();

    let skipped = requested
        .iter()
        .filter(|p| !held.contains(p))
        .cloned()
        .collect::<Vec<_>>();
    if !skipped.is_empty() {
        tracing::warn!(%order_id, ?skipped, "requested products hold no active reservation");
    }

    let targets = active
        .into_iter()
        .filter(|r| wanted.contains(&r.product_id))
        .collect();
    (targets, skipped)
}
