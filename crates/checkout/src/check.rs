//! Orchestrator-facing inventory check step.

use chrono::{DateTime, Utc};
use domain::{InventoryValidator, RequestedItem, ValidatedItem};
use inventory_store::{IdempotencyKey, InventoryStore, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::request::{LineItemInput, parse_lines};

/// Payload of an inventory check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub order_id: OrderId,
    pub idempotency_key: IdempotencyKey,
    pub available_items: Vec<ValidatedItem>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Re-validates an order's items right before reservation.
///
/// Fails with `insufficient_stock` if any item fails, carrying every failure.
#[derive(Clone)]
pub struct InventoryCheck<S: InventoryStore> {
    validator: InventoryValidator<S>,
}

impl<S: InventoryStore> InventoryCheck<S> {
    pub fn new(store: S) -> Self {
        Self {
            validator: InventoryValidator::new(store),
        }
    }

    #[tracing::instrument(skip(self, request), fields(order_id = tracing::field::Empty))]
    pub async fn check(&self, request: CheckRequest) -> Result<CheckResult, InventoryError> {
        let order_id = match request.order_id {
            Some(id) if !id.is_blank() && !request.items.is_empty() => id,
            _ => {
                return Err(InventoryError::Validation(
                    "orderId and items are required".to_string(),
                ));
            }
        };
        tracing::Span::current().record("order_id", order_id.as_str());

        let items: Vec<RequestedItem> = parse_lines(&order_id, &request.items)
            .into_iter()
            .map(|line| RequestedItem::new(line.product_id, line.quantity))
            .collect();
        if items.is_empty() {
            return Err(InventoryError::Validation(
                "no valid items to check".to_string(),
            ));
        }

        let report = self.validator.validate(&items).await?;
        if !report.valid {
            tracing::info!(failed = report.failures.len(), "inventory check failed");
            return Err(InventoryError::InsufficientStock {
                failures: report.failures,
            });
        }

        let idempotency_key = request
            .idempotency_key
            .filter(|k| !k.is_blank())
            .unwrap_or_else(|| IdempotencyKey::derived(&order_id, "check"));

        Ok(CheckResult {
            order_id,
            idempotency_key,
            available_items: report.validated_items,
            message: "All items have sufficient stock".to_string(),
            timestamp: Utc::now(),
        })
    }
}
