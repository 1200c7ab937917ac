use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::order::{Money, OrderItem};

/// A product and quantity to check against stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl RequestedItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// An item that passed validation, with the catalog data snapshotted at
/// validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
    /// Stock on hand when the item was validated.
    pub available: u32,
}

impl ValidatedItem {
    /// Converts the item into an order line at its snapshotted price.
    pub fn to_order_item(&self) -> OrderItem {
        OrderItem::new(
            self.product_id.clone(),
            self.product_name.clone(),
            self.quantity,
            self.price,
        )
    }
}

/// Why an item failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    NotFound,
    NotAvailable,
    InsufficientStock { requested: u32, available: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub reason: FailureReason,
}

/// Outcome of validating a list of items. `validated_items` and `failures`
/// each keep the order of the input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub validated_items: Vec<ValidatedItem>,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub(crate) fn new(validated_items: Vec<ValidatedItem>, failures: Vec<ValidationFailure>) -> Self {
        Self {
            valid: failures.is_empty(),
            validated_items,
            failures,
        }
    }

    /// Returns the order lines for the validated items.
    pub fn order_items(&self) -> Vec<OrderItem> {
        self.validated_items
            .iter()
            .map(ValidatedItem::to_order_item)
            .collect()
    }
}
