//! Read-only stock validation.

use futures_util::future::try_join_all;
use inventory_store::{InventoryStore, ProductRecord};

use super::{FailureReason, RequestedItem, ValidatedItem, ValidationFailure, ValidationReport};
use crate::error::DomainError;
use crate::order::Money;

/// Checks requested items against current stock without mutating anything.
///
/// Passing validation is advisory: stock can move between validation and
/// reservation, and only the reservation's conditional write is binding.
#[derive(Clone)]
pub struct InventoryValidator<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore> InventoryValidator<S> {
    /// Creates a new validator over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validates every item, reading products concurrently.
    ///
    /// A store failure aborts the whole validation instead of being reported
    /// as a per-item failure.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn validate(&self, items: &[RequestedItem]) -> Result<ValidationReport, DomainError> {
        if let Some(item) = items.iter().find(|i| i.quantity == 0 || i.product_id.is_blank()) {
            return Err(DomainError::Validation(format!(
                "invalid line item for product '{}': quantity must be at least 1",
                item.product_id
            )));
        }

        let products = try_join_all(items.iter().map(|i| self.store.get_product(&i.product_id)))
            .await?;

        let mut validated = Vec::new();
        let mut failures = Vec::new();
        for (item, product) in items.iter().zip(products) {
            match check_item(item, product) {
                Ok(v) => validated.push(v),
                Err(reason) => {
                    tracing::debug!(product_id = %item.product_id, ?reason, "item failed validation");
                    failures.push(ValidationFailure {
                        product_id: item.product_id.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(ValidationReport::new(validated, failures))
    }
}

fn check_item(
    item: &RequestedItem,
    product: Option<ProductRecord>,
) -> Result<ValidatedItem, FailureReason> {
    let product = product.ok_or(FailureReason::NotFound)?;
    if !product.is_active() {
        return Err(FailureReason::NotAvailable);
    }
    if product.stock < item.quantity {
        return Err(FailureReason::InsufficientStock {
            requested: item.quantity,
            available: product.stock,
        });
    }

    Ok(ValidatedItem {
        product_id: item.product_id.clone(),
        product_name: product.name,
        quantity: item.quantity,
        price: Money::from_cents(product.price_cents),
        available: product.stock,
    })
}
