//! Checkout and inventory step error types.

use domain::{DomainError, ValidationFailure};
use inventory_store::{OrderId, ProductId, StoreError};
use thiserror::Error;

pub use domain::ErrorKind;

use crate::services::ServiceError;

/// Errors surfaced by the inventory check and reservation steps.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request was malformed.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// One or more items could not be satisfied from stock.
    #[error("Insufficient stock for {} item(s)", failures.len())]
    InsufficientStock { failures: Vec<ValidationFailure> },

    /// The reservations of these products are not in the state the step
    /// needs: already held on reserve, already settled on commit.
    #[error("Conflicting reservation state for order {order_id}")]
    Conflict {
        order_id: OrderId,
        product_ids: Vec<ProductId>,
    },

    /// The store aborted the transaction because a concurrent one raced it.
    #[error("Concurrent update, retry: {0}")]
    Contention(#[source] StoreError),

    /// The inventory store failed or could not be reached.
    #[error("Inventory store unavailable: {0}")]
    Unavailable(#[source] StoreError),
}

impl InventoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::Validation(_) => ErrorKind::ValidationError,
            InventoryError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            InventoryError::Conflict { .. } | InventoryError::Contention(_) => ErrorKind::Conflict,
            InventoryError::Unavailable(_) => ErrorKind::DependencyUnavailable,
        }
    }

    /// Structured detail for callers, if the error carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            InventoryError::InsufficientStock { failures } => serde_json::to_value(failures).ok(),
            InventoryError::Conflict { product_ids, .. } => serde_json::to_value(product_ids).ok(),
            _ => None,
        }
    }
}

impl From<DomainError> for InventoryError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Store(e) => InventoryError::Unavailable(e),
            DomainError::Validation(msg) => InventoryError::Validation(msg),
        }
    }
}

/// Errors surfaced by the checkout initiator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request was malformed.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Required shipping address fields are missing or blank.
    #[error("Shipping address is incomplete: missing {}", missing.join(", "))]
    IncompleteAddress { missing: Vec<&'static str> },

    #[error("Cart is empty")]
    EmptyCart,

    /// At least one cart item failed inventory validation.
    #[error("Some items are not available")]
    InventoryInvalid { failures: Vec<ValidationFailure> },

    /// The cart store failed.
    #[error("Cart store error: {0}")]
    Cart(#[source] ServiceError),

    /// Validation could not run.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The orchestrator did not accept the order.
    #[error("Orchestrator unavailable: {0}")]
    Orchestrator(#[source] ServiceError),
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::Validation(_) | CheckoutError::IncompleteAddress { .. } => {
                ErrorKind::ValidationError
            }
            CheckoutError::EmptyCart => ErrorKind::EmptyCart,
            CheckoutError::InventoryInvalid { .. } => ErrorKind::InventoryInvalid,
            CheckoutError::Cart(_) => ErrorKind::DependencyUnavailable,
            CheckoutError::Domain(e) => e.kind(),
            CheckoutError::Orchestrator(_) => ErrorKind::OrchestratorUnavailable,
        }
    }

    /// Structured detail for callers, if the error carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CheckoutError::IncompleteAddress { missing } => serde_json::to_value(missing).ok(),
            CheckoutError::InventoryInvalid { failures } => serde_json::to_value(failures).ok(),
            _ => None,
        }
    }
}
