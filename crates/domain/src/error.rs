//! Domain error types and the shared error taxonomy.

use inventory_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Taxonomy code carried by every error surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    InsufficientStock,
    NotAvailable,
    Conflict,
    DependencyUnavailable,
    EmptyCart,
    InventoryInvalid,
    OrchestratorUnavailable,
}

impl ErrorKind {
    /// Returns the taxonomy code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::NotAvailable => "not_available",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DependencyUnavailable => "dependency_unavailable",
            ErrorKind::EmptyCart => "empty_cart",
            ErrorKind::InventoryInvalid => "inventory_invalid",
            ErrorKind::OrchestratorUnavailable => "orchestrator_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The inventory store failed or could not be reached.
    #[error("Inventory store error: {0}")]
    Store(#[from] StoreError),

    /// The input was malformed.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Store(_) => ErrorKind::DependencyUnavailable,
            DomainError::Validation(_) => ErrorKind::ValidationError,
        }
    }
}
