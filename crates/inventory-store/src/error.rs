use thiserror::Error;

use crate::transaction::ConditionFailure;
use crate::{IdempotencyKey, ProductId};

/// Errors that can occur when interacting with the inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A multi-item transaction was cancelled because at least one write's
    /// condition did not hold. Nothing was written.
    #[error("Transaction cancelled: {} condition(s) failed", failures.len())]
    TransactionCanceled { failures: Vec<ConditionFailure> },

    /// A single conditional stock update did not apply.
    #[error("Conditional stock update failed for product {product_id}")]
    ConditionFailed { product_id: ProductId },

    /// An idempotency record already exists and has not expired.
    #[error("Idempotency record already exists: {0}")]
    DuplicateKey(IdempotencyKey),

    /// The transaction request itself was malformed.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A stored row could not be mapped back into a record.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The database aborted the transaction because it raced another one
    /// (deadlock or serialization failure). Nothing was written; retrying
    /// may succeed.
    #[error("Transaction aborted by a concurrent writer: {0}")]
    Contention(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns the per-item condition failures if this is a cancelled transaction.
    pub fn condition_failures(&self) -> Option<&[ConditionFailure]> {
        match self {
            StoreError::TransactionCanceled { failures } => Some(failures),
            _ => None,
        }
    }

    /// Returns true if the error comes from a failed write condition rather than
    /// from the store being unreachable or broken.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            StoreError::TransactionCanceled { .. }
                | StoreError::ConditionFailed { .. }
                | StoreError::DuplicateKey(_)
                | StoreError::Contention(_)
        )
    }

    /// Reclassifies a database error raised by a deadlock (`40P01`) or a
    /// serialization failure (`40001`) as [`StoreError::Contention`].
    pub fn classify(self) -> StoreError {
        match self {
            StoreError::Database(e) => {
                let contended = matches!(
                    e.as_database_error().and_then(|db| db.code()).as_deref(),
                    Some("40P01" | "40001")
                );
                if contended {
                    StoreError::Contention(e.to_string())
                } else {
                    StoreError::Database(e)
                }
            }
            other => other,
        }
    }
}

/// Result type for inventory store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
