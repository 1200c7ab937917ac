//! Transaction wrappers for the reserve and release steps.
//!
//! Reserve needs every failure surfaced; release must never fail its caller.
//! Each gets its own wrapper so the two policies cannot be mixed up.

use inventory_store::{InventoryStore, StoreError, TransactWriteItem};

/// Runs a transaction whose failure the caller must handle.
pub(crate) async fn strict<S: InventoryStore>(
    store: &S,
    items: Vec<TransactWriteItem>,
) -> Result<(), StoreError> {
    let writes = items.len();
    store.transact_write(items).await.inspect_err(|e| {
        if e.is_conditional() {
            tracing::info!(writes, error = %e, "transaction cancelled by a failed condition");
        } else {
            tracing::error!(writes, error = %e, "transaction failed");
        }
    })
}

/// Outcome of a best-effort transaction.
#[derive(Debug)]
pub(crate) enum BestEffort {
    Applied,
    Aborted(StoreError),
}

/// Runs a transaction whose abort is logged and handed back as a value.
pub(crate) async fn best_effort<S: InventoryStore>(
    store: &S,
    items: Vec<TransactWriteItem>,
) -> BestEffort {
    let writes = items.len();
    match store.transact_write(items).await {
        Ok(()) => BestEffort::Applied,
        Err(e) => {
            tracing::warn!(writes, error = %e, "best-effort transaction aborted");
            BestEffort::Aborted(e)
        }
    }
}
