//! Cache of results keyed by caller-supplied idempotency keys.

use chrono::Duration;
use inventory_store::{IdempotencyKey, IdempotencyRecord, InventoryStore, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maps an idempotency key to the result its first successful call produced.
///
/// Neither operation fails: a lookup that errors counts as a miss, and a
/// store that errors is logged. The conditional writes behind every cached
/// operation keep a missed hit from double-applying.
#[derive(Clone)]
pub struct IdempotencyCache<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore> IdempotencyCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the cached result for `key`, if an unexpired one exists.
    pub async fn lookup<T: DeserializeOwned>(
        &self,
        key: &IdempotencyKey,
        operation: &'static str,
    ) -> Option<T> {
        let record = match self.store.get_idempotency_record(key).await {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!(idempotency_key = %key, error = %e, "idempotency lookup failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_value(record.result) {
            Ok(result) => {
                tracing::info!(idempotency_key = %key, operation, "returning cached result");
                metrics::counter!("idempotency_cache_hits_total", "operation" => operation)
                    .increment(1);
                Some(result)
            }
            Err(e) => {
                tracing::warn!(idempotency_key = %key, error = %e, "cached result unreadable, treating as miss");
                None
            }
        }
    }

    /// Caches `result` under `key` for `ttl`. Failures are logged only.
    pub async fn store<T: Serialize>(&self, key: &IdempotencyKey, result: &T, ttl: Duration) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(idempotency_key = %key, error = %e, "could not serialize result for caching");
                return;
            }
        };

        match self
            .store
            .put_idempotency_record(IdempotencyRecord::new(key.clone(), value, ttl))
            .await
        {
            Ok(()) => {}
            Err(StoreError::DuplicateKey(_)) => {
                tracing::debug!(idempotency_key = %key, "result already cached by a concurrent call");
            }
            Err(e) => {
                tracing::warn!(idempotency_key = %key, error = %e, "failed to store idempotency record");
            }
        }
    }
}
