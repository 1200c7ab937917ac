//! Cart store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use inventory_store::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::ServiceError;

/// A line of a shopper's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, product_name: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
        }
    }
}

/// Read access to shoppers' carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the items in a user's cart, empty if the user has none.
    async fn get_cart_items(&self, user_id: &UserId) -> Result<Vec<CartItem>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, Vec<CartItem>>,
    reads: usize,
    fail_on_read: bool,
}

/// In-memory cart store for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a user's cart.
    pub fn set_cart(&self, user_id: UserId, items: Vec<CartItem>) {
        if let Ok(mut state) = self.state.write() {
            state.carts.insert(user_id, items);
        }
    }

    /// Configures the store to fail every read.
    pub fn set_fail_on_read(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_on_read = fail;
        }
    }

    /// Returns the number of cart reads served.
    pub fn reads(&self) -> usize {
        self.state.read().map(|s| s.reads).unwrap_or(0)
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_cart_items(&self, user_id: &UserId) -> Result<Vec<CartItem>, ServiceError> {
        let mut state = self.state.write().map_err(|_| ServiceError::Unavailable {
            service: "cart store",
            reason: "state lock poisoned".to_string(),
        })?;

        if state.fail_on_read {
            return Err(ServiceError::Unavailable {
                service: "cart store",
                reason: "configured to fail".to_string(),
            });
        }

        state.reads += 1;
        Ok(state.carts.get(user_id).cloned().unwrap_or_default())
    }
}
