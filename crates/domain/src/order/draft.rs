//! The order draft handed to the orchestrator.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderItem, Pricing, ShippingAddress};

/// Payment method used when the shopper does not name one.
pub const DEFAULT_PAYMENT_METHOD: &str = "card";

/// Status of an order draft. Drafts are always emitted pending; later states
/// belong to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
}

/// A priced, inventory-validated order ready for the orchestrator.
///
/// Immutable once emitted: there are no mutators, only the constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub pricing: Pricing,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderDraft {
    /// Creates a pending draft with a freshly generated order ID.
    pub fn new(
        user_id: UserId,
        items: Vec<OrderItem>,
        pricing: Pricing,
        shipping_address: ShippingAddress,
        payment_method: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: OrderId::generate(),
            user_id,
            status: OrderStatus::Pending,
            items,
            pricing,
            shipping_address,
            payment_method: payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the summary reported back to the shopper.
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            item_count: self.items.len(),
            total_items: self.items.iter().map(|i| i.quantity).sum(),
            pricing: self.pricing,
        }
    }
}

/// Short description of a draft: distinct lines, units and totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub item_count: usize,
    pub total_items: u32,
    pub pricing: Pricing,
}
