//! Checkout initiation: cart to priced order draft to orchestrator.

use std::collections::HashMap;

use chrono::Utc;
use domain::{
    InventoryValidator, OrderDraft, OrderSummary, PricingPolicy, RequestedItem, ShippingAddress,
};
use inventory_store::{InventoryStore, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::CheckoutError;
use crate::services::{CartItem, CartStore, ExecutionHandle, Orchestrator};

/// Payload of a checkout call. The user comes from the auth context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    pub order_id: OrderId,
    pub execution: ExecutionHandle,
    pub status: String,
    pub message: String,
    pub order_summary: OrderSummary,
    pub order: OrderDraft,
}

/// Turns a user's cart into a priced order draft and starts its workflow.
pub struct CheckoutInitiator<S, C, O>
where
    S: InventoryStore,
    C: CartStore,
    O: Orchestrator,
{
    validator: InventoryValidator<S>,
    cart: C,
    orchestrator: O,
    pricing: PricingPolicy,
}

impl<S, C, O> CheckoutInitiator<S, C, O>
where
    S: InventoryStore,
    C: CartStore,
    O: Orchestrator,
{
    pub fn new(store: S, cart: C, orchestrator: O, pricing: PricingPolicy) -> Self {
        Self {
            validator: InventoryValidator::new(store),
            cart,
            orchestrator,
            pricing,
        }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Starts checkout for a user.
    ///
    /// The address is checked before the cart is read, and an empty cart
    /// fails before any inventory read.
    #[tracing::instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn start_checkout(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<CheckoutResult, CheckoutError> {
        let result = self.run(user_id, request).await;
        match &result {
            Ok(_) => metrics::counter!("checkout_started_total").increment(1),
            Err(e) => {
                tracing::info!(kind = %e.kind(), error = %e, "checkout rejected");
                metrics::counter!("checkout_rejected_total", "kind" => e.kind().as_str())
                    .increment(1);
            }
        }
        result
    }

    async fn run(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<CheckoutResult, CheckoutError> {
        if user_id.is_blank() {
            return Err(CheckoutError::Validation("user id is required".to_string()));
        }

        let address = request
            .shipping_address
            .unwrap_or_else(|| ShippingAddress::new("", "", "", ""));
        let missing = address.missing_fields();
        if !missing.is_empty() {
            return Err(CheckoutError::IncompleteAddress { missing });
        }

        let cart = self
            .cart
            .get_cart_items(&user_id)
            .await
            .map_err(CheckoutError::Cart)?;
        let requested = requested_items(&cart);
        if requested.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let report = self.validator.validate(&requested).await?;
        if !report.valid {
            return Err(CheckoutError::InventoryInvalid {
                failures: report.failures,
            });
        }

        let items = report.order_items();
        let pricing = self.pricing.price_items(&items);
        let draft = OrderDraft::new(
            user_id.clone(),
            items,
            pricing,
            address,
            request.payment_method,
        );

        let execution_name = format!("checkout-{}-{}", user_id, Utc::now().timestamp_millis());
        let execution = self
            .orchestrator
            .start_execution(&execution_name, &draft)
            .await
            .map_err(CheckoutError::Orchestrator)?;

        tracing::info!(
            order_id = %draft.order_id,
            execution_id = %execution.execution_id,
            total = %draft.pricing.total,
            "checkout started"
        );

        Ok(CheckoutResult {
            order_id: draft.order_id.clone(),
            execution,
            status: "processing".to_string(),
            message: "Checkout started successfully".to_string(),
            order_summary: draft.summary(),
            order: draft,
        })
    }
}

/// Cart lines to validate, merged per product with zero quantities dropped.
fn requested_items(cart: &[CartItem]) -> Vec<RequestedItem> {
    let mut items: Vec<RequestedItem> = Vec::new();
    let mut positions: HashMap<&ProductId, usize> = HashMap::new();

    for line in cart.iter().filter(|l| l.quantity > 0 && !l.product_id.is_blank()) {
        match positions.get(&line.product_id) {
            Some(&pos) => {
                items[pos].quantity = items[pos].quantity.saturating_add(line.quantity);
            }
            None => {
                positions.insert(&line.product_id, items.len());
                items.push(RequestedItem::new(line.product_id.clone(), line.quantity));
            }
        }
    }
    items
}
