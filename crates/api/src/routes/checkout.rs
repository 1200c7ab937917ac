//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use checkout::{CartStore, CheckoutRequest, CheckoutResult, Orchestrator};
use common::UserId;
use inventory_store::InventoryStore;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the authenticated user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// POST /checkout: validate the caller's cart, price it and start the order
/// workflow.
#[tracing::instrument(skip_all)]
pub async fn start<S, C, O>(
    State(state): State<Arc<AppState<S, C, O>>>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResult>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let user_id = user_id(&headers)?;
    let Json(request) = payload?;
    let result = state.checkout.start_checkout(user_id, request).await?;
    Ok(Json(result))
}

fn user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new)
        .ok_or(ApiError::Unauthenticated(USER_ID_HEADER))
}
