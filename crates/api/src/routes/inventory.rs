//! Inventory step endpoints called by the order workflow.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use checkout::{
    CartStore, CheckRequest, CheckResult, CommitOutcome, CommitRequest, Orchestrator,
    ReleaseRequest, ReleaseResult, ReserveOutcome, ReserveRequest,
};
use domain::{DomainError, RequestedItem, ValidationReport};
use inventory_store::InventoryStore;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    pub items: Vec<RequestedItem>,
}

/// POST /inventory/validate: read-only pre-flight. Per-item failures are
/// part of the report, not an error.
#[tracing::instrument(skip_all)]
pub async fn validate<S, C, O>(
    State(state): State<Arc<AppState<S, C, O>>>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidationReport>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let Json(request) = payload?;
    if request.items.is_empty() {
        return Err(DomainError::Validation("items are required".to_string()).into());
    }
    let report = state.validator.validate(&request.items).await?;
    Ok(Json(report))
}

/// POST /inventory/check
#[tracing::instrument(skip_all)]
pub async fn check<S, C, O>(
    State(state): State<Arc<AppState<S, C, O>>>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckResult>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let Json(request) = payload?;
    Ok(Json(state.check.check(request).await?))
}

/// POST /inventory/reserve
#[tracing::instrument(skip_all)]
pub async fn reserve<S, C, O>(
    State(state): State<Arc<AppState<S, C, O>>>,
    payload: Result<Json<ReserveRequest>, JsonRejection>,
) -> Result<Json<ReserveOutcome>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let Json(request) = payload?;
    Ok(Json(state.reserve.reserve(request).await?))
}

/// POST /inventory/commit: settles the order's reservations after payment
/// and fulfillment succeeded.
#[tracing::instrument(skip_all)]
pub async fn commit<S, C, O>(
    State(state): State<Arc<AppState<S, C, O>>>,
    payload: Result<Json<CommitRequest>, JsonRejection>,
) -> Result<Json<CommitOutcome>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let Json(request) = payload?;
    Ok(Json(state.commit.commit(request).await?))
}

/// POST /inventory/release: always 200. An unreadable body is released as an
/// empty request, which reports the problem in `error`.
#[tracing::instrument(skip_all)]
pub async fn release<S, C, O>(
    State(state): State<Arc<AppState<S, C, O>>>,
    payload: Result<Json<ReleaseRequest>, JsonRejection>,
) -> Json<ReleaseResult>
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "unreadable release payload");
            ReleaseRequest::default()
        }
    };
    Json(state.release.release(request).await)
}
