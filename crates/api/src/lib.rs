//! HTTP API server for the checkout pipeline.
//!
//! Exposes checkout to shoppers and the inventory steps to the order
//! workflow, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CartStore, CheckoutInitiator, CommitCoordinator, InMemoryCartStore, InMemoryOrchestrator,
    InventoryCheck, Orchestrator, ReleaseCoordinator, ReservationCoordinator, ReservationSettings,
};
use domain::{InventoryValidator, PricingPolicy};
use inventory_store::InventoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
///
/// Every component gets its own handle on the same store.
pub struct AppState<S, C = InMemoryCartStore, O = InMemoryOrchestrator>
where
    S: InventoryStore,
    C: CartStore,
    O: Orchestrator,
{
    pub checkout: CheckoutInitiator<S, C, O>,
    pub validator: InventoryValidator<S>,
    pub check: InventoryCheck<S>,
    pub reserve: ReservationCoordinator<S>,
    pub commit: CommitCoordinator<S>,
    pub release: ReleaseCoordinator<S>,
}

impl<S, C, O> AppState<S, C, O>
where
    S: InventoryStore + Clone,
    C: CartStore,
    O: Orchestrator,
{
    pub fn new(
        store: S,
        cart: C,
        orchestrator: O,
        pricing: PricingPolicy,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            checkout: CheckoutInitiator::new(store.clone(), cart, orchestrator, pricing),
            validator: InventoryValidator::new(store.clone()),
            check: InventoryCheck::new(store.clone()),
            reserve: ReservationCoordinator::new(store.clone(), settings),
            commit: CommitCoordinator::new(store.clone()),
            release: ReleaseCoordinator::new(store, settings),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C, O>(state: Arc<AppState<S, C, O>>, metrics_handle: PrometheusHandle) -> Router
where
    S: InventoryStore + Clone + 'static,
    C: CartStore + 'static,
    O: Orchestrator + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::start::<S, C, O>))
        .route(
            "/inventory/validate",
            post(routes::inventory::validate::<S, C, O>),
        )
        .route("/inventory/check", post(routes::inventory::check::<S, C, O>))
        .route("/inventory/reserve", post(routes::inventory::reserve::<S, C, O>))
        .route("/inventory/commit", post(routes::inventory::commit::<S, C, O>))
        .route("/inventory/release", post(routes::inventory::release::<S, C, O>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
