//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{CartItem, InMemoryCartStore, InMemoryOrchestrator, ReservationSettings};
use common::UserId;
use domain::PricingPolicy;
use inventory_store::{InMemoryInventoryStore, InventoryStoreExt, ProductId, ProductRecord};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryInventoryStore,
    cart: InMemoryCartStore,
    orchestrator: InMemoryOrchestrator,
}

async fn setup() -> TestApp {
    let store = InMemoryInventoryStore::with_products([
        ProductRecord::new("tee", "Tee", 1500, 10),
        ProductRecord::new("mug", "Mug", 1500, 3),
    ])
    .await;
    let cart = InMemoryCartStore::new();
    let orchestrator = InMemoryOrchestrator::new();
    let state = Arc::new(AppState::new(
        store.clone(),
        cart.clone(),
        orchestrator.clone(),
        PricingPolicy::default(),
        ReservationSettings::default(),
    ));
    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        store,
        cart,
        orchestrator,
    }
}

impl TestApp {
    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn stock(&self, product: &str) -> u32 {
        self.store
            .stock_of(&ProductId::new(product))
            .await
            .unwrap()
            .unwrap()
    }
}

fn checkout_request(user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/checkout")
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn address() -> Value {
    json!({
        "street": "1 Main St",
        "city": "Springfield",
        "state": "IL",
        "zipCode": "62701"
    })
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let (status, json) = t
        .send(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_checkout_starts_execution() {
    let t = setup().await;
    t.cart.set_cart(
        UserId::new("user-1"),
        vec![CartItem::new("tee", "Tee", 2), CartItem::new("mug", "Mug", 1)],
    );

    let (status, json) = t
        .send(checkout_request(
            "user-1",
            json!({ "shippingAddress": address() }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processing");
    assert_eq!(json["orderSummary"]["itemCount"], 2);
    assert_eq!(json["orderSummary"]["totalItems"], 3);
    assert_eq!(json["order"]["pricing"]["total"], 58.59);
    assert_eq!(json["order"]["pricing"]["shipping"], 9.99);
    assert_eq!(json["order"]["paymentMethod"], "card");
    assert_eq!(json["order"]["shippingAddress"]["country"], "US");
    assert!(json["orderId"].as_str().unwrap().starts_with("ORDER#"));
    assert_eq!(t.orchestrator.execution_count(), 1);
}

#[tokio::test]
async fn test_checkout_requires_user_header() {
    let t = setup().await;

    let (status, json) = t
        .post("/checkout", json!({ "shippingAddress": address() }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "validation_error");
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let t = setup().await;

    let (status, json) = t
        .send(checkout_request(
            "nobody",
            json!({ "shippingAddress": address() }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "empty_cart");
    assert_eq!(t.store.product_reads(), 0);
}

#[tokio::test]
async fn test_checkout_incomplete_address() {
    let t = setup().await;

    let (status, json) = t
        .send(checkout_request(
            "user-1",
            json!({ "shippingAddress": { "street": "1 Main St", "city": "Springfield" } }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation_error");
    assert_eq!(json["details"], json!(["state", "zipCode"]));
}

#[tokio::test]
async fn test_checkout_inventory_invalid() {
    let t = setup().await;
    t.cart
        .set_cart(UserId::new("user-2"), vec![CartItem::new("mug", "Mug", 5)]);

    let (status, json) = t
        .send(checkout_request(
            "user-2",
            json!({ "shippingAddress": address() }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "inventory_invalid");
    assert_eq!(json["details"][0]["productId"], "mug");
    assert_eq!(json["details"][0]["reason"], "insufficient_stock");
    assert_eq!(json["details"][0]["requested"], 5);
    assert_eq!(json["details"][0]["available"], 3);
}

#[tokio::test]
async fn test_validate_reports_failures() {
    let t = setup().await;

    let (status, json) = t
        .post(
            "/inventory/validate",
            json!({ "items": [
                { "productId": "tee", "quantity": 1 },
                { "productId": "ghost", "quantity": 1 }
            ] }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    assert_eq!(json["validatedItems"][0]["price"], 15.0);
    assert_eq!(json["failures"][0]["reason"], "not_found");
}

#[tokio::test]
async fn test_check_insufficient_stock() {
    let t = setup().await;

    let (status, json) = t
        .post(
            "/inventory/check",
            json!({ "orderId": "o-1", "items": [{ "productId": "mug", "quantity": 4 }] }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "insufficient_stock");
}

#[tokio::test]
async fn test_reserve_and_release() {
    let t = setup().await;

    let (status, json) = t
        .post(
            "/inventory/reserve",
            json!({
                "orderId": "o-1",
                "userId": "user-1",
                "idempotencyKey": "o-1-reserve",
                "items": [
                    { "productId": "tee", "productName": "Tee", "quantity": 2, "price": 15.0 },
                    { "productId": "bogus", "quantity": 0 }
                ]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Inventory reserved successfully");
    assert_eq!(json["reservedItems"].as_array().unwrap().len(), 1);
    assert_eq!(t.stock("tee").await, 8);

    // Same key replays without touching stock.
    let (status, replay) = t
        .post(
            "/inventory/reserve",
            json!({
                "orderId": "o-1",
                "idempotencyKey": "o-1-reserve",
                "items": [{ "productId": "tee", "quantity": 2 }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["reservationGroupId"], json["reservationGroupId"]);
    assert_eq!(t.stock("tee").await, 8);

    let (status, released) = t
        .post("/inventory/release", json!({ "orderId": "o-1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["message"], "Inventory released successfully");
    assert_eq!(released["releasedItems"][0]["quantity"], 2);
    assert_eq!(t.stock("tee").await, 10);
}

#[tokio::test]
async fn test_commit_keeps_stock_sold() {
    let t = setup().await;
    t.post(
        "/inventory/reserve",
        json!({ "orderId": "o-6", "items": [{ "productId": "tee", "quantity": 3 }] }),
    )
    .await;

    let (status, json) = t
        .post("/inventory/commit", json!({ "orderId": "o-6" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Inventory committed successfully");
    assert_eq!(json["committedItems"][0]["quantity"], 3);

    let (status, released) = t
        .post("/inventory/release", json!({ "orderId": "o-6" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["releasedItems"], json!([]));
    assert_eq!(t.stock("tee").await, 7);

    let (status, json) = t.post("/inventory/commit", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation_error");
}

#[tokio::test]
async fn test_reserve_all_or_nothing() {
    let t = setup().await;

    let (status, json) = t
        .post(
            "/inventory/reserve",
            json!({
                "orderId": "o-2",
                "items": [
                    { "productId": "tee", "quantity": 2 },
                    { "productId": "mug", "quantity": 4 }
                ]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "insufficient_stock");
    assert_eq!(t.stock("tee").await, 10);
    assert_eq!(t.stock("mug").await, 3);
}

#[tokio::test]
async fn test_reserve_foreign_action_is_noop() {
    let t = setup().await;

    let (status, json) = t
        .post(
            "/inventory/reserve",
            json!({
                "orderId": "o-3",
                "action": "release",
                "items": [{ "productId": "tee", "quantity": 2 }]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Action release not applicable for reserve");
    assert_eq!(t.stock("tee").await, 10);
}

#[tokio::test]
async fn test_release_never_fails() {
    let t = setup().await;

    let (status, json) = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/inventory/release")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let t = setup().await;

    let (status, json) = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/inventory/reserve")
                .header("content-type", "application/json")
                .body(Body::from("[1, 2"))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation_error");
}

#[tokio::test]
async fn test_store_outage_is_service_unavailable() {
    let t = setup().await;
    t.store.set_unavailable(true).await;

    let (status, json) = t
        .post(
            "/inventory/reserve",
            json!({ "orderId": "o-4", "items": [{ "productId": "tee", "quantity": 1 }] }),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["kind"], "dependency_unavailable");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;
    t.post(
        "/inventory/reserve",
        json!({ "orderId": "o-5", "items": [{ "productId": "tee", "quantity": 1 }] }),
    )
    .await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("inventory_reservations_total"));
}
