//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ledger::StockPool;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use stock_store::InMemoryStockStore;
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

fn setup() -> axum::Router {
    let pool = StockPool::new(InMemoryStockStore::new());
    api::create_app(api::create_state(pool), get_metrics_handle())
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn register(app: &axum::Router, name: &str, quantity: i64) -> String {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/products",
            json!({ "name": name, "quantity": quantity, "min_stock": 5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["default_reservation_minutes"], 30);
    assert_eq!(json["large_adjustment_threshold"], 100);
}

#[tokio::test]
async fn test_reserve_then_release() {
    let app = setup();
    let product_id = register(&app, "Widget", 100).await;

    let (status, reservation) = send(
        &app,
        json_request(
            "POST",
            &format!("/products/{product_id}/reservations"),
            json!({ "quantity": 60, "actor_id": "u1", "reason": "order #1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["quantity"], 60);
    let reservation_id = reservation["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{product_id}/available"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available_stock"], 40);

    // Over-reserving is a conflict
    let (status, json) = send(
        &app,
        json_request(
            "POST",
            &format!("/products/{product_id}/reservations"),
            json!({ "quantity": 50, "actor_id": "u2" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("Available: 40"));

    let (status, released) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/reservations/{reservation_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["id"], reservation_id.as_str());

    // A second release finds nothing
    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/reservations/{reservation_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, summary) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{product_id}/stock"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(summary["total_stock"], 100);
    assert_eq!(summary["available_stock"], 100);
    assert_eq!(summary["reserved_stock"], 0);
}

#[tokio::test]
async fn test_fulfill_uses_actor_header() {
    let app = setup();
    let product_id = register(&app, "Gadget", 20).await;

    let (_, reservation) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/products/{product_id}/reservations"))
            .header("content-type", "application/json")
            .header("x-actor-id", "cashier-7")
            .body(Body::from(json!({ "quantity": 5 }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(reservation["actor_id"], "cashier-7");
    let reservation_id = reservation["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/reservations/{reservation_id}/fulfill"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, movement) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/reservations/{reservation_id}/fulfill"))
            .header("x-actor-id", "cashier-7")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(movement["movement_type"], "SALE");
    assert_eq!(movement["before_qty"], 20);
    assert_eq!(movement["after_qty"], 15);

    let (_, history) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{product_id}/movements?type=sale&order=desc"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_adjustment_rejections() {
    let app = setup();
    let product_id = register(&app, "Bolt", 10).await;
    let uri = format!("/products/{product_id}/adjustments");

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "quantity": -2, "reason": "MISPLACED", "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("MISPLACED"));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "quantity": 500, "reason": "FOUND", "actor_id": "u1", "require_approval": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "quantity": -11, "reason": "DAMAGE", "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, movement) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "quantity": -3, "reason": "DAMAGE", "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(movement["movement_type"], "ADJUSTMENT");
    assert_eq!(movement["after_qty"], 7);

    let (_, report) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{product_id}/audit"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(report["current_quantity"], 7);
    assert_eq!(report["discrepancies"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_movement_validation() {
    let app = setup();
    let product_id = register(&app, "Nut", 3).await;
    let uri = format!("/products/{product_id}/movements");

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "movement_type": "ADJUSTMENT", "quantity": 1, "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Unsupported operation"));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "movement_type": "SALE", "quantity": 4, "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(
        &app,
        json_request("POST", &uri, json!({ "movement_type": "SALE", "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("x-actor-id"));

    let (status, validation) = send(
        &app,
        json_request(
            "POST",
            &format!("/products/{product_id}/validate"),
            json!({ "quantity": 5, "operation": "reduce" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validation["valid"], false);
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let app = setup();

    let (status, _) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{}/stock", common::ProductId::new()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/products/not-a-uuid/stock")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid product ID"));
}

#[tokio::test]
async fn test_cleanup_and_actor_reservations() {
    let app = setup();
    let product_id = register(&app, "Cable", 10).await;

    send(
        &app,
        json_request(
            "POST",
            &format!("/products/{product_id}/reservations"),
            json!({ "quantity": 2, "actor_id": "alice" }),
        ),
    )
    .await;

    let (status, held) = send(
        &app,
        Request::builder()
            .uri("/actors/alice/reservations")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(held.as_array().unwrap().len(), 1);

    let reservation_id = held[0]["id"].as_str().unwrap();
    let (status, json) = send(
        &app,
        Request::builder()
            .uri(format!("/reservations/{reservation_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quantity"], 2);

    let (status, json) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/reservations/cleanup")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 0);
}

#[tokio::test]
async fn test_out_of_range_numbers_are_rejected() {
    let app = setup();
    let product_id = register(&app, "Crate", 10).await;

    for minutes in [i64::MAX / 2, 600_000] {
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                &format!("/products/{product_id}/reservations"),
                json!({ "quantity": 1, "actor_id": "u1", "expiration_minutes": minutes }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{minutes}");
        assert!(json["error"].as_str().unwrap().contains("minutes"));
    }

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            &format!("/products/{product_id}/movements"),
            json!({ "movement_type": "PURCHASE", "quantity": i64::MAX, "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("out of range"));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/products/{product_id}/adjustments"),
            json!({ "quantity": i64::MAX, "reason": "FOUND", "actor_id": "u1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Request::builder()
            .uri(format!(
                "/products/{product_id}/movements?limit={}",
                u64::MAX
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was written and the server still answers
    let (status, summary) = send(
        &app,
        Request::builder()
            .uri(format!("/products/{product_id}/stock"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_stock"], 10);
    assert_eq!(summary["active_reservations"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    register(&app, "Lamp", 1).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}
