mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{payments::PaymentGateway, routes::create_app};

fn app_with_gateway() -> (Router, Arc<common::FakeGateway>) {
    let fake = Arc::new(common::FakeGateway::new());
    let gateway: Arc<dyn PaymentGateway> = fake.clone();
    (create_app(common::lazy_state(Some(gateway))), fake)
}

fn app_without_gateway() -> Router {
    create_app(common::lazy_state(None))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn webhook(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("stripe-signature", sig);
    }
    builder.body(Body::from(body)).unwrap()
}

fn checkout(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/checkout")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn webhook_without_gateway_is_unavailable() {
    let body = common::other_event("evt_1", "payment_intent.created");
    let sig = common::sign(&body);
    let (status, json) = send(app_without_gateway(), webhook(body, Some(sig))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["data"]["code"], "GATEWAY_UNAVAILABLE");
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let (app, _) = app_with_gateway();
    let body = common::other_event("evt_2", "payment_intent.created");
    let (status, json) = send(app, webhook(body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn webhook_with_tampered_body_is_rejected() {
    let (app, _) = app_with_gateway();
    let body = common::completed_event("evt_3", "cs_test_x", Some(Uuid::new_v4()));
    let sig = common::sign(&body);
    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] = b' ';
    let (status, json) = send(app, webhook(tampered, Some(sig))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn webhook_signed_with_other_secret_is_rejected() {
    let (app, _) = app_with_gateway();
    let body = common::other_event("evt_4", "charge.refunded");
    let sig = storefront_api::payments::signature::sign(
        &body,
        "whsec_someone_else",
        chrono::Utc::now().timestamp(),
    );
    let (status, _) = send(app, webhook(body, Some(sig))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_acknowledges_unhandled_event_types() {
    let (app, _) = app_with_gateway();
    let body = common::other_event("evt_5", "payment_intent.created");
    let sig = common::sign(&body);
    let (status, json) = send(app, webhook(body, Some(sig))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["received"], true);
    assert_eq!(json["data"]["outcome"], "ignored");
}

#[tokio::test]
async fn webhook_with_valid_signature_but_garbage_body_is_bad_request() {
    let (app, _) = app_with_gateway();
    let body = b"not json".to_vec();
    let sig = common::sign(&body);
    let (status, json) = send(app, webhook(body, Some(sig))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn checkout_with_empty_cart_is_rejected() {
    let (app, fake) = app_with_gateway();
    let (status, json) = send(
        app,
        checkout(serde_json::json!({ "items": [], "customerEmail": "buyer@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["code"], "EMPTY_CART");
    assert_eq!(fake.request_count(), 0);
}

#[tokio::test]
async fn checkout_without_gateway_is_unavailable() {
    let (status, json) = send(
        app_without_gateway(),
        checkout(serde_json::json!({
            "items": [{ "productId": Uuid::new_v4(), "quantity": 1 }],
            "customerEmail": "buyer@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["data"]["code"], "GATEWAY_UNAVAILABLE");
}

#[tokio::test]
async fn checkout_rejects_non_positive_quantity() {
    let (app, _) = app_with_gateway();
    let (status, json) = send(
        app,
        checkout(serde_json::json!({
            "items": [{ "productId": Uuid::new_v4(), "quantity": 0 }],
            "customerEmail": "buyer@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn order_lookup_without_gateway_is_unavailable() {
    let request = Request::builder()
        .uri("/api/orders?session_id=cs_test_1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app_without_gateway(), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_route_returns_not_found_envelope() {
    let request = Request::builder()
        .uri("/api/nope")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app_without_gateway(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["data"]["path"], "/api/nope");
}

#[tokio::test]
async fn sweep_rejects_out_of_range_age() {
    for minutes in [i64::MAX, i64::MAX / 60_000, -5] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/orders/sweep")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "older_than_minutes": minutes }).to_string(),
            ))
            .unwrap();
        let (status, json) = send(app_without_gateway(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "minutes={minutes}");
        assert_eq!(json["data"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn huge_page_number_does_not_panic() {
    let request = Request::builder()
        .uri("/api/products?page=9223372036854775807&per_page=100")
        .body(Body::empty())
        .unwrap();
    let response = app_without_gateway().oneshot(request).await.unwrap();
    // No database behind the lazy pool, so the query itself fails cleanly.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
