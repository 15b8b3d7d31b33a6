mod common;

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, sea_query::Expr};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    dto::{
        checkout::{CheckoutLine, CheckoutRequest, CheckoutSession},
        orders::UpdateOrderStatusRequest,
        products::InventoryAdjustRequest,
    },
    entity::{
        orders::{Column as OrderCol, Entity as Orders, OrderStatus},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    payments::{GatewayEvent, PaymentGateway},
    routes::{
        create_app,
        params::{LowStockQuery, ProductQuery},
    },
    services::{
        admin_service, checkout_service, fulfillment_service::{self, FulfillmentOutcome},
        housekeeping, order_service, product_service,
    },
    state::AppState,
};

fn buyer() -> String {
    format!("buyer-{}@example.com", Uuid::new_v4().simple())
}

async fn place_order(
    state: &AppState,
    email: &str,
    product: &ProductModel,
    quantity: i32,
) -> AppResult<CheckoutSession> {
    let resp = checkout_service::checkout(
        state,
        CheckoutRequest {
            items: vec![CheckoutLine {
                product_id: product.id,
                quantity,
                unit_price: Some(product.price),
            }],
            customer_email: email.to_string(),
            customer_name: Some("Test Buyer".into()),
            customer_address: None,
        },
        None,
    )
    .await?;
    Ok(resp.data.expect("checkout session"))
}

async fn deliver(state: &AppState, body: Vec<u8>, signature: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let response = create_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn inventory_of(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.inventory)
}

async fn orders_for(state: &AppState, email: &str) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::CustomerEmail.eq(email))
        .count(&state.orm)
        .await?)
}

fn fake_state_gateway() -> (Arc<common::FakeGateway>, Option<Arc<dyn PaymentGateway>>) {
    let fake = Arc::new(common::FakeGateway::new());
    let gateway: Arc<dyn PaymentGateway> = fake.clone();
    (fake, Some(gateway))
}

#[tokio::test]
async fn paid_once_even_when_signal_is_redelivered() -> anyhow::Result<()> {
    let (fake, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 1000, 5).await?;
    let session = place_order(&state, &buyer(), &product, 2).await?;
    assert_eq!(session.session_id, common::FakeGateway::session_id_for(session.order_id));
    assert!(session.checkout_url.contains(&session.session_id));

    let sent = fake.requests.lock().unwrap()[0].clone();
    assert_eq!(sent.total_amount, 2000);
    assert_eq!(sent.success_url, "http://shop.test/shop/success?session_id={CHECKOUT_SESSION_ID}");

    let order = Orders::find_by_id(session.order_id).one(&state.orm).await?.unwrap();
    assert_eq!(order.total_amount, 2000);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_session_id.as_deref(), Some(session.session_id.as_str()));
    assert_eq!(inventory_of(&state, product.id).await?, 5);

    let event_id = format!("evt_{}", Uuid::new_v4().simple());
    let body = common::completed_event(&event_id, &session.session_id, Some(session.order_id));

    let (status, json) = deliver(&state, body.clone(), common::sign(&body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["outcome"], "fulfilled");

    let order = Orders::find_by_id(session.order_id).one(&state.orm).await?.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.payment_transaction_id.is_some());
    assert_eq!(inventory_of(&state, product.id).await?, 3);

    let (status, json) = deliver(&state, body.clone(), common::sign(&body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["outcome"], "duplicate");
    assert_eq!(inventory_of(&state, product.id).await?, 3);

    // A second event id for the same order is stopped by the status guard.
    let other = common::completed_event(
        &format!("evt_{}", Uuid::new_v4().simple()),
        &session.session_id,
        Some(session.order_id),
    );
    let (status, json) = deliver(&state, other.clone(), common::sign(&other)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["outcome"], "duplicate");
    assert_eq!(inventory_of(&state, product.id).await?, 3);

    Ok(())
}

#[tokio::test]
async fn order_resolved_by_session_when_metadata_missing() -> anyhow::Result<()> {
    let (_, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 500, 4).await?;
    let session = place_order(&state, &buyer(), &product, 1).await?;

    let body = common::completed_event(
        &format!("evt_{}", Uuid::new_v4().simple()),
        &session.session_id,
        None,
    );
    let (status, json) = deliver(&state, body.clone(), common::sign(&body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["outcome"], "fulfilled");
    assert_eq!(inventory_of(&state, product.id).await?, 3);

    let found = order_service::get_order_by_session(&state, &session.session_id)
        .await?
        .data
        .unwrap();
    assert_eq!(found.order.id, session.order_id);
    assert_eq!(found.order.status, OrderStatus::Paid);
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].product_name.as_deref(), Some(product.name.as_str()));
    assert_eq!(found.session.id, session.session_id);

    Ok(())
}

#[tokio::test]
async fn unknown_product_creates_no_order() -> anyhow::Result<()> {
    let (fake, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let email = buyer();
    let real = common::insert_product(&state, 1000, 5).await?;
    let missing = Uuid::new_v4();
    let result = checkout_service::checkout(
        &state,
        CheckoutRequest {
            items: vec![
                CheckoutLine {
                    product_id: real.id,
                    quantity: 1,
                    unit_price: None,
                },
                CheckoutLine {
                    product_id: missing,
                    quantity: 1,
                    unit_price: None,
                },
            ],
            customer_email: email.clone(),
            customer_name: None,
            customer_address: None,
        },
        None,
    )
    .await;

    assert!(matches!(result, Err(AppError::ProductNotFound(id)) if id == missing));
    assert_eq!(orders_for(&state, &email).await?, 0);
    assert_eq!(fake.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn insufficient_inventory_creates_no_order() -> anyhow::Result<()> {
    let (fake, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let email = buyer();
    let product = common::insert_product(&state, 1000, 1).await?;
    let result = place_order(&state, &email, &product, 2).await;

    match result {
        Err(AppError::InsufficientInventory {
            product_id,
            requested,
            available,
            ..
        }) => {
            assert_eq!(product_id, product.id);
            assert_eq!(requested, 2);
            assert_eq!(available, 1);
        }
        other => panic!("expected InsufficientInventory, got {other:?}"),
    }
    assert_eq!(orders_for(&state, &email).await?, 0);
    assert_eq!(fake.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn tampered_signal_changes_nothing() -> anyhow::Result<()> {
    let (_, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 1000, 5).await?;
    let session = place_order(&state, &buyer(), &product, 2).await?;

    let body = common::completed_event("evt_forged", &session.session_id, Some(session.order_id));
    let forged = storefront_api::payments::signature::sign(
        &body,
        "whsec_not_ours",
        chrono::Utc::now().timestamp(),
    );
    let (status, json) = deliver(&state, body, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["code"], "INVALID_SIGNATURE");

    let order = Orders::find_by_id(session.order_id).one(&state.orm).await?.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(inventory_of(&state, product.id).await?, 5);
    Ok(())
}

#[tokio::test]
async fn concurrent_signals_decrement_once() -> anyhow::Result<()> {
    let (_, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 1000, 5).await?;
    let session = place_order(&state, &buyer(), &product, 2).await?;

    let body = common::completed_event(
        &format!("evt_{}", Uuid::new_v4().simple()),
        &session.session_id,
        Some(session.order_id),
    );
    let first = GatewayEvent::from_slice(&body)?;
    let second = first.clone();

    let (a, b) = tokio::join!(
        fulfillment_service::handle_event(&state, first),
        fulfillment_service::handle_event(&state, second),
    );
    let outcomes = [a?, b?];
    let fulfilled = outcomes
        .iter()
        .filter(|o| matches!(o, FulfillmentOutcome::Fulfilled { .. }))
        .count();
    assert_eq!(fulfilled, 1, "outcomes: {outcomes:?}");
    assert_eq!(inventory_of(&state, product.id).await?, 3);
    Ok(())
}

#[tokio::test]
async fn oversell_clamps_inventory_at_zero() -> anyhow::Result<()> {
    let (_, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 800, 2).await?;
    // Stock is only checked at checkout, so both carts pass.
    let first = place_order(&state, &buyer(), &product, 2).await?;
    let second = place_order(&state, &buyer(), &product, 2).await?;

    let outcome = fulfillment_service::mark_paid(&state, &format!("evt_{}", Uuid::new_v4()), first.order_id, Some("pi_a")).await?;
    assert!(matches!(outcome, FulfillmentOutcome::Fulfilled { ref oversold, .. } if oversold.is_empty()));
    assert_eq!(inventory_of(&state, product.id).await?, 0);

    let outcome = fulfillment_service::mark_paid(&state, &format!("evt_{}", Uuid::new_v4()), second.order_id, Some("pi_b")).await?;
    match outcome {
        FulfillmentOutcome::Fulfilled { order_id, oversold } => {
            assert_eq!(order_id, second.order_id);
            assert_eq!(oversold, vec![product.id]);
        }
        other => panic!("expected Fulfilled, got {other:?}"),
    }
    assert_eq!(inventory_of(&state, product.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn sold_out_products_leave_the_listing_but_stay_readable() -> anyhow::Result<()> {
    let Some(state) = common::db_state(None).await? else {
        return Ok(());
    };

    let sold_out = common::insert_product(&state, 1200, 0).await?;
    let listed = product_service::list_products(
        &state,
        ProductQuery {
            q: Some(sold_out.name.clone()),
            ..ProductQuery::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert!(listed.items.is_empty());

    let fetched = product_service::get_product(&state, sold_out.id).await?.data.unwrap();
    assert_eq!(fetched.id, sold_out.id);
    assert_eq!(fetched.inventory, 0);

    let in_stock = common::insert_product(&state, 1200, 3).await?;
    let listed = product_service::list_products(
        &state,
        ProductQuery {
            q: Some(in_stock.name.clone()),
            ..ProductQuery::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(listed.items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_session_leaves_orphan_for_the_sweep() -> anyhow::Result<()> {
    let fake = Arc::new(common::FakeGateway::rejecting());
    let gateway: Arc<dyn PaymentGateway> = fake.clone();
    let Some(state) = common::db_state(Some(gateway)).await? else {
        return Ok(());
    };

    let email = buyer();
    let product = common::insert_product(&state, 1000, 5).await?;
    let result = place_order(&state, &email, &product, 1).await;
    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(fake.request_count(), 1);

    let orphan = Orders::find()
        .filter(OrderCol::CustomerEmail.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .expect("pending order persisted before the gateway call");
    assert_eq!(orphan.status, OrderStatus::Pending);
    assert!(orphan.payment_session_id.is_none());

    // Age the order past the TTL without touching anything else in the table.
    let aged: sea_orm::prelude::DateTimeWithTimeZone =
        (chrono::Utc::now() - chrono::Duration::hours(3)).into();
    Orders::update_many()
        .col_expr(OrderCol::CreatedAt, Expr::value(aged))
        .filter(OrderCol::Id.eq(orphan.id))
        .exec(&state.orm)
        .await?;

    let cancelled = housekeeping::cancel_orphaned_orders(&state.orm, chrono::Duration::hours(2)).await?;
    assert!(cancelled >= 1);

    let orphan = Orders::find_by_id(orphan.id).one(&state.orm).await?.unwrap();
    assert_eq!(orphan.status, OrderStatus::Cancelled);

    // A late completion signal for a cancelled order is acknowledged but not applied.
    let outcome = fulfillment_service::mark_paid(&state, &format!("evt_{}", Uuid::new_v4()), orphan.id, None).await?;
    assert!(matches!(
        outcome,
        FulfillmentOutcome::NotPayable { status: OrderStatus::Cancelled, .. }
    ));
    assert_eq!(inventory_of(&state, product.id).await?, 5);
    Ok(())
}

#[tokio::test]
async fn transient_gateway_failures_are_retried() -> anyhow::Result<()> {
    let fake = Arc::new(common::FakeGateway::failing_transiently(2));
    let gateway: Arc<dyn PaymentGateway> = fake.clone();
    let Some(state) = common::db_state(Some(gateway)).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 300, 10).await?;
    let session = place_order(&state, &buyer(), &product, 1).await?;
    assert_eq!(fake.request_count(), 3);

    let order = Orders::find_by_id(session.order_id).one(&state.orm).await?.unwrap();
    assert_eq!(order.payment_session_id.as_deref(), Some(session.session_id.as_str()));
    Ok(())
}

#[tokio::test]
async fn admin_transitions_follow_the_lifecycle() -> anyhow::Result<()> {
    let (_, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 1000, 5).await?;
    let session = place_order(&state, &buyer(), &product, 1).await?;

    let manual_paid = admin_service::update_order_status(
        &state,
        session.order_id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Paid,
        },
    )
    .await;
    assert!(matches!(
        manual_paid,
        Err(AppError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Paid
        })
    ));

    fulfillment_service::mark_paid(&state, &format!("evt_{}", Uuid::new_v4()), session.order_id, Some("pi_admin")).await?;

    let shipped = admin_service::update_order_status(
        &state,
        session.order_id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let back = admin_service::update_order_status(
        &state,
        session.order_id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Pending,
        },
    )
    .await;
    assert!(matches!(back, Err(AppError::InvalidTransition { .. })));
    Ok(())
}

#[tokio::test]
async fn client_prices_are_ignored() -> anyhow::Result<()> {
    let (fake, gateway) = fake_state_gateway();
    let Some(state) = common::db_state(gateway).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 1000, 5).await?;
    let session = checkout_service::checkout(
        &state,
        CheckoutRequest {
            items: vec![CheckoutLine {
                product_id: product.id,
                quantity: 2,
                unit_price: Some(1),
            }],
            customer_email: buyer(),
            customer_name: None,
            customer_address: None,
        },
        None,
    )
    .await?
    .data
    .unwrap();

    let order = Orders::find_by_id(session.order_id).one(&state.orm).await?.unwrap();
    assert_eq!(order.total_amount, 2000);

    let sent = fake.requests.lock().unwrap()[0].clone();
    assert_eq!(sent.total_amount, 2000);
    assert_eq!(sent.line_items[0].unit_amount, 1000);
    Ok(())
}

#[tokio::test]
async fn inventory_adjustments_never_go_negative() -> anyhow::Result<()> {
    let Some(state) = common::db_state(None).await? else {
        return Ok(());
    };

    let product = common::insert_product(&state, 1000, 3).await?;

    let past_zero =
        admin_service::adjust_inventory(&state, product.id, InventoryAdjustRequest { delta: -4 }).await;
    assert!(matches!(past_zero, Err(AppError::BadRequest(_))));
    assert_eq!(inventory_of(&state, product.id).await?, 3);

    let zero =
        admin_service::adjust_inventory(&state, product.id, InventoryAdjustRequest { delta: 0 }).await;
    assert!(matches!(zero, Err(AppError::BadRequest(_))));
    assert_eq!(inventory_of(&state, product.id).await?, 3);

    let to_zero = admin_service::adjust_inventory(&state, product.id, InventoryAdjustRequest { delta: -3 })
        .await?
        .data
        .unwrap();
    assert_eq!(to_zero.inventory, 0);

    let restocked = admin_service::adjust_inventory(&state, product.id, InventoryAdjustRequest { delta: 10 })
        .await?
        .data
        .unwrap();
    assert_eq!(restocked.inventory, 10);
    Ok(())
}

#[tokio::test]
async fn low_stock_respects_threshold() -> anyhow::Result<()> {
    let Some(state) = common::db_state(None).await? else {
        return Ok(());
    };

    let scarce = common::insert_product(&state, 1000, 1).await?;
    let plenty = common::insert_product(&state, 1000, 7).await?;

    let listed = admin_service::list_low_stock(
        &state,
        LowStockQuery {
            page: Some(1),
            per_page: Some(100),
            threshold: Some(1),
        },
    )
    .await?
    .data
    .unwrap();

    assert!(listed.items.iter().all(|p| p.inventory <= 1));
    assert!(listed.items.iter().any(|p| p.id == scarce.id));
    assert!(!listed.items.iter().any(|p| p.id == plenty.id));
    Ok(())
}
