use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
    prelude::DateTimeWithTimeZone, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit,
    cart::Cart,
    config::AppConfig,
    dto::checkout::{CheckoutRequest, CheckoutSession},
    entity::{
        order_items::ActiveModel as OrderItemActive,
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        OrderItems,
    },
    error::{AppError, AppResult},
    models::Product,
    payments::{GatewayError, HostedSession, PaymentGateway, SessionLineItem, SessionRequest},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Start a checkout: price the cart from current catalog rows, persist a
/// pending order, then open a hosted payment session for it.
///
/// Inventory is only checked here. It is decremented when the gateway
/// confirms payment, so abandoned checkouts never hold stock.
#[tracing::instrument(skip_all, fields(items = payload.items.len()))]
pub async fn checkout(
    state: &AppState,
    payload: CheckoutRequest,
    origin: Option<String>,
) -> AppResult<ApiResponse<CheckoutSession>> {
    let lines = payload.validate()?;
    let gateway = state.gateway.clone().ok_or(AppError::GatewayUnavailable)?;

    let product_ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();

    let txn = state.orm.begin().await?;

    let products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&txn)
        .await?;

    for item in &payload.items {
        let server_price = products
            .iter()
            .find(|p| p.id == item.product_id)
            .map(|p| p.price);
        if let (Some(client), Some(server)) = (item.unit_price, server_price) {
            if client != server {
                tracing::debug!(
                    product_id = %item.product_id,
                    client_price = client,
                    server_price = server,
                    "ignoring client supplied price"
                );
            }
        }
    }

    let cart = price_cart(&lines, products)?;
    let total_amount = cart.total()?;

    let order_id = Uuid::new_v4();
    let now: DateTimeWithTimeZone = Utc::now().into();
    let customer_email = payload.customer_email.trim().to_string();

    OrderActive {
        id: Set(order_id),
        customer_email: Set(customer_email.clone()),
        customer_name: Set(non_blank(payload.customer_name)),
        customer_address: Set(non_blank(payload.customer_address)),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending),
        payment_session_id: Set(None),
        payment_transaction_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let items: Vec<OrderItemActive> = cart
        .lines()
        .iter()
        .map(|line| OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product.id),
            quantity: Set(line.quantity),
            price: Set(line.product.price),
            created_at: Set(now),
        })
        .collect();
    OrderItems::insert_many(items).exec(&txn).await?;

    txn.commit().await?;
    tracing::info!(order_id = %order_id, total_amount, "pending order created");

    let base = redirect_base(&state.config, origin.as_deref());

    let request = SessionRequest {
        order_id,
        currency: state.config.currency.clone(),
        line_items: cart
            .lines()
            .iter()
            .map(|line| SessionLineItem {
                name: line.product.name.clone(),
                description: line.product.description.clone(),
                image_url: line.product.image_url.clone(),
                unit_amount: line.product.price,
                quantity: line.quantity,
            })
            .collect(),
        total_amount,
        success_url: format!("{base}/shop/success?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base}/shop"),
        customer_email,
    };

    let session = match create_session_with_retry(
        gateway.as_ref(),
        &request,
        state.config.gateway_max_attempts,
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            // The order stays pending without a session; the orphan sweep cancels it.
            tracing::warn!(order_id = %order_id, error = %err, "payment session creation failed");
            return Err(err.into());
        }
    };

    Orders::update_many()
        .col_expr(OrderCol::PaymentSessionId, Expr::value(session.id.clone()))
        .col_expr(OrderCol::UpdatedAt, Expr::value(DateTimeWithTimeZone::from(Utc::now())))
        .filter(OrderCol::Id.eq(order_id))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.pool,
        "shopper",
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order_id, "session_id": session.id, "total_amount": total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout session created",
        CheckoutSession {
            order_id,
            session_id: session.id,
            checkout_url: session.url,
        },
        Some(Meta::empty()),
    ))
}

/// Build the server-side cart for the requested lines. Every id must resolve
/// before stock is considered, so a missing product always wins over a shortfall.
pub fn price_cart(lines: &[(Uuid, i32)], products: Vec<ProductModel>) -> AppResult<Cart> {
    let catalog: Vec<Product> = products.into_iter().map(Product::from).collect();
    let mut cart = Cart::new();
    for (product_id, quantity) in lines {
        let product = catalog
            .iter()
            .find(|p| p.id == *product_id)
            .ok_or(AppError::ProductNotFound(*product_id))?;
        cart.add(product.clone(), *quantity);
    }
    cart.ensure_in_stock()?;
    cart.total()?;
    Ok(cart)
}

/// Retry transient failures a bounded number of times with linear backoff.
pub async fn create_session_with_retry(
    gateway: &dyn PaymentGateway,
    request: &SessionRequest,
    max_attempts: u32,
) -> Result<HostedSession, GatewayError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match gateway.create_session(request).await {
            Ok(session) => return Ok(session),
            Err(GatewayError::Transient(msg)) if attempt < max_attempts => {
                tracing::warn!(
                    order_id = %request.order_id,
                    attempt,
                    error = %msg,
                    "transient gateway failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Origin for the gateway's success and cancel URLs. A request `Origin` is
/// honoured only when it is the public base URL or listed in `ALLOWED_ORIGINS`.
pub fn redirect_base(config: &AppConfig, origin: Option<&str>) -> String {
    let public = config.public_base_url.trim_end_matches('/');
    let Some(origin) = origin.map(|o| o.trim().trim_end_matches('/')).filter(|o| !o.is_empty()) else {
        return public.to_string();
    };
    let allowed = origin == public
        || config
            .allowed_origins
            .iter()
            .any(|a| a.trim_end_matches('/') == origin);
    if allowed {
        origin.to_string()
    } else {
        tracing::debug!(origin, "ignoring unlisted origin for redirect urls");
        public.to_string()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
