use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait, prelude::DateTimeWithTimeZone,
};
use uuid::Uuid;

use crate::{
    audit,
    config::orphan_ttl,
    dto::{
        orders::{OrderList, OrderWithItems, SweepRequest, SweepResult, UpdateOrderStatusRequest},
        products::{CreateProductRequest, InventoryAdjustRequest, ProductList, UpdateProductRequest},
    },
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    models::{Order, Product},
    response::{ApiResponse, Meta},
    routes::params::{LowStockQuery, OrderListQuery, SortOrder},
    services::{housekeeping, order_service},
    state::AppState,
};

const ACTOR: &str = "admin";

pub async fn list_all_orders(
    state: &AppState,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(orders.len());
    for order in orders {
        items.push(order_service::load_with_items(&state.orm, order).await?);
    }

    Ok(ApiResponse::paged(
        "Orders",
        OrderList { items },
        Meta::new(page, limit, total),
    ))
}

pub async fn get_order_admin(state: &AppState, id: Uuid) -> AppResult<ApiResponse<OrderWithItems>> {
    let data = order_service::find_order_with_items(&state.orm, id)
        .await?
        .ok_or(AppError::OrderNotFound)?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    let from = existing.status;
    if !from.can_transition_to(payload.status) {
        return Err(AppError::InvalidTransition {
            from,
            to: payload.status,
        });
    }

    let mut active: OrderActive = existing.into();
    active.status = Set(payload.status);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, from = %from, to = %order.status, "order status updated");
    audit::record(
        &state.pool,
        ACTOR,
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": from, "to": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

pub async fn create_product(
    state: &AppState,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;
    let now: DateTimeWithTimeZone = Utc::now().into();
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        inventory: Set(payload.inventory),
        image_url: Set(payload.image_url),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        ACTOR,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ProductActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        ACTOR,
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(ProdCol::Inventory.lte(threshold))
        .order_by_asc(ProdCol::Inventory)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::paged(
        "Low stock",
        ProductList { items },
        Meta::new(page, limit, total),
    ))
}

pub async fn adjust_inventory(
    state: &AppState,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_inventory = product
        .inventory
        .checked_add(payload.delta)
        .filter(|n| *n >= 0)
        .ok_or_else(|| AppError::BadRequest("inventory cannot be negative".into()))?;

    let mut active: ProductActive = product.into();
    active.inventory = Set(new_inventory);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        ACTOR,
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        Product::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn sweep_orphaned_orders(
    state: &AppState,
    payload: SweepRequest,
) -> AppResult<ApiResponse<SweepResult>> {
    let minutes = payload
        .older_than_minutes
        .unwrap_or(state.config.orphan_order_ttl_minutes);
    let older_than = orphan_ttl(minutes).ok_or_else(|| {
        AppError::BadRequest(format!("older_than_minutes out of range: {minutes}"))
    })?;
    let cancelled = housekeeping::cancel_orphaned_orders(&state.orm, older_than).await?;
    Ok(ApiResponse::success(
        "Sweep complete",
        SweepResult { cancelled },
        Some(Meta::empty()),
    ))
}
