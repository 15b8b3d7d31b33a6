use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderBySession, OrderWithItems},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    models::OrderItem,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Order lookup for the post-payment landing page.
pub async fn get_order_by_session(
    state: &AppState,
    session_id: &str,
) -> AppResult<ApiResponse<OrderBySession>> {
    let gateway = state.gateway.clone().ok_or(AppError::GatewayUnavailable)?;

    let order = Orders::find()
        .filter(OrderCol::PaymentSessionId.eq(session_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    let session = gateway.retrieve_session(session_id).await?;
    let order = load_with_items(&state.orm, order).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderBySession {
            order,
            session: session.into(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn find_order_with_items<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<Option<OrderWithItems>> {
    match Orders::find_by_id(id).one(conn).await? {
        Some(order) => Ok(Some(load_with_items(conn, order).await?)),
        None => Ok(None),
    }
}

pub async fn load_with_items<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .find_also_related(Products)
        .all(conn)
        .await?
        .into_iter()
        .map(|(item, product)| OrderItem::from_entity(item, product.as_ref()))
        .collect();

    Ok(OrderWithItems {
        order: order.into(),
        items,
    })
}
