use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::orders::OrderBySession,
    error::AppResult,
    response::ApiResponse,
    routes::params::SessionQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_order_by_session))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("session_id" = String, Query, description = "Hosted payment session id")
    ),
    responses(
        (status = 200, description = "Order for the payment session", body = ApiResponse<OrderBySession>),
        (status = 404, description = "No order for this session"),
        (status = 503, description = "Payment gateway not configured"),
    ),
    tag = "Orders"
)]
pub async fn get_order_by_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> AppResult<Json<ApiResponse<OrderBySession>>> {
    let resp = order_service::get_order_by_session(&state, &query.session_id).await?;
    Ok(Json(resp))
}
