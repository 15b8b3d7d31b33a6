use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    routing::post,
};

use crate::{
    dto::checkout::{CheckoutRequest, CheckoutSession},
    error::AppResult,
    response::ApiResponse,
    services::checkout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_checkout))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Hosted payment session created", body = ApiResponse<CheckoutSession>),
        (status = 400, description = "Empty cart, unknown product or invalid payload"),
        (status = 409, description = "Insufficient inventory"),
        (status = 502, description = "Payment gateway failed"),
        (status = 503, description = "Payment gateway not configured"),
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutSession>>> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let resp = checkout_service::checkout(&state, payload, origin).await?;
    Ok(Json(resp))
}
