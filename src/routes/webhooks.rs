use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::webhooks::WebhookAck,
    error::{AppError, AppResult},
    response::ApiResponse,
    services::fulfillment_service,
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe", post(stripe_webhook))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/stripe",
    request_body(content = String, description = "Raw signed event body", content_type = "application/json"),
    params(
        ("stripe-signature" = String, Header, description = "Gateway signature header")
    ),
    responses(
        (status = 200, description = "Event acknowledged", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Missing or invalid signature"),
        (status = 503, description = "Payment gateway not configured"),
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let gateway = state.gateway.clone().ok_or(AppError::GatewayUnavailable)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("webhook without signature header");
            AppError::InvalidSignature
        })?;

    let event = gateway.construct_event(&body, signature).map_err(|err| {
        tracing::warn!(error = %err, bytes = body.len(), "webhook rejected");
        AppError::from(err)
    })?;

    let outcome = fulfillment_service::handle_event(&state, event).await?;

    Ok(Json(ApiResponse::success(
        "Received",
        WebhookAck {
            received: true,
            outcome: outcome.label().to_string(),
        },
        None,
    )))
}
