use serde::Serialize;
use utoipa::ToSchema;

/// Acknowledgement returned to the gateway for every recognised delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: String,
}
