//! Hosted payment provider integration.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub mod signature;
pub mod stripe;

pub use signature::SignatureError;
pub use stripe::StripeGateway;

/// The only event type that drives fulfillment.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Metadata key carrying our order id through the hosted session.
pub const ORDER_ID_METADATA_KEY: &str = "orderId";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    /// Network failures, timeouts, rate limits and 5xx responses.
    #[error("transient gateway failure: {0}")]
    Transient(String),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("malformed webhook event: {0}")]
    MalformedEvent(String),
}

#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub order_id: Uuid,
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub total_amount: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub customer_email: Option<String>,
    pub payment_status: Option<String>,
}

/// The part of a completed checkout session fulfillment needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub session_id: String,
    pub payment_reference: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    CheckoutCompleted {
        event_id: String,
        session: CompletedSession,
    },
    Other {
        event_id: String,
        event_type: String,
    },
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawSession {
    id: String,
    payment_intent: Option<serde_json::Value>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl GatewayEvent {
    /// Parse an already verified webhook body.
    pub fn from_slice(payload: &[u8]) -> Result<Self, GatewayError> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;

        if raw.event_type != CHECKOUT_COMPLETED {
            return Ok(GatewayEvent::Other {
                event_id: raw.id,
                event_type: raw.event_type,
            });
        }

        let session: RawSession = serde_json::from_value(raw.data.object)
            .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;

        // payment_intent is either an id string or an expanded object.
        let payment_reference = match session.payment_intent {
            Some(serde_json::Value::String(id)) => Some(id),
            Some(serde_json::Value::Object(obj)) => obj
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            _ => None,
        };

        Ok(GatewayEvent::CheckoutCompleted {
            event_id: raw.id,
            session: CompletedSession {
                session_id: session.id,
                payment_reference,
                order_id: session.metadata.get(ORDER_ID_METADATA_KEY).cloned(),
            },
        })
    }

    pub fn event_id(&self) -> &str {
        match self {
            GatewayEvent::CheckoutCompleted { event_id, .. } => event_id,
            GatewayEvent::Other { event_id, .. } => event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            GatewayEvent::CheckoutCompleted { .. } => CHECKOUT_COMPLETED,
            GatewayEvent::Other { event_type, .. } => event_type,
        }
    }
}

/// Hosted checkout provider. Injected through `AppState` so tests can swap in a fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionSummary, GatewayError>;

    /// Verify the signature header and parse the event. Nothing in `payload`
    /// is trusted before the signature checks out.
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError>;
}
