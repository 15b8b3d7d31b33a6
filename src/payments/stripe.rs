use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{
    GatewayError, GatewayEvent, HostedSession, ORDER_ID_METADATA_KEY, PaymentGateway,
    SessionRequest, SessionSummary, signature,
};
use crate::config::StripeConfig;

/// Stripe Checkout over the REST API.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: Option<String>,
    api_base: String,
}

#[derive(Deserialize)]
struct CreatedSession {
    id: String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Rejected(format!("http client: {e}")))?;
        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("client_reference_id".to_string(), request.order_id.to_string()),
            (
                format!("metadata[{ORDER_ID_METADATA_KEY}]"),
                request.order_id.to_string(),
            ),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((
                format!("{prefix}[price_data][currency]"),
                request.currency.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(description) = item.description.as_ref().filter(|d| !d.is_empty()) {
                form.push((
                    format!("{prefix}[price_data][product_data][description]"),
                    description.clone(),
                ));
            }
            if let Some(image) = item.image_url.as_ref().filter(|u| !u.is_empty()) {
                form.push((
                    format!("{prefix}[price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }
        form
    }
}

fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        GatewayError::Transient(err.to_string())
    } else {
        GatewayError::Rejected(err.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(classify_transport);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{status}: {body}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(GatewayError::Transient(message))
    } else {
        Err(GatewayError::Rejected(message))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession, GatewayError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            // Retries for one order reuse the key, so the gateway never opens two sessions.
            .header("Idempotency-Key", format!("checkout-{}", request.order_id))
            .form(&Self::session_form(request))
            .send()
            .await
            .map_err(classify_transport)?;

        let created: CreatedSession = read_json(response).await?;
        let url = created
            .url
            .ok_or_else(|| GatewayError::Rejected("session has no redirect url".into()))?;
        Ok(HostedSession {
            id: created.id,
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionSummary, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(classify_transport)?;
        read_json(response).await
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(GatewayError::NotConfigured)?;
        signature::verify(
            payload,
            signature_header,
            secret,
            signature::DEFAULT_TOLERANCE_SECS,
            Utc::now().timestamp(),
        )?;
        GatewayEvent::from_slice(payload)
    }
}
