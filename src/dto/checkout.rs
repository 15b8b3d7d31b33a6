use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Accepted for client convenience and ignored; orders are priced server-side.
    #[serde(default)]
    pub unit_price: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutLine>,
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
}

impl CheckoutRequest {
    /// Check the request shape and merge repeated products.
    pub fn validate(&self) -> AppResult<Vec<(Uuid, i32)>> {
        if self.items.is_empty() {
            return Err(AppError::EmptyCart);
        }
        if !is_plausible_email(&self.customer_email) {
            return Err(AppError::BadRequest("customerEmail is not a valid email".into()));
        }

        let mut lines: Vec<(Uuid, i32)> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if item.quantity <= 0 {
                return Err(AppError::BadRequest(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
            match lines.iter_mut().find(|(id, _)| *id == item.product_id) {
                Some((_, qty)) => {
                    *qty = qty.checked_add(item.quantity).ok_or_else(|| {
                        AppError::BadRequest(format!("quantity for {} overflows", item.product_id))
                    })?
                }
                None => lines.push((item.product_id, item.quantity)),
            }
        }
        Ok(lines)
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub order_id: Uuid,
    pub session_id: String,
    pub checkout_url: String,
}
