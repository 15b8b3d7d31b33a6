use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entity::orders::OrderStatus,
    models::{Order, OrderItem},
    payments::SessionSummary,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderWithItems>,
}

/// The gateway's view of a checkout session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub id: String,
    pub customer_email: Option<String>,
    pub payment_status: Option<String>,
}

impl From<SessionSummary> for SessionInfo {
    fn from(summary: SessionSummary) -> Self {
        SessionInfo {
            id: summary.id,
            customer_email: summary.customer_email,
            payment_status: summary.payment_status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderBySession {
    pub order: OrderWithItems,
    pub session: SessionInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SweepRequest {
    /// Cancel orphaned orders older than this many minutes; defaults to the configured TTL.
    pub older_than_minutes: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResult {
    pub cancelled: u64,
}
