use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entity::orders::OrderStatus,
    payments::GatewayError,
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Insufficient inventory for {name} (requested {requested}, available {available})")]
    InsufficientInventory {
        product_id: Uuid,
        name: String,
        requested: i32,
        available: i32,
    },

    #[error("Payment processing is not configured")]
    GatewayUnavailable,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::EmptyCart
            | AppError::ProductNotFound(_)
            | AppError::InvalidSignature
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientInventory { .. } | AppError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::OrderNotFound | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code returned alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmptyCart => "EMPTY_CART",
            AppError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            AppError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            AppError::GatewayUnavailable => "GATEWAY_UNAVAILABLE",
            AppError::Gateway(_) => "GATEWAY_ERROR",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::OrderNotFound => "ORDER_NOT_FOUND",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::NotFound => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::DbError(_) | AppError::OrmError(_) => "PERSISTENCE_FAILURE",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => AppError::GatewayUnavailable,
            GatewayError::InvalidSignature(_) => AppError::InvalidSignature,
            GatewayError::MalformedEvent(msg) => AppError::BadRequest(msg),
            GatewayError::Transient(msg) | GatewayError::Rejected(msg) => AppError::Gateway(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::DbError(err) => tracing::error!(error = %err, "database error"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
            AppError::Internal(err) => tracing::error!(error = %err, "internal error"),
            AppError::Gateway(msg) => tracing::error!(error = %msg, "payment gateway error"),
            _ => {}
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                code: self.code(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
