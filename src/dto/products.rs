use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::Product,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    /// Minor currency units.
    pub price: i64,
    pub inventory: i32,
    pub image_url: Option<String>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        if self.price < 0 {
            return Err(AppError::BadRequest("price must not be negative".into()));
        }
        if self.inventory < 0 {
            return Err(AppError::BadRequest("inventory must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub image_url: Option<String>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        if self.price.is_some_and(|p| p < 0) {
            return Err(AppError::BadRequest("price must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}
