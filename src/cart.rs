//! Shopper cart aggregate.
//!
//! A cart is never persisted. Shoppers hold one on the client and submit its
//! lines at checkout; the server rebuilds it from authoritative product rows
//! to price the order.

use crate::{
    error::{AppError, AppResult},
    models::Product,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: i32,
}

impl CartLine {
    /// `None` when price times quantity does not fit in i64.
    pub fn subtotal(&self) -> Option<i64> {
        self.product.price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of a product, merging with an existing line for the same id.
    pub fn add(&mut self, product: Product, quantity: i32) {
        if quantity <= 0 {
            return;
        }
        match self.lines.iter_mut().find(|l| l.product.id == product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine { product, quantity }),
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Order total in minor units. Rejects carts whose total overflows.
    pub fn total(&self) -> AppResult<i64> {
        self.lines
            .iter()
            .try_fold(0i64, |acc, line| line.subtotal().and_then(|s| acc.checked_add(s)))
            .ok_or_else(|| AppError::BadRequest("order total is too large".into()))
    }

    /// Fail on the first line asking for more units than the product holds.
    pub fn ensure_in_stock(&self) -> AppResult<()> {
        match self
            .lines
            .iter()
            .find(|l| l.product.inventory < l.quantity)
        {
            Some(line) => Err(AppError::InsufficientInventory {
                product_id: line.product.id,
                name: line.product.name.clone(),
                requested: line.quantity,
                available: line.product.inventory,
            }),
            None => Ok(()),
        }
    }
}
