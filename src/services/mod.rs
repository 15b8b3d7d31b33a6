pub mod admin_service;
pub mod checkout_service;
pub mod fulfillment_service;
pub mod housekeeping;
pub mod order_service;
pub mod product_service;
