pub mod order_items;
pub mod orders;
pub mod payment_events;
pub mod products;

pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payment_events::Entity as PaymentEvents;
pub use products::Entity as Products;
