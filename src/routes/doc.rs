use utoipa::{OpenApi, openapi::OpenApi as OpenApiSpec};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        checkout::{CheckoutLine, CheckoutRequest, CheckoutSession},
        orders::{
            OrderBySession, OrderList, OrderWithItems, SessionInfo, SweepRequest, SweepResult,
            UpdateOrderStatusRequest,
        },
        products::{CreateProductRequest, InventoryAdjustRequest, ProductList, UpdateProductRequest},
        webhooks::WebhookAck,
    },
    entity::orders::OrderStatus,
    models::{Order, OrderItem, Product},
    response::{ApiResponse, Meta},
    routes::{admin, checkout, health, orders, params, products, webhooks},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        products::list_products,
        products::get_product,
        checkout::create_checkout,
        webhooks::stripe_webhook,
        orders::get_order_by_session,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::sweep_orphaned_orders,
        admin::create_product,
        admin::update_product,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            Product,
            Order,
            OrderItem,
            OrderStatus,
            CheckoutLine,
            CheckoutRequest,
            CheckoutSession,
            OrderWithItems,
            OrderList,
            OrderBySession,
            SessionInfo,
            UpdateOrderStatusRequest,
            SweepRequest,
            SweepResult,
            CreateProductRequest,
            UpdateProductRequest,
            InventoryAdjustRequest,
            ProductList,
            WebhookAck,
            health::HealthData,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CheckoutSession>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<OrderBySession>,
            ApiResponse<WebhookAck>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Checkout", description = "Checkout and payment session endpoints"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Orders", description = "Order lookup endpoints"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
