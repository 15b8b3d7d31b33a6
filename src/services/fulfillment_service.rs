use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders, OrderStatus},
        payment_events::{ActiveModel as PaymentEventActive, Entity as PaymentEvents},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::AppResult,
    payments::{CompletedSession, GatewayEvent},
    state::AppState,
};

/// What a delivered gateway event amounted to. Every variant is acknowledged
/// to the gateway; only `Fulfilled` mutates anything.
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    Fulfilled {
        order_id: Uuid,
        /// Products whose stock ran out before this order could be fully served.
        oversold: Vec<Uuid>,
    },
    Duplicate {
        order_id: Option<Uuid>,
    },
    OrderNotFound,
    NotPayable {
        order_id: Uuid,
        status: OrderStatus,
    },
    Ignored {
        event_type: String,
    },
}

impl FulfillmentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FulfillmentOutcome::Fulfilled { .. } => "fulfilled",
            FulfillmentOutcome::Duplicate { .. } => "duplicate",
            FulfillmentOutcome::OrderNotFound => "order_not_found",
            FulfillmentOutcome::NotPayable { .. } => "not_payable",
            FulfillmentOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Apply a verified gateway event.
#[tracing::instrument(skip_all, fields(event_id = %event.event_id(), event_type = %event.event_type()))]
pub async fn handle_event(state: &AppState, event: GatewayEvent) -> AppResult<FulfillmentOutcome> {
    let (event_id, session) = match event {
        GatewayEvent::CheckoutCompleted { event_id, session } => (event_id, session),
        GatewayEvent::Other { event_type, .. } => {
            tracing::debug!("ignoring gateway event");
            return Ok(FulfillmentOutcome::Ignored { event_type });
        }
    };

    if PaymentEvents::find_by_id(event_id.clone())
        .one(&state.orm)
        .await?
        .is_some()
    {
        tracing::info!("event already processed");
        return Ok(FulfillmentOutcome::Duplicate { order_id: None });
    }

    let Some(order_id) = resolve_order_id(state, &session).await? else {
        tracing::warn!(session_id = %session.session_id, "completion signal for unknown order");
        return Ok(FulfillmentOutcome::OrderNotFound);
    };

    let outcome = mark_paid(state, &event_id, order_id, session.payment_reference.as_deref()).await?;

    match &outcome {
        FulfillmentOutcome::Fulfilled { order_id, oversold } => {
            tracing::info!(order_id = %order_id, oversold = oversold.len(), "order paid");
            audit::record(
                &state.pool,
                "payment_gateway",
                "order_paid",
                "orders",
                serde_json::json!({
                    "order_id": order_id,
                    "event_id": event_id,
                    "payment_reference": session.payment_reference,
                    "oversold": oversold,
                }),
            )
            .await;
        }
        FulfillmentOutcome::Duplicate { order_id } => {
            tracing::info!(order_id = ?order_id, "duplicate completion signal");
        }
        FulfillmentOutcome::OrderNotFound => {
            tracing::warn!(order_id = %order_id, "completion signal for unknown order");
        }
        FulfillmentOutcome::NotPayable { order_id, status } => {
            tracing::error!(
                order_id = %order_id,
                status = %status,
                "payment captured for an order that cannot be paid, needs manual reconciliation"
            );
        }
        FulfillmentOutcome::Ignored { .. } => {}
    }

    Ok(outcome)
}

async fn resolve_order_id(state: &AppState, session: &CompletedSession) -> AppResult<Option<Uuid>> {
    if let Some(raw) = session.order_id.as_deref() {
        return match Uuid::parse_str(raw) {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                tracing::warn!(order_id = raw, "completion signal carries an invalid order id");
                Ok(None)
            }
        };
    }
    let order = Orders::find()
        .filter(OrderCol::PaymentSessionId.eq(session.session_id.clone()))
        .one(&state.orm)
        .await?;
    Ok(order.map(|o| o.id))
}

/// Pending -> Paid plus the inventory decrement, as one transaction.
///
/// The status update is conditional on the row still being pending, so of two
/// concurrent deliveries only one sees a row affected; the other reports a
/// duplicate and touches nothing.
pub async fn mark_paid(
    state: &AppState,
    event_id: &str,
    order_id: Uuid,
    payment_reference: Option<&str>,
) -> AppResult<FulfillmentOutcome> {
    let txn = state.orm.begin().await?;

    let Some(order) = Orders::find_by_id(order_id).one(&txn).await? else {
        return Ok(FulfillmentOutcome::OrderNotFound);
    };
    if order.status.is_paid_or_beyond() {
        return Ok(FulfillmentOutcome::Duplicate {
            order_id: Some(order_id),
        });
    }
    if order.status != OrderStatus::Pending {
        return Ok(FulfillmentOutcome::NotPayable {
            order_id,
            status: order.status,
        });
    }

    let now: DateTimeWithTimeZone = Utc::now().into();
    let updated = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Paid))
        .col_expr(
            OrderCol::PaymentTransactionId,
            Expr::value(payment_reference.map(str::to_owned)),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(now))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        return Ok(FulfillmentOutcome::Duplicate {
            order_id: Some(order_id),
        });
    }

    let oversold = decrement_inventory(&txn, order_id).await?;

    PaymentEventActive {
        id: Set(event_id.to_string()),
        event_type: Set(crate::payments::CHECKOUT_COMPLETED.to_string()),
        order_id: Set(Some(order_id)),
        received_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    Ok(FulfillmentOutcome::Fulfilled { order_id, oversold })
}

async fn decrement_inventory(txn: &DatabaseTransaction, order_id: Uuid) -> AppResult<Vec<Uuid>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(txn)
        .await?;

    let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in &items {
        *wanted.entry(item.product_id).or_insert(0) += item.quantity;
    }

    // Lock in id order so concurrent fulfillments cannot deadlock.
    let products = Products::find()
        .filter(ProdCol::Id.is_in(wanted.keys().copied().collect::<Vec<_>>()))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(txn)
        .await?;

    let now: DateTimeWithTimeZone = Utc::now().into();
    let mut oversold = Vec::new();
    for product in products {
        let quantity = wanted.get(&product.id).copied().unwrap_or(0);
        let (remaining, short) = apply_decrement(product.inventory, quantity);
        if short {
            tracing::warn!(
                order_id = %order_id,
                product_id = %product.id,
                inventory = product.inventory,
                quantity,
                "oversell: inventory clamped at zero"
            );
            oversold.push(product.id);
        }

        let mut active: ProductActive = product.into();
        active.inventory = Set(remaining);
        active.updated_at = Set(now);
        active.update(txn).await?;
    }

    Ok(oversold)
}

/// New inventory after taking `quantity` units, floored at zero, and whether
/// the floor was hit.
pub fn apply_decrement(inventory: i32, quantity: i32) -> (i32, bool) {
    let remaining = inventory.saturating_sub(quantity);
    if remaining < 0 {
        (0, true)
    } else {
        (remaining, false)
    }
}
