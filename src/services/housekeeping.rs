use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};
use tokio::task::JoinHandle;

use crate::{
    entity::orders::{Column as OrderCol, Entity as Orders, OrderStatus},
    error::{AppError, AppResult},
    state::AppState,
};

/// Cancel pending orders that never got a payment session and are older than
/// `older_than`. Returns how many were cancelled.
pub async fn cancel_orphaned_orders<C: ConnectionTrait>(
    conn: &C,
    older_than: chrono::Duration,
) -> AppResult<u64> {
    let now = Utc::now();
    let cutoff: DateTimeWithTimeZone = now
        .checked_sub_signed(older_than)
        .ok_or_else(|| AppError::BadRequest("sweep age is out of range".into()))?
        .into();

    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Cancelled))
        .col_expr(OrderCol::UpdatedAt, Expr::value(DateTimeWithTimeZone::from(now)))
        .filter(OrderCol::Status.eq(OrderStatus::Pending))
        .filter(OrderCol::PaymentSessionId.is_null())
        .filter(OrderCol::CreatedAt.lte(cutoff))
        .exec(conn)
        .await?;

    if result.rows_affected > 0 {
        tracing::info!(cancelled = result.rows_affected, "cancelled orphaned pending orders");
    }
    Ok(result.rows_affected)
}

/// Run the orphan sweep on a fixed interval for the life of the process.
pub fn spawn_orphan_sweeper(state: AppState) -> JoinHandle<()> {
    let every = Duration::from_secs(state.config.orphan_sweep_interval_secs.max(1));
    let ttl = state
        .config
        .orphan_order_ttl()
        .unwrap_or_else(|| chrono::Duration::minutes(60));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = cancel_orphaned_orders(&state.orm, ttl).await {
                tracing::warn!(error = %err, "orphan sweep failed");
            }
        }
    })
}
