use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    payments::PaymentGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    /// `None` when no payment provider credentials are configured.
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        orm: OrmConn,
        gateway: Option<Arc<dyn PaymentGateway>>,
        config: AppConfig,
    ) -> Self {
        Self {
            pool,
            orm,
            gateway,
            config: Arc::new(config),
        }
    }
}
