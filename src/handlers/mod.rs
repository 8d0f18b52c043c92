pub mod orders;
pub mod products;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    catalog::CatalogService,
    checkout::{CheckoutService, CheckoutSettings},
    orders::OrderService,
    payment_gateway::PaymentGateway,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        checkout_settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                gateway,
                event_sender,
                checkout_settings,
            )),
            orders: Arc::new(OrderService::new(db_pool)),
        }
    }
}
