pub mod checkout;
pub mod common;
pub mod orders;
pub mod payments;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        cart_snapshot::CartSnapshotService,
        checkout::CheckoutService,
        gateway::PaymentGateway,
        invoices::InvoicePaymentService,
        orders::OrderService,
        payment_attempt::GatewayScriptLoader,
        payments::PaymentService,
        pricing::DeliveryFeeRule,
        reconciliation::ReconciliationService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer wired once at startup and shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub snapshot: Arc<CartSnapshotService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub invoices: Arc<InvoicePaymentService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        redis: Arc<redis::Client>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let snapshot = Arc::new(CartSnapshotService::new(db.clone()));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway.clone(),
            event_sender.clone(),
            redis,
            config.gateway.key_secret.clone(),
            config.currency.clone(),
        ));
        let invoices = Arc::new(InvoicePaymentService::new(
            db.clone(),
            gateway.clone(),
            event_sender.clone(),
            config.gateway.key_secret.clone(),
            config.currency.clone(),
        ));
        let script_loader = Arc::new(GatewayScriptLoader::new(gateway));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            snapshot.clone(),
            orders.clone(),
            payments.clone(),
            event_sender.clone(),
            script_loader,
            DeliveryFeeRule::from(&config.checkout),
            config.checkout.idempotency_window_secs,
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db,
            event_sender,
            config.reconciliation.clone(),
        ));

        Self {
            snapshot,
            orders,
            payments,
            invoices,
            checkout,
            reconciliation,
        }
    }
}
