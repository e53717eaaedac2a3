use crate::{
    entities::cart_item::{self, Entity as CartItem},
    entities::order::{Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus},
    entities::payment_session,
    errors::ServiceError,
    events::{Event, EventSender},
    services::cart_snapshot::CartSnapshotService,
    services::orders::{CreateOrderInput, OrderService},
    services::payment_attempt::{GatewayScriptLoader, SubmissionGuard},
    services::payments::PaymentService,
    services::pricing::{self, DeliveryFeeRule},
};
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Result of an online checkout: a durable pending order and the gateway
/// session the widget opens against it.
#[derive(Debug, Clone)]
pub struct OnlineCheckout {
    pub order: OrderModel,
    pub session: payment_session::Model,
    /// True when a duplicate submission collapsed onto an existing order.
    pub reused_order: bool,
}

/// Orchestrates the checkout flow: snapshot → pricing → order write →
/// payment branch → finalize. The order write always completes before any
/// gateway call, and the cart survives until the order reaches a successful
/// terminal state.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    snapshot: Arc<CartSnapshotService>,
    orders: Arc<OrderService>,
    payments: Arc<PaymentService>,
    event_sender: Arc<EventSender>,
    script_loader: Arc<GatewayScriptLoader>,
    submission_guard: SubmissionGuard,
    fee_rule: DeliveryFeeRule,
    idempotency_window_secs: u64,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        snapshot: Arc<CartSnapshotService>,
        orders: Arc<OrderService>,
        payments: Arc<PaymentService>,
        event_sender: Arc<EventSender>,
        script_loader: Arc<GatewayScriptLoader>,
        fee_rule: DeliveryFeeRule,
        idempotency_window_secs: u64,
    ) -> Self {
        Self {
            db,
            snapshot,
            orders,
            payments,
            event_sender,
            script_loader,
            submission_guard: SubmissionGuard::new(),
            fee_rule,
            idempotency_window_secs,
        }
    }

    /// Online checkout. Writes the order (status pending, unpaid), then asks
    /// the gateway for a payment session referencing the order number.
    /// Session failures leave the order pending and retryable.
    #[instrument(skip(self))]
    pub async fn place_online_order(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<OnlineCheckout, ServiceError> {
        let _permit = self.submission_guard.acquire(user_id)?;

        // Never start a checkout the widget cannot complete.
        self.script_loader.ensure_ready().await?;

        let placed = self
            .write_order(user_id, address_id, PaymentMethod::Online)
            .await?;
        let session = self.payments.open_order_session(&placed.order).await?;

        Ok(OnlineCheckout {
            order: placed.order,
            session,
            reused_order: placed.reused,
        })
    }

    /// Cash-on-delivery checkout: same order write with `payment_method =
    /// cod` and payment left pending, then straight to the finalizer. No
    /// gateway involvement, so no dismiss or failure states beyond ordinary
    /// write errors.
    #[instrument(skip(self))]
    pub async fn place_cod_order(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let _permit = self.submission_guard.acquire(user_id)?;

        let placed = self
            .write_order(user_id, address_id, PaymentMethod::Cod)
            .await?;
        self.finalize_order(user_id, placed.order.id).await?;
        Ok(placed.order)
    }

    /// Re-opens a gateway session against an existing pending order, after a
    /// dismissed widget or a gateway-reported failure. The previous session
    /// simply expires on the gateway side.
    #[instrument(skip(self))]
    pub async fn reopen_session(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OnlineCheckout, ServiceError> {
        self.script_loader.ensure_ready().await?;

        let order = self.orders.get_order_for_user(user_id, order_id).await?;
        let session = self.payments.open_order_session(&order).await?;
        Ok(OnlineCheckout {
            order,
            session,
            reused_order: true,
        })
    }

    /// Clears the user's cart once the order is in a successful state (paid,
    /// or COD-accepted). Safe to call more than once: clearing an empty cart
    /// is a no-op. Reached from both the COD path and the payment-success
    /// callback path.
    #[instrument(skip(self))]
    pub async fn finalize_order(&self, user_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        let order = self.orders.get_order_for_user(user_id, order_id).await?;

        let settled = order.payment_status == PaymentStatus::Paid
            || (order.payment_method == PaymentMethod::Cod
                && order.status != OrderStatus::Cancelled);
        if !settled {
            return Err(ServiceError::InvalidOperation(
                "order is not in a successful state".to_string(),
            ));
        }

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        if deleted.rows_affected > 0 {
            info!(rows = deleted.rows_affected, "cart cleared");
            self.event_sender
                .send_or_log(Event::CartCleared { user_id })
                .await;
        }
        Ok(())
    }

    async fn write_order(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
        payment_method: PaymentMethod,
    ) -> Result<crate::services::orders::PlacedOrder, ServiceError> {
        let address = self.snapshot.resolve_address(user_id, address_id).await?;

        let lines = self.snapshot.load_snapshot(user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyOrder);
        }

        let totals = pricing::price_cart(&lines, &self.fee_rule);
        let key = OrderService::idempotency_key(
            user_id,
            &lines,
            payment_method,
            self.idempotency_window_secs,
            Utc::now(),
        );

        self.orders
            .create_order(CreateOrderInput {
                user_id,
                address_id: address.id,
                lines,
                totals,
                payment_method,
                idempotency_key: Some(key),
            })
            .await
    }
}
