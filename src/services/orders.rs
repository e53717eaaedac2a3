use crate::{
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        OrderStatus, PaymentMethod, PaymentStatus,
    },
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{CartTotals, PricedLine},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Input for the order writer. The caller's authenticated identity is the
/// `user_id`; handlers reject any mismatch before this point.
#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub lines: Vec<PricedLine>,
    pub totals: CartTotals,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<String>,
}

/// Result of the order writer: the durable order plus whether an existing
/// pending order was returned for a duplicate submission.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderModel,
    pub reused: bool,
}

/// Writes order headers and their items, and serves confirmation-view reads.
/// Orders are created `pending`/unpaid; only the payment verifier moves
/// `payment_status` to `paid`.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Generates a human-readable order number: timestamp plus a random
    /// token. The number doubles as the gateway receipt identifier, so it
    /// must stay collision-resistant under concurrent checkouts.
    pub fn generate_order_number() -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|c| (c as char).to_ascii_uppercase())
            .collect();
        format!("PC-{}-{}", Utc::now().format("%y%m%d%H%M%S"), token)
    }

    /// Server-derived idempotency key: a duplicate submission (double-click,
    /// second tab) inside the window hashes to the same key and collapses
    /// onto the existing pending order. The payment method is part of the
    /// key so switching from online to COD after a dismissed widget starts
    /// a fresh order.
    pub fn idempotency_key(
        user_id: Uuid,
        lines: &[PricedLine],
        payment_method: PaymentMethod,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> String {
        let mut sorted: Vec<&PricedLine> = lines.iter().collect();
        sorted.sort_by_key(|l| l.product_id);

        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(payment_method.to_string().as_bytes());
        for line in sorted {
            hasher.update(line.product_id.as_bytes());
            hasher.update(line.quantity.to_le_bytes());
            hasher.update(line.unit_price.to_string().as_bytes());
        }
        let bucket = now.timestamp() / window_secs.max(1) as i64;
        hasher.update(bucket.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Creates the order header and its items in one transaction. A known
    /// idempotency key returns the existing pending order instead of writing
    /// a second header. No cart mutation happens here: clearing is deferred
    /// to the finalizer so a failed payment keeps the user's cart.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, method = %input.payment_method))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<PlacedOrder, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::EmptyOrder);
        }

        let expected_total =
            input.totals.subtotal - input.totals.discount + input.totals.delivery_fee;
        if input.totals.total != expected_total {
            error!(
                total = %input.totals.total,
                expected = %expected_total,
                "order totals violate the pricing invariant"
            );
            return Err(ServiceError::InternalError(
                "order totals are inconsistent".to_string(),
            ));
        }

        if let Some(key) = &input.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                info!(order_id = %existing.id, "duplicate submission; returning existing order");
                return Ok(PlacedOrder {
                    order: existing,
                    reused: true,
                });
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = Self::generate_order_number();

        let txn = self.db.begin().await?;

        let header = OrderActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(input.user_id),
            address_id: Set(input.address_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(input.payment_method),
            subtotal: Set(input.totals.subtotal),
            discount: Set(input.totals.discount),
            delivery_fee: Set(input.totals.delivery_fee),
            total: Set(input.totals.total),
            idempotency_key: Set(input.idempotency_key.clone()),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let insert_result = header.insert(&txn).await;
        let order = match insert_result {
            Ok(order) => order,
            Err(e) => {
                // The unique index on idempotency_key backstops the
                // read-then-insert race: the loser resolves to the winner's
                // order instead of failing the checkout.
                drop(txn);
                if let Some(key) = &input.idempotency_key {
                    if let Some(existing) = self.find_by_idempotency_key(key).await? {
                        warn!(order_id = %existing.id, "concurrent duplicate submission collapsed");
                        return Ok(PlacedOrder {
                            order: existing,
                            reused: true,
                        });
                    }
                }
                error!(error = %e, "failed to create order header");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        for line in &input.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_mrp),
                total_price: Set(line.line_total()),
                discount: Set(line.line_discount()),
                created_at: Set(now),
            };
            item.insert(&txn).await.map_err(|e| {
                error!(error = %e, %order_id, "failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await?;

        counter!("pharmacart_orders.created", 1);
        info!(%order_id, %order_number, "order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        Ok(PlacedOrder {
            order,
            reused: false,
        })
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::IdempotencyKey.eq(key))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find_by_id(order_id).one(&*self.db).await?)
    }

    /// Loads an order owned by the given user; anyone else sees `NotFound`.
    #[instrument(skip(self))]
    pub async fn get_order_for_user(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = self
            .get_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    /// Lists the user's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }
}
