use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus, PaymentMethod},
    entities::payment_session::{self, Entity as PaymentSessionEntity, SessionStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{PaymentGateway, SessionRequest},
    services::pricing,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Callback payload forwarded from the gateway widget for verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    pub payment_id: String,
    pub gateway_order_id: String,
    pub signature: String,
}

/// Verification result. `already_paid` marks the idempotent replay path:
/// the order was paid before this call and no side effects were re-applied.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub already_paid: bool,
    pub order: OrderModel,
}

/// Opens gateway payment sessions for orders and verifies the asynchronous
/// results. This service is the only code allowed to move an order to
/// `payment_status = paid`.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    redis: Arc<redis::Client>,
    /// HMAC signing secret shared with the gateway. Never serialized and
    /// never sent to a client.
    signing_secret: String,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        redis: Arc<redis::Client>,
        signing_secret: String,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            redis,
            signing_secret,
            currency,
        }
    }

    /// Opens a gateway session for a pending online order. The stored total
    /// is revalidated against a recomputation before any money-facing call:
    /// a drift between the two is a bug, not a retryable condition.
    #[instrument(skip(self, order), fields(order_id = %order.id, order_number = %order.order_number))]
    pub async fn open_order_session(
        &self,
        order: &OrderModel,
    ) -> Result<payment_session::Model, ServiceError> {
        if order.payment_method != PaymentMethod::Online {
            return Err(ServiceError::InvalidOperation(
                "order is not an online-payment order".to_string(),
            ));
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "order is no longer awaiting payment".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "order is {}, not pending",
                order.status
            )));
        }

        let amount_minor = pricing::to_minor_units(order.total)?;
        let recomputed =
            pricing::to_minor_units(order.subtotal - order.discount + order.delivery_fee)?;
        if amount_minor != recomputed {
            return Err(ServiceError::InternalError(format!(
                "order {} total drifted from its components ({} vs {})",
                order.id, amount_minor, recomputed
            )));
        }

        let session = self
            .gateway
            .open_session(SessionRequest {
                amount_minor,
                currency: self.currency.clone(),
                receipt: order.order_number.clone(),
                notes: json!({ "order_id": order.id }),
            })
            .await?;

        let record = payment_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_session_id: Set(session.gateway_session_id.clone()),
            order_id: Set(Some(order.id)),
            invoice_id: Set(None),
            receipt: Set(order.order_number.clone()),
            amount_minor: Set(session.amount_minor),
            currency: Set(session.currency.clone()),
            status: Set(SessionStatus::Open),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        counter!("pharmacart_payments.session_opened", 1);
        info!(gateway_session_id = %record.gateway_session_id, "payment session opened");
        self.event_sender
            .send_or_log(Event::PaymentSessionOpened {
                order_id: Some(order.id),
                invoice_id: None,
                gateway_session_id: record.gateway_session_id.clone(),
            })
            .await;

        Ok(record)
    }

    /// Verifies a gateway success callback and, on a valid signature, marks
    /// the order paid. Idempotent: verifying an already-paid order is a
    /// no-op success, covering duplicate callback delivery and mid-flow
    /// refreshes. An invalid signature leaves the order untouched.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn verify_payment(
        &self,
        user_id: Uuid,
        request: VerifyPaymentRequest,
    ) -> Result<VerificationOutcome, ServiceError> {
        let order = OrderEntity::find_by_id(request.order_id)
            .one(&*self.db)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        if order.payment_status == PaymentStatus::Paid {
            info!("order already paid; verification is a no-op");
            return Ok(VerificationOutcome {
                verified: true,
                already_paid: true,
                order,
            });
        }

        // Ordering guarantee: a verification with no recorded session for
        // this order means the flow is being driven out of order (or forged).
        let session = PaymentSessionEntity::find()
            .filter(payment_session::Column::OrderId.eq(order.id))
            .filter(payment_session::Column::GatewaySessionId.eq(request.gateway_order_id.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOperation(
                    "no payment session was opened for this order".to_string(),
                )
            })?;

        self.note_replay(&request.payment_id).await;

        if !signature_matches(
            &self.signing_secret,
            &request.gateway_order_id,
            &request.payment_id,
            &request.signature,
        ) {
            counter!("pharmacart_payments.verification_rejected", 1);
            warn!(payment_id = %request.payment_id, "payment signature mismatch");
            self.event_sender
                .send_or_log(Event::PaymentVerificationRejected { order_id: order.id })
                .await;
            return Ok(VerificationOutcome {
                verified: false,
                already_paid: false,
                order,
            });
        }

        // A late callback for a swept (cancelled, payment failed) order
        // cannot resurrect it; the charge becomes a support case.
        if !order.payment_status.can_transition_to(PaymentStatus::Paid) {
            return Err(ServiceError::InvalidOperation(
                "order can no longer be marked paid".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let old_status = order.status;
        let mut order_update: order::ActiveModel = order.clone().into();
        order_update.payment_status = Set(PaymentStatus::Paid);
        if old_status.can_transition_to(OrderStatus::Processing) {
            order_update.status = Set(OrderStatus::Processing);
        }
        order_update.updated_at = Set(Some(Utc::now()));
        let order = order_update.update(&txn).await?;

        let mut session_update: payment_session::ActiveModel = session.into();
        session_update.status = Set(SessionStatus::Succeeded);
        session_update.update(&txn).await?;

        txn.commit().await?;

        counter!("pharmacart_payments.verified", 1);
        info!(payment_id = %request.payment_id, "payment verified; order marked paid");
        self.event_sender
            .send_or_log(Event::PaymentVerified {
                order_id: order.id,
                payment_id: request.payment_id.clone(),
            })
            .await;
        if old_status != order.status {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id: order.id,
                    old_status: old_status.to_string(),
                    new_status: order.status.to_string(),
                })
                .await;
        }

        Ok(VerificationOutcome {
            verified: true,
            already_paid: false,
            order,
        })
    }

    /// Records a gateway-reported payment failure. The order stays unpaid
    /// and retryable; only the session is closed out.
    #[instrument(skip(self))]
    pub async fn record_gateway_failure(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        gateway_session_id: &str,
        reason: String,
    ) -> Result<(), ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let session = PaymentSessionEntity::find()
            .filter(payment_session::Column::OrderId.eq(order.id))
            .filter(payment_session::Column::GatewaySessionId.eq(gateway_session_id))
            .filter(payment_session::Column::Status.eq(SessionStatus::Open))
            .one(&*self.db)
            .await?;

        if let Some(session) = session {
            let mut update: payment_session::ActiveModel = session.into();
            update.status = Set(SessionStatus::Failed);
            update.update(&*self.db).await?;
        }

        counter!("pharmacart_payments.gateway_failure", 1);
        warn!(%order_id, reason = %reason, "gateway reported payment failure");
        self.event_sender
            .send_or_log(Event::PaymentFailed {
                order_id: order.id,
                reason,
            })
            .await;
        Ok(())
    }

    /// Best-effort duplicate-callback marker backed by redis. Absence of
    /// redis degrades to the database-state idempotency check.
    async fn note_replay(&self, payment_id: &str) {
        let key = format!("verify:{}", payment_id);
        if let Ok(mut conn) = self.redis.get_async_connection().await {
            let fresh: Result<bool, _> = redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(24 * 3600)
                .query_async(&mut conn)
                .await;
            if let Ok(false) = fresh {
                info!(payment_id = %payment_id, "duplicate verification callback observed");
            }
        }
    }
}

/// Computes the callback signature the gateway sends with a successful
/// payment: hex-encoded HMAC-SHA256 over `"{gateway_order_id}|{payment_id}"`.
pub fn compute_signature(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub(crate) fn signature_matches(
    secret: &str,
    gateway_order_id: &str,
    payment_id: &str,
    provided: &str,
) -> bool {
    let expected = compute_signature(secret, gateway_order_id, payment_id);
    constant_time_eq(&expected, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let sig = compute_signature("secret", "sess_9", "pay_42");
        assert!(signature_matches("secret", "sess_9", "pay_42", &sig));
    }

    #[test]
    fn signature_is_hex_sha256_sized() {
        let sig = compute_signature("secret", "sess_9", "pay_42");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tampered_fields_break_the_signature() {
        let sig = compute_signature("secret", "sess_9", "pay_42");
        assert!(!signature_matches("secret", "sess_9", "pay_43", &sig));
        assert!(!signature_matches("secret", "sess_8", "pay_42", &sig));
        assert!(!signature_matches("other", "sess_9", "pay_42", &sig));
    }

    #[test]
    fn delimiter_prevents_field_smearing() {
        // ("ab", "c") and ("a", "bc") must not collide.
        let a = compute_signature("secret", "ab", "c");
        let b = compute_signature("secret", "a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_requires_equal_length() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
    }
}
