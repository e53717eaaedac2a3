use crate::{
    entities::payment_session::{self, Entity as PaymentSessionEntity, SessionStatus},
    entities::prescription::{self, Entity as PrescriptionEntity, PrescriptionStatus},
    entities::prescription_invoice::{
        self, Entity as InvoiceEntity, InvoiceStatus, Model as InvoiceModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{PaymentGateway, SessionRequest},
    services::payments::signature_matches,
    services::pricing,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Callback payload for an invoice payment verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyInvoicePaymentRequest {
    pub invoice_id: Uuid,
    pub payment_id: String,
    pub gateway_order_id: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct InvoiceVerificationOutcome {
    pub verified: bool,
    pub already_paid: bool,
    pub invoice: InvoiceModel,
}

/// Payment flow for pharmacist-issued prescription invoices. Structurally
/// the cart flow with the order replaced by a single invoice amount; it
/// reuses the gateway session and signature contracts.
#[derive(Clone)]
pub struct InvoicePaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    signing_secret: String,
    currency: String,
}

impl InvoicePaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        signing_secret: String,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            signing_secret,
            currency,
        }
    }

    /// Opens a gateway session for an unpaid invoice, with the invoice
    /// number as the receipt reference.
    #[instrument(skip(self))]
    pub async fn open_invoice_session(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<payment_session::Model, ServiceError> {
        let invoice = self.load_invoice_for_user(user_id, invoice_id).await?;

        if invoice.status != InvoiceStatus::Sent {
            return Err(ServiceError::InvalidOperation(
                "invoice is not awaiting payment".to_string(),
            ));
        }

        let amount_minor = pricing::to_minor_units(invoice.total_amount)?;
        let session = self
            .gateway
            .open_session(SessionRequest {
                amount_minor,
                currency: self.currency.clone(),
                receipt: invoice.invoice_number.clone(),
                notes: json!({
                    "invoice_id": invoice.id,
                    "prescription_id": invoice.prescription_id,
                }),
            })
            .await?;

        let record = payment_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_session_id: Set(session.gateway_session_id.clone()),
            order_id: Set(None),
            invoice_id: Set(Some(invoice.id)),
            receipt: Set(invoice.invoice_number.clone()),
            amount_minor: Set(session.amount_minor),
            currency: Set(session.currency.clone()),
            status: Set(SessionStatus::Open),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        counter!("pharmacart_payments.invoice_session_opened", 1);
        info!(gateway_session_id = %record.gateway_session_id, "invoice payment session opened");
        self.event_sender
            .send_or_log(Event::PaymentSessionOpened {
                order_id: None,
                invoice_id: Some(invoice.id),
                gateway_session_id: record.gateway_session_id.clone(),
            })
            .await;

        Ok(record)
    }

    /// Verifies an invoice payment. On success the invoice is marked paid
    /// and the related prescription fulfilled. The two writes are
    /// deliberately sequential: if the prescription update fails, the
    /// payment confirmation stands and the `paid`-but-unfulfilled pair is
    /// left for reconciliation to detect and repair.
    #[instrument(skip(self, request), fields(invoice_id = %request.invoice_id))]
    pub async fn verify_invoice_payment(
        &self,
        user_id: Uuid,
        request: VerifyInvoicePaymentRequest,
    ) -> Result<InvoiceVerificationOutcome, ServiceError> {
        let invoice = self
            .load_invoice_for_user(user_id, request.invoice_id)
            .await?;

        if invoice.status == InvoiceStatus::Paid {
            info!("invoice already paid; verification is a no-op");
            return Ok(InvoiceVerificationOutcome {
                verified: true,
                already_paid: true,
                invoice,
            });
        }

        let session = PaymentSessionEntity::find()
            .filter(payment_session::Column::InvoiceId.eq(invoice.id))
            .filter(payment_session::Column::GatewaySessionId.eq(request.gateway_order_id.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOperation(
                    "no payment session was opened for this invoice".to_string(),
                )
            })?;

        if !signature_matches(
            &self.signing_secret,
            &request.gateway_order_id,
            &request.payment_id,
            &request.signature,
        ) {
            counter!("pharmacart_payments.verification_rejected", 1);
            warn!(payment_id = %request.payment_id, "invoice payment signature mismatch");
            return Ok(InvoiceVerificationOutcome {
                verified: false,
                already_paid: false,
                invoice,
            });
        }

        let txn = self.db.begin().await?;

        let now = Utc::now();
        let mut invoice_update: prescription_invoice::ActiveModel = invoice.clone().into();
        invoice_update.status = Set(InvoiceStatus::Paid);
        invoice_update.paid_at = Set(Some(now));
        let invoice = invoice_update.update(&txn).await?;

        let mut session_update: payment_session::ActiveModel = session.into();
        session_update.status = Set(SessionStatus::Succeeded);
        session_update.update(&txn).await?;

        txn.commit().await?;

        counter!("pharmacart_payments.invoice_verified", 1);
        self.event_sender
            .send_or_log(Event::InvoicePaid(invoice.id))
            .await;

        // Second write, outside the payment transaction. Its failure must
        // not roll back the payment confirmation the user already earned.
        match self.fulfill_prescription(invoice.prescription_id).await {
            Ok(()) => {
                self.event_sender
                    .send_or_log(Event::PrescriptionFulfilled(invoice.prescription_id))
                    .await;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    prescription_id = %invoice.prescription_id,
                    "invoice paid but prescription fulfillment failed; left for reconciliation"
                );
                counter!("pharmacart_payments.fulfillment_deferred", 1);
            }
        }

        info!(payment_id = %request.payment_id, "invoice payment verified");
        Ok(InvoiceVerificationOutcome {
            verified: true,
            already_paid: false,
            invoice,
        })
    }

    async fn fulfill_prescription(&self, prescription_id: Uuid) -> Result<(), ServiceError> {
        let prescription = PrescriptionEntity::find_by_id(prescription_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Prescription {} not found", prescription_id))
            })?;

        if prescription.status == PrescriptionStatus::Fulfilled {
            return Ok(());
        }

        let mut update: prescription::ActiveModel = prescription.into();
        update.status = Set(PrescriptionStatus::Fulfilled);
        update.updated_at = Set(Some(Utc::now()));
        update.update(&*self.db).await?;
        Ok(())
    }

    async fn load_invoice_for_user(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceModel, ServiceError> {
        InvoiceEntity::find_by_id(invoice_id)
            .one(&*self.db)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))
    }
}
