//! Out-of-band reconciliation. The checkout flow never cleans up after an
//! abandoned tab, and invoice payment deliberately tolerates a failed
//! prescription update; this sweep resolves both.

use crate::{
    config::ReconciliationConfig,
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus},
    entities::prescription::{self, Entity as PrescriptionEntity, PrescriptionStatus},
    entities::prescription_invoice::{self, Entity as InvoiceEntity, InvoiceStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: ReconciliationConfig,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Spawns the periodic sweep. Errors are logged and the loop continues;
    /// a broken sweep must never take the API down with it.
    pub fn start_worker(service: Arc<Self>) {
        if !service.config.enabled {
            info!("reconciliation worker disabled by configuration");
            return;
        }
        let interval = std::time::Duration::from_secs(service.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                if let Err(e) = service.run_once(Utc::now()).await {
                    error!(error = %e, "reconciliation sweep failed");
                }
                sleep(interval).await;
            }
        });
    }

    /// One full pass: stale-order cancellation, then invoice repair.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let cancelled = self.sweep_stale_orders(now).await?;
        let repaired = self.repair_unfulfilled_invoices().await?;
        if cancelled > 0 || repaired > 0 {
            info!(cancelled, repaired, "reconciliation sweep finished");
        }
        Ok(())
    }

    /// Cancels online orders stuck in `pending`/unpaid past the age
    /// threshold: the order was written, but no payment ever completed and
    /// the user walked away. COD orders keep `payment_status = pending` by
    /// design and are never swept.
    #[instrument(skip(self))]
    pub async fn sweep_stale_orders(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - Duration::hours(self.config.stale_order_max_age_hours.max(1));

        let stale = OrderEntity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::PaymentMethod.eq(PaymentMethod::Online))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0u64;
        for order in stale {
            if !order.status.can_transition_to(OrderStatus::Cancelled) {
                continue;
            }
            let order_id = order.id;
            let mut update: order::ActiveModel = order.into();
            update.status = Set(OrderStatus::Cancelled);
            update.payment_status = Set(PaymentStatus::Failed);
            update.notes = Set(Some("auto-cancelled: abandoned checkout".to_string()));
            update.updated_at = Set(Some(now));
            update.update(&*self.db).await?;

            counter!("pharmacart_reconciliation.stale_order_cancelled", 1);
            warn!(%order_id, "stale pending order cancelled");
            self.event_sender
                .send_or_log(Event::StaleOrderCancelled(order_id))
                .await;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    /// Finds invoices marked `paid` whose prescription never reached
    /// `fulfilled` (the partial-failure window of invoice verification) and
    /// promotes the prescription.
    #[instrument(skip(self))]
    pub async fn repair_unfulfilled_invoices(&self) -> Result<u64, ServiceError> {
        let paid_invoices = InvoiceEntity::find()
            .filter(prescription_invoice::Column::Status.eq(InvoiceStatus::Paid))
            .all(&*self.db)
            .await?;

        let mut repaired = 0u64;
        for invoice in paid_invoices {
            let Some(prescription) = PrescriptionEntity::find_by_id(invoice.prescription_id)
                .one(&*self.db)
                .await?
            else {
                warn!(
                    invoice_id = %invoice.id,
                    prescription_id = %invoice.prescription_id,
                    "paid invoice references a missing prescription"
                );
                continue;
            };

            if prescription.status == PrescriptionStatus::Fulfilled {
                continue;
            }

            let prescription_id = prescription.id;
            let mut update: prescription::ActiveModel = prescription.into();
            update.status = Set(PrescriptionStatus::Fulfilled);
            update.updated_at = Set(Some(Utc::now()));
            update.update(&*self.db).await?;

            counter!("pharmacart_reconciliation.invoice_repaired", 1);
            self.event_sender
                .send_or_log(Event::ReconciliationRepair {
                    invoice_id: invoice.id,
                    prescription_id,
                })
                .await;
            repaired += 1;
        }
        Ok(repaired)
    }
}
