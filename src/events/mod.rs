use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Events emitted by the order and payment lifecycle. Consumed by the
/// in-process event loop; the payloads carry ids only, consumers re-read
/// state they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order lifecycle
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Payment lifecycle
    PaymentSessionOpened {
        order_id: Option<Uuid>,
        invoice_id: Option<Uuid>,
        gateway_session_id: String,
    },
    PaymentVerified {
        order_id: Uuid,
        payment_id: String,
    },
    PaymentVerificationRejected {
        order_id: Uuid,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },

    // Finalization
    CartCleared {
        user_id: Uuid,
    },

    // Prescription invoices
    InvoicePaid(Uuid),
    PrescriptionFulfilled(Uuid),

    // Reconciliation
    StaleOrderCancelled(Uuid),
    ReconciliationRepair {
        invoice_id: Uuid,
        prescription_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged, never fatal.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped");
        }
    }
}

/// Drains the event channel. Events are currently consumed as structured
/// logs; outbound webhook delivery hangs off this loop when configured.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PaymentVerified {
                order_id,
                payment_id,
            } => {
                debug!(%order_id, %payment_id, "event: payment verified");
            }
            Event::PaymentVerificationRejected { order_id } => {
                warn!(%order_id, "event: payment verification rejected");
            }
            Event::ReconciliationRepair {
                invoice_id,
                prescription_id,
            } => {
                warn!(%invoice_id, %prescription_id, "event: reconciliation repaired invoice/prescription pair");
            }
            other => debug!(event = ?other, "event"),
        }
    }
    debug!("event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_does_not_fail_on_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic.
        sender.send_or_log(Event::OrderCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender.send(Event::OrderCreated(order_id)).await.unwrap();
        match rx.recv().await.unwrap() {
            Event::OrderCreated(id) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
