//! In-process bridge to the gateway's checkout widget.
//!
//! The gateway communicates through fire-once callbacks (success, failure,
//! dismiss). Each opened session gets a [`PaymentAttempt`] carrying a
//! single-shot result channel: exactly one outcome fires per session, a
//! second callback is rejected, and dismissing the widget is cooperative
//! cancellation that leaves the order pending.

use crate::errors::ServiceError;
use crate::services::gateway::PaymentGateway;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use uuid::Uuid;

/// The one outcome of an opened payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Gateway invoked the success callback with the verification payload.
    Succeeded {
        payment_id: String,
        gateway_order_id: String,
        signature: String,
    },
    /// User closed the widget without paying. Not an error: the submit
    /// control is re-enabled and the order stays pending.
    Dismissed,
    /// Gateway reported a payment failure with a reason.
    Failed { reason: String },
}

/// One payment attempt per opened gateway session.
pub struct PaymentAttempt {
    gateway_session_id: String,
    slot: Mutex<Option<oneshot::Sender<PaymentOutcome>>>,
}

impl PaymentAttempt {
    /// Opens an attempt for a session, returning the attempt handle and the
    /// receiver that resolves with its single outcome.
    pub fn open(gateway_session_id: String) -> (Arc<Self>, oneshot::Receiver<PaymentOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                gateway_session_id,
                slot: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    pub fn gateway_session_id(&self) -> &str {
        &self.gateway_session_id
    }

    /// Delivers the session outcome. Exactly one completion is accepted; any
    /// further callback for the same session is rejected.
    pub fn complete(&self, outcome: PaymentOutcome) -> Result<(), ServiceError> {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.take() {
            Some(tx) => {
                // The receiver may already be gone (caller gave up waiting);
                // the attempt is still considered completed.
                let _ = tx.send(outcome);
                Ok(())
            }
            None => Err(ServiceError::AttemptAlreadyCompleted),
        }
    }

    /// Cooperative cancellation: the user closed the widget.
    pub fn dismiss(&self) -> Result<(), ServiceError> {
        self.complete(PaymentOutcome::Dismissed)
    }

    pub fn is_completed(&self) -> bool {
        let slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.is_none()
    }
}

/// Lazily-initialized loader for the gateway's client script.
///
/// All checkout flows await [`ensure_ready`](Self::ensure_ready); the fetch
/// runs once per process. A failed fetch leaves the loader unready so a later
/// checkout retries it, and submission stays disabled until it succeeds.
pub struct GatewayScriptLoader {
    gateway: Arc<dyn PaymentGateway>,
    ready: tokio::sync::OnceCell<()>,
}

impl GatewayScriptLoader {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            ready: tokio::sync::OnceCell::new(),
        }
    }

    pub async fn ensure_ready(&self) -> Result<(), ServiceError> {
        self.ready
            .get_or_try_init(|| async { self.gateway.fetch_checkout_script().await })
            .await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }
}

/// Server-side rendition of disable-on-submit: at most one checkout in
/// flight per user. The permit releases on drop.
#[derive(Clone, Default)]
pub struct SubmissionGuard {
    in_flight: Arc<DashMap<Uuid, ()>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, user_id: Uuid) -> Result<SubmissionPermit, ServiceError> {
        match self.in_flight.entry(user_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServiceError::CheckoutInProgress),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                Ok(SubmissionPermit {
                    in_flight: self.in_flight.clone(),
                    user_id,
                })
            }
        }
    }
}

#[derive(Debug)]
pub struct SubmissionPermit {
    in_flight: Arc<DashMap<Uuid, ()>>,
    user_id: Uuid,
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.in_flight.remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{GatewaySession, SessionRequest};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyGateway {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl PaymentGateway for FlakyGateway {
        async fn open_session(
            &self,
            request: SessionRequest,
        ) -> Result<GatewaySession, ServiceError> {
            Ok(GatewaySession {
                gateway_session_id: "sess_test".to_string(),
                amount_minor: request.amount_minor,
                currency: request.currency,
            })
        }

        async fn fetch_checkout_script(&self) -> Result<(), ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ServiceError::GatewayError("script unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn attempt_fires_exactly_once() {
        let (attempt, rx) = PaymentAttempt::open("sess_1".to_string());

        attempt
            .complete(PaymentOutcome::Succeeded {
                payment_id: "pay_1".into(),
                gateway_order_id: "sess_1".into(),
                signature: "sig".into(),
            })
            .unwrap();

        // The duplicate callback is rejected, not delivered.
        assert_matches!(
            attempt.complete(PaymentOutcome::Dismissed),
            Err(ServiceError::AttemptAlreadyCompleted)
        );

        let outcome = rx.await.unwrap();
        assert_matches!(outcome, PaymentOutcome::Succeeded { payment_id, .. } if payment_id == "pay_1");
    }

    #[tokio::test]
    async fn dismiss_is_a_normal_outcome() {
        let (attempt, rx) = PaymentAttempt::open("sess_2".to_string());
        attempt.dismiss().unwrap();
        assert!(attempt.is_completed());
        assert_eq!(rx.await.unwrap(), PaymentOutcome::Dismissed);
    }

    #[tokio::test]
    async fn completing_after_receiver_dropped_still_consumes_the_attempt() {
        let (attempt, rx) = PaymentAttempt::open("sess_3".to_string());
        drop(rx);
        attempt
            .complete(PaymentOutcome::Failed {
                reason: "card declined".into(),
            })
            .unwrap();
        assert_matches!(
            attempt.dismiss(),
            Err(ServiceError::AttemptAlreadyCompleted)
        );
    }

    #[tokio::test]
    async fn script_loader_retries_after_failure_and_then_sticks() {
        let gateway = Arc::new(FlakyGateway {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let loader = GatewayScriptLoader::new(gateway.clone());

        assert!(loader.ensure_ready().await.is_err());
        assert!(!loader.is_ready());

        assert!(loader.ensure_ready().await.is_ok());
        assert!(loader.is_ready());

        // Ready state is cached; no further fetches.
        assert!(loader.ensure_ready().await.is_ok());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn submission_guard_blocks_concurrent_checkout() {
        let guard = SubmissionGuard::new();
        let user = Uuid::new_v4();

        let permit = guard.acquire(user).unwrap();
        assert_matches!(
            guard.acquire(user),
            Err(ServiceError::CheckoutInProgress)
        );

        // Another user is unaffected.
        let other = guard.acquire(Uuid::new_v4());
        assert!(other.is_ok());

        drop(permit);
        assert!(guard.acquire(user).is_ok());
    }
}
