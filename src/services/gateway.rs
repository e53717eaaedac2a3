//! Outbound payment gateway client. The gateway owns the card flow; this
//! subsystem only controls the amount in minor units, the receipt string,
//! and the notes payload.

use crate::config::GatewayConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument};
use url::Url;

/// Request to open a payment session with the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    /// Amount in integer minor currency units (paise)
    pub amount_minor: i64,
    pub currency: String,
    /// Receipt reference: the order number or invoice number
    pub receipt: String,
    /// Correlation payload echoed back by the gateway
    pub notes: serde_json::Value,
}

/// A gateway-side session handle for one payment attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySession {
    pub gateway_session_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session for the given amount and receipt. Failures are
    /// retryable: the caller's order stays pending and a new session may be
    /// opened against it.
    async fn open_session(&self, request: SessionRequest) -> Result<GatewaySession, ServiceError>;

    /// Fetches the gateway's client widget script. Used once per process by
    /// the script loader; checkout submission stays disabled until it
    /// succeeds.
    async fn fetch_checkout_script(&self) -> Result<(), ServiceError>;
}

#[derive(Serialize)]
struct OpenSessionBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct OpenSessionResponse {
    id: String,
    amount: i64,
    currency: String,
}

/// HTTP gateway client authenticating with Basic key id / key secret.
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: Url,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| ServiceError::InvalidInput(format!("invalid gateway base url: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::InternalError(format!("gateway url: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount_minor))]
    async fn open_session(&self, request: SessionRequest) -> Result<GatewaySession, ServiceError> {
        let url = self.endpoint("v1/sessions")?;
        let body = OpenSessionBody {
            amount: request.amount_minor,
            currency: &request.currency,
            receipt: &request.receipt,
            notes: &request.notes,
        };

        let response = self
            .http
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gateway session request failed");
                ServiceError::GatewayError(format!("session request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, detail = %detail, "gateway rejected session request");
            return Err(ServiceError::GatewayError(format!(
                "gateway rejected session request ({})",
                status
            )));
        }

        let parsed: OpenSessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("invalid session response: {}", e)))?;

        Ok(GatewaySession {
            gateway_session_id: parsed.id,
            amount_minor: parsed.amount,
            currency: parsed.currency,
        })
    }

    async fn fetch_checkout_script(&self) -> Result<(), ServiceError> {
        let url = self.endpoint("v1/checkout.js")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("script fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayError(format!(
                "script fetch failed ({})",
                response.status()
            )));
        }
        Ok(())
    }
}
