use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional guidance for the caller, when there is any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Cart is empty")]
    EmptyOrder,

    #[error("A checkout is already in progress for this user")]
    CheckoutInProgress,

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Payment verification failed")]
    VerificationFailed,

    #[error("Payment attempt already completed")]
    AttemptAlreadyCompleted,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

impl ServiceError {
    /// Session-open failures are safe to retry against the same order.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::GatewayError(_) | ServiceError::DatabaseError(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_)
            | ServiceError::InvalidInput(_)
            | ServiceError::EmptyOrder
            | ServiceError::VerificationFailed => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::CheckoutInProgress | ServiceError::AttemptAlreadyCompleted => {
                StatusCode::CONFLICT
            }
            ServiceError::GatewayError(_) => StatusCode::BAD_GATEWAY,
            ServiceError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ServiceError::VerificationFailed => Some(
                "Do not retry the payment. Contact support with your order number so the charge can be reconciled."
                    .to_string(),
            ),
            ServiceError::GatewayError(_) => {
                Some("The order is still pending; retrying the payment is safe.".to_string())
            }
            ServiceError::CheckoutInProgress => {
                Some("Wait for the in-flight checkout to finish before submitting again.".to_string())
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs, not in the response body.
        let message = match &self {
            ServiceError::DatabaseError(e) => {
                tracing::error!(error = %e, "database error surfaced to handler");
                "An internal error occurred".to_string()
            }
            ServiceError::InternalError(e) => {
                tracing::error!(error = %e, "internal error surfaced to handler");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message,
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn gateway_errors_are_retryable() {
        assert!(ServiceError::GatewayError("timeout".into()).is_retryable());
        assert!(!ServiceError::VerificationFailed.is_retryable());
        assert!(!ServiceError::EmptyOrder.is_retryable());
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ServiceError::EmptyOrder.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::CheckoutInProgress.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::GatewayError("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::PaymentFailed("declined".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn verification_failure_advises_support_contact() {
        let details = ServiceError::VerificationFailed.details().unwrap();
        assert!(details.contains("Contact support"));
        assert_matches!(ServiceError::NotFound("x".into()).details(), None);
    }
}
