use crate::auth::{consts as perm, AuthenticatedUser};
use crate::errors::ServiceError;
use crate::handlers::checkout::PaymentSessionResponse;
use crate::services::invoices::VerifyInvoicePaymentRequest;
use crate::services::payments::VerifyPaymentRequest;
use crate::{ApiResponse, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Success-callback payload from the payment widget.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentBody {
    pub order_id: Uuid,
    #[validate(length(min = 1))]
    pub payment_id: String,
    #[validate(length(min = 1))]
    pub gateway_order_id: String,
    #[validate(length(min = 1))]
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationResponse {
    pub verified: bool,
    pub order_id: Uuid,
    pub payment_status: String,
    /// True when the order was already paid and no writes were re-applied
    pub already_paid: bool,
}

/// Widget failure report from the storefront. The order stays unpaid; only
/// the session is closed out so a retry opens a fresh one.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PaymentFailureBody {
    pub order_id: Uuid,
    #[validate(length(min = 1))]
    pub gateway_session_id: String,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyInvoicePaymentBody {
    pub invoice_id: Uuid,
    #[validate(length(min = 1))]
    pub payment_id: String,
    #[validate(length(min = 1))]
    pub gateway_order_id: String,
    #[validate(length(min = 1))]
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceVerificationResponse {
    pub verified: bool,
    pub invoice_id: Uuid,
    pub status: String,
    pub already_paid: bool,
}

/// Verify a payment callback and mark the order paid
///
/// The sole endpoint allowed to move an order to `payment_status = paid`.
/// Idempotent for already-paid orders. An invalid signature is answered
/// with a contact-support error, never a retry hint.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentBody,
    responses(
        (status = 200, description = "Payment verified; order paid and cart cleared", body = ApiResponse<VerificationResponse>),
        (status = 400, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "No session was opened for this order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<VerifyPaymentBody>,
) -> Result<Json<ApiResponse<VerificationResponse>>, ServiceError> {
    if !user.has_permission(perm::PAYMENTS_VERIFY) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }
    body.validate()?;

    let outcome = state
        .services
        .payments
        .verify_payment(
            user.user_id,
            VerifyPaymentRequest {
                order_id: body.order_id,
                payment_id: body.payment_id,
                gateway_order_id: body.gateway_order_id,
                signature: body.signature,
            },
        )
        .await?;

    if !outcome.verified {
        return Err(ServiceError::VerificationFailed);
    }

    // Finalize only on the first successful verification; a replayed
    // callback must not clear a cart the user has since refilled.
    if !outcome.already_paid {
        state
            .services
            .checkout
            .finalize_order(user.user_id, outcome.order.id)
            .await?;
    }

    Ok(Json(ApiResponse::success(VerificationResponse {
        verified: true,
        order_id: outcome.order.id,
        payment_status: outcome.order.payment_status.to_string(),
        already_paid: outcome.already_paid,
    })))
}

/// Report a gateway-declared payment failure
#[utoipa::path(
    post,
    path = "/api/v1/payments/failure",
    request_body = PaymentFailureBody,
    responses(
        (status = 200, description = "Failure recorded; order remains pending and retryable"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn report_payment_failure(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PaymentFailureBody>,
) -> Result<StatusCode, ServiceError> {
    body.validate()?;

    state
        .services
        .payments
        .record_gateway_failure(
            user.user_id,
            body.order_id,
            &body.gateway_session_id,
            body.reason,
        )
        .await?;

    Ok(StatusCode::OK)
}

/// Open a payment session for a prescription invoice
#[utoipa::path(
    post,
    path = "/api/v1/payments/invoices/{id}/session",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 201, description = "Payment session for the invoice", body = ApiResponse<PaymentSessionResponse>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Invoice is not awaiting payment", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn open_invoice_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<(StatusCode, Json<ApiResponse<PaymentSessionResponse>>), ServiceError> {
    let session = state
        .services
        .invoices
        .open_invoice_session(user.user_id, id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(session.into())),
    ))
}

/// Verify an invoice payment callback
///
/// Marks the invoice paid and the related prescription fulfilled. A failed
/// prescription update does not fail the payment confirmation; the pair is
/// repaired by reconciliation.
#[utoipa::path(
    post,
    path = "/api/v1/payments/invoices/verify",
    request_body = VerifyInvoicePaymentBody,
    responses(
        (status = 200, description = "Invoice payment verified", body = ApiResponse<InvoiceVerificationResponse>),
        (status = 400, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_invoice_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<VerifyInvoicePaymentBody>,
) -> Result<Json<ApiResponse<InvoiceVerificationResponse>>, ServiceError> {
    if !user.has_permission(perm::PAYMENTS_VERIFY) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }
    body.validate()?;

    let outcome = state
        .services
        .invoices
        .verify_invoice_payment(
            user.user_id,
            VerifyInvoicePaymentRequest {
                invoice_id: body.invoice_id,
                payment_id: body.payment_id,
                gateway_order_id: body.gateway_order_id,
                signature: body.signature,
            },
        )
        .await?;

    if !outcome.verified {
        return Err(ServiceError::VerificationFailed);
    }

    Ok(Json(ApiResponse::success(InvoiceVerificationResponse {
        verified: true,
        invoice_id: outcome.invoice.id,
        status: outcome.invoice.status.to_string(),
        already_paid: outcome.already_paid,
    })))
}
