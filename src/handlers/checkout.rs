use crate::auth::{consts as perm, AuthenticatedUser};
use crate::entities::payment_session::Model as SessionModel;
use crate::errors::ServiceError;
use crate::handlers::orders::OrderResponse;
use crate::{ApiResponse, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Checkout submission. The delivery address may be omitted to use the
/// caller's default address. `user_id`, when present, must match the
/// authenticated caller; placing orders for someone else is rejected.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub address_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Gateway session handle handed to the payment widget.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentSessionResponse {
    pub gateway_session_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
}

impl From<SessionModel> for PaymentSessionResponse {
    fn from(model: SessionModel) -> Self {
        Self {
            gateway_session_id: model.gateway_session_id,
            amount_minor: model.amount_minor,
            currency: model.currency,
            receipt: model.receipt,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OnlineCheckoutResponse {
    pub order: OrderResponse,
    pub session: PaymentSessionResponse,
    /// True when a duplicate submission collapsed onto an existing order
    pub reused_order: bool,
}

fn assert_caller(user: &AuthenticatedUser, claimed: Option<Uuid>) -> Result<(), ServiceError> {
    match claimed {
        Some(id) if id != user.user_id => Err(ServiceError::Unauthorized(
            "cannot place an order for another user".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Online checkout: write the order, open a gateway payment session
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order written and payment session opened", body = ApiResponse<OnlineCheckoutResponse>),
        (status = 400, description = "Empty cart or no address", body = crate::errors::ErrorResponse),
        (status = 409, description = "Checkout already in progress", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable; order stays pending and retryable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn place_online_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OnlineCheckoutResponse>>), ServiceError> {
    if !user.has_permission(perm::ORDERS_CREATE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }
    assert_caller(&user, request.user_id)?;

    let checkout = state
        .services
        .checkout
        .place_online_order(user.user_id, request.address_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OnlineCheckoutResponse {
            order: checkout.order.into(),
            session: checkout.session.into(),
            reused_order: checkout.reused_order,
        })),
    ))
}

/// Cash-on-delivery checkout: write the order and clear the cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/cod",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "COD order placed and cart cleared", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Empty cart or no address", body = crate::errors::ErrorResponse),
        (status = 409, description = "Checkout already in progress", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn place_cod_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    if !user.has_permission(perm::ORDERS_CREATE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }
    assert_caller(&user, request.user_id)?;

    let order = state
        .services
        .checkout
        .place_cod_order(user.user_id, request.address_id)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order.into()))))
}

/// Re-open a payment session for a pending order (after dismiss or failure)
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders/{id}/session",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 201, description = "New payment session against the same order", body = ApiResponse<OnlineCheckoutResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn reopen_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<(StatusCode, Json<ApiResponse<OnlineCheckoutResponse>>), ServiceError> {
    if !user.has_permission(perm::ORDERS_CREATE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    let checkout = state
        .services
        .checkout
        .reopen_session(user.user_id, id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OnlineCheckoutResponse {
            order: checkout.order.into(),
            session: checkout.session.into(),
            reused_order: checkout.reused_order,
        })),
    ))
}
