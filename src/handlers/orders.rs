use crate::auth::{consts as perm, AuthenticatedUser};
use crate::entities::order::Model as OrderModel;
use crate::entities::order_item::Model as OrderItemModel;
use crate::errors::ServiceError;
use crate::handlers::common::PaginationParams;
use crate::{ApiResponse, AppState, PaginatedResponse};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order as seen by the confirmation view and order history.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub address_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<OrderModel> for OrderResponse {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            address_id: model.address_id,
            status: model.status.to_string(),
            payment_status: model.payment_status.to_string(),
            payment_method: model.payment_method.to_string(),
            subtotal: model.subtotal,
            discount: model.discount,
            delivery_fee: model.delivery_fee,
            total: model.total,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub discount: Decimal,
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(model: OrderItemModel) -> Self {
        Self {
            product_id: model.product_id,
            product_name: model.product_name,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_price: model.total_price,
            discount: model.discount,
        }
    }
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders for the authenticated user", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    if !user.has_permission(perm::ORDERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    let (orders, total) = state
        .services
        .orders
        .list_orders_for_user(user.user_id, params.page, params.per_page)
        .await?;

    let per_page = params.per_page.max(1);
    let response = PaginatedResponse {
        items: orders.into_iter().map(OrderResponse::from).collect(),
        total,
        page: params.page,
        limit: per_page,
        total_pages: total.div_ceil(per_page),
    };
    Ok(Json(ApiResponse::success(response)))
}

/// Get one order by id (confirmation view)
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order details", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if !user.has_permission(perm::ORDERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    let order = state
        .services
        .orders
        .get_order_for_user(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// Get the line items of an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/items",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order items", body = ApiResponse<Vec<OrderItemResponse>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<OrderItemResponse>>>, ServiceError> {
    if !user.has_permission(perm::ORDERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    // Ownership check happens on the order itself.
    state
        .services
        .orders
        .get_order_for_user(user.user_id, id)
        .await?;

    let items = state.services.orders.get_order_items(id).await?;
    Ok(Json(ApiResponse::success(
        items.into_iter().map(OrderItemResponse::from).collect(),
    )))
}
