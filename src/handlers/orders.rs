use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{map_service_error, no_content_response};
use crate::{
    entities::order::OrderStatus,
    errors::ApiError,
    handlers::AppState,
    services::{
        order_status::TransitionOutcome,
        orders::{OrderListResponse, OrderResponse},
    },
    ApiResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// Only orders placed by this owner
    pub owner_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeliveryDateRequest {
    /// ISO-8601 timestamp
    #[serde(alias = "deliveryDate")]
    pub delivery_date: DateTime<Utc>,
}

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order).delete(delete_order))
        .route("/orders/:id/advance", post(advance_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/delivery-date", put(set_delivery_date))
}

/// Applied transitions answer 200; rejections answer 409 with the unchanged status.
fn transition_response(order_id: Uuid, outcome: TransitionOutcome) -> impl IntoResponse {
    match outcome {
        TransitionOutcome::Applied { order, previous } => (
            StatusCode::OK,
            Json(ApiResponse::success(TransitionResponse {
                order_id,
                status: order.status,
                previous_status: Some(previous),
            })),
        ),
        TransitionOutcome::Rejected { current, reason } => {
            let mut body = ApiResponse::error(reason);
            body.data = Some(TransitionResponse {
                order_id,
                status: current,
                previous_status: None,
            });
            (StatusCode::CONFLICT, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Orders newest first, optionally for a single owner",
    params(OrderListQuery),
    responses((status = 200, description = "Orders", body = ApiResponse<OrderListResponse>)),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .orders
        .list_orders(query.owner_id, query.page, query.per_page)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "Order with its line snapshots",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order_with_lines(id)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/advance",
    summary = "Advance order",
    description = "Move the order one step along received, in_production, ready, delivered",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order advanced", body = ApiResponse<TransitionResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is delivered or cancelled", body = ApiResponse<TransitionResponse>)
    ),
    tag = "orders"
)]
pub async fn advance_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .lifecycle
        .advance(id)
        .await
        .map_err(map_service_error)?;
    Ok(transition_response(id, outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<TransitionResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is delivered or already cancelled", body = ApiResponse<TransitionResponse>)
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .lifecycle
        .cancel(id)
        .await
        .map_err(map_service_error)?;
    Ok(transition_response(id, outcome))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/delivery-date",
    summary = "Set delivery date",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = DeliveryDateRequest,
    responses(
        (status = 200, description = "Delivery date set", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn set_delivery_date(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryDateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .lifecycle
        .set_delivery_date(id, payload.delivery_date)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(OrderResponse::from(order))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    summary = "Delete order",
    description = "Remove the order and its lines permanently",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .lifecycle
        .delete(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
