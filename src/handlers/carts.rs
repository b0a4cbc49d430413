use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::common::{map_service_error, no_content_response, validate_input};
use crate::{
    errors::{ApiError, ServiceError},
    handlers::AppState,
    services::commerce::{Cart, CartLine, RawCartLine, VariantKey},
    ApiResponse,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
    pub item_count: i64,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal: cart.subtotal(),
            item_count: cart.lines.iter().map(|l| i64::from(l.quantity)).sum(),
            lines: cart.lines,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetQuantityRequest {
    #[serde(alias = "cantidad")]
    #[validate(range(max = 999))]
    pub quantity: i32,
}

pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/carts/:cart_key", get(get_cart).delete(clear_cart))
        .route("/carts/:cart_key/lines", post(add_line))
        .route(
            "/carts/:cart_key/lines/:variant_key",
            put(set_quantity).delete(remove_line),
        )
}

fn parse_variant_key(raw: &str) -> Result<VariantKey, ApiError> {
    raw.parse::<VariantKey>()
        .map_err(|e| ApiError::ServiceError(ServiceError::ValidationError(e.to_string())))
}

#[utoipa::path(
    get,
    path = "/api/v1/carts/{cart_key}",
    summary = "Get cart",
    description = "Load the cart stored under a client key, repairing entries saved in older formats",
    params(("cart_key" = String, Path, description = "Client cart key")),
    responses(
        (status = 200, description = "Cart", body = ApiResponse<CartView>),
        (status = 400, description = "Invalid cart key", body = crate::errors::ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(cart_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .get_cart(&cart_key)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(CartView::from(cart))))
}

#[utoipa::path(
    post,
    path = "/api/v1/carts/{cart_key}/lines",
    summary = "Add to cart",
    description = "Merge a line into the cart; an identical configuration increases the existing quantity",
    params(("cart_key" = String, Path, description = "Client cart key")),
    request_body = RawCartLine,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 400, description = "Line has no product or price", body = crate::errors::ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn add_line(
    State(state): State<AppState>,
    Path(cart_key): Path<String>,
    Json(line): Json<RawCartLine>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .add_line(&cart_key, line)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(CartView::from(cart))))
}

#[utoipa::path(
    put,
    path = "/api/v1/carts/{cart_key}/lines/{variant_key}",
    summary = "Set line quantity",
    description = "Set a line's quantity; values below 1 are raised to 1",
    params(
        ("cart_key" = String, Path, description = "Client cart key"),
        ("variant_key" = String, Path, description = "URL-encoded variant key")
    ),
    request_body = SetQuantityRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "No line with that key", body = crate::errors::ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn set_quantity(
    State(state): State<AppState>,
    Path((cart_key, variant_key)): Path<(String, String)>,
    Json(payload): Json<SetQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let key = parse_variant_key(&variant_key)?;
    let cart = state
        .services
        .carts
        .set_quantity(&cart_key, &key, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(CartView::from(cart))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/carts/{cart_key}/lines/{variant_key}",
    summary = "Remove line",
    params(
        ("cart_key" = String, Path, description = "Client cart key"),
        ("variant_key" = String, Path, description = "URL-encoded variant key")
    ),
    responses((status = 200, description = "Updated cart", body = ApiResponse<CartView>)),
    tag = "carts"
)]
pub async fn remove_line(
    State(state): State<AppState>,
    Path((cart_key, variant_key)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = parse_variant_key(&variant_key)?;
    let cart = state
        .services
        .carts
        .remove_line(&cart_key, &key)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(CartView::from(cart))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/carts/{cart_key}",
    summary = "Clear cart",
    params(("cart_key" = String, Path, description = "Client cart key")),
    responses((status = 204, description = "Cart cleared")),
    tag = "carts"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(cart_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .carts
        .clear(&cart_key)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
