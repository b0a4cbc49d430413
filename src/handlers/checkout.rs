use axum::{extract::State, response::IntoResponse, Json};

use super::common::{created_response, map_service_error};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::commerce::{CheckoutRedirect, CheckoutRequest},
    ApiResponse,
};

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Submit checkout",
    description = "Snapshot the cart into a pending cart and open a payment transaction. \
                   The shopper is sent to `url` with `token` to pay.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Payment transaction opened", body = ApiResponse<CheckoutRedirect>),
        (status = 400, description = "Empty cart or missing delivery details", body = crate::errors::ErrorResponse),
        (status = 402, description = "Gateway refused to open the transaction", body = crate::errors::ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn submit_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let redirect = state
        .services
        .checkout
        .submit(request)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(ApiResponse::success(redirect)))
}
