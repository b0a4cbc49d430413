//! Return points from the payment gateway.
//!
//! Browsers come back to `/payments/commit` (GET or form POST) and are
//! redirected to the storefront. The mobile app intercepts the same return
//! inside its web view and posts the token to `/payments/mobile/commit`,
//! which answers with JSON. Both go through [`PaymentCommitService::commit`].
//!
//! [`PaymentCommitService::commit`]: crate::services::commerce::PaymentCommitService::commit

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use utoipa::{IntoParams, ToSchema};

use super::common::map_service_error;
use crate::{
    errors::{ApiError, ServiceError},
    handlers::AppState,
    services::commerce::CommitOutcome,
    ApiResponse,
};

/// Parameters the gateway appends to the return URL.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct GatewayReturn {
    /// Present when the shopper completed the payment form
    pub token_ws: Option<String>,
    /// Present instead of `token_ws` when the shopper aborted
    #[serde(rename = "TBK_TOKEN")]
    pub tbk_token: Option<String>,
    #[serde(rename = "TBK_ID_SESION")]
    pub tbk_session_id: Option<String>,
    #[serde(rename = "TBK_ORDEN_COMPRA")]
    pub tbk_buy_order: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MobileCommitRequest {
    #[serde(default, alias = "token_ws")]
    pub token: Option<String>,
    #[serde(default, rename = "TBK_TOKEN", alias = "tbk_token")]
    pub tbk_token: Option<String>,
}

pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/commit", get(web_commit_query).post(web_commit_form))
        .route("/payments/mobile/commit", post(mobile_commit))
}

/// What a gateway return resolves to before any gateway call is made.
enum ReturnAction<'a> {
    Commit(&'a str),
    Aborted,
    Missing,
}

fn classify<'a>(token: Option<&'a str>, tbk_token: Option<&'a str>) -> ReturnAction<'a> {
    match (token.filter(|t| !t.is_empty()), tbk_token) {
        (Some(token), _) => ReturnAction::Commit(token),
        (None, Some(_)) => ReturnAction::Aborted,
        (None, None) => ReturnAction::Missing,
    }
}

async fn settle(
    state: &AppState,
    token: Option<&str>,
    tbk_token: Option<&str>,
) -> Result<CommitOutcome, ServiceError> {
    match classify(token, tbk_token) {
        ReturnAction::Commit(token) => state.services.payment_commit.commit(token).await,
        ReturnAction::Aborted => {
            info!(tbk_token = ?tbk_token, "Shopper aborted payment");
            Err(ServiceError::PaymentFailed(
                "Payment was cancelled by the shopper".to_string(),
            ))
        }
        ReturnAction::Missing => Err(ServiceError::ValidationError(
            "Missing payment token".to_string(),
        )),
    }
}

fn with_query(base: &str, pairs: &[(&str, String)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in pairs {
                    query.append_pair(key, value);
                }
            }
            url.into()
        }
        Err(e) => {
            warn!(base, "Storefront redirect URL is not absolute: {}", e);
            base.to_string()
        }
    }
}

async fn web_commit(state: AppState, params: GatewayReturn) -> Response {
    if params.token_ws.is_none() {
        info!(
            session_id = ?params.tbk_session_id,
            buy_order = ?params.tbk_buy_order,
            "Gateway returned without a payment token"
        );
    }
    let result = settle(&state, params.token_ws.as_deref(), params.tbk_token.as_deref()).await;
    let target = match result {
        Ok(outcome) => with_query(
            &state.config.web_success_url,
            &[("order_id", outcome.order_id.to_string())],
        ),
        Err(e) => {
            let reason = match &e {
                ServiceError::ReconciliationError(_) => "reconciliation",
                ServiceError::ValidationError(_) => "missing_token",
                ServiceError::PaymentFailed(_) if params.token_ws.is_none() => "aborted",
                _ => "payment_failed",
            };
            with_query(&state.config.web_failure_url, &[("reason", reason.to_string())])
        }
    };
    Redirect::to(&target).into_response()
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/commit",
    summary = "Gateway return (web)",
    description = "Commits the transaction and redirects the browser to the storefront's success or failure page",
    params(GatewayReturn),
    responses((status = 303, description = "Redirect to storefront")),
    tag = "payments"
)]
pub async fn web_commit_query(
    State(state): State<AppState>,
    Query(params): Query<GatewayReturn>,
) -> Response {
    web_commit(state, params).await
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/commit",
    summary = "Gateway return (web, form post)",
    request_body(content = GatewayReturn, content_type = "application/x-www-form-urlencoded"),
    responses((status = 303, description = "Redirect to storefront")),
    tag = "payments"
)]
pub async fn web_commit_form(
    State(state): State<AppState>,
    Form(params): Form<GatewayReturn>,
) -> Response {
    web_commit(state, params).await
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/mobile/commit",
    summary = "Gateway return (mobile)",
    description = "Commits the transaction and answers with the order. Repeat calls return the same order with `duplicate = true`.",
    request_body = MobileCommitRequest,
    responses(
        (status = 200, description = "Order recorded", body = ApiResponse<CommitOutcome>),
        (status = 400, description = "Missing token", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment not authorized or aborted", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment authorized but order not recorded", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn mobile_commit(
    State(state): State<AppState>,
    Json(request): Json<MobileCommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = settle(&state, request.token.as_deref(), request.tbk_token.as_deref())
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_wins_over_abort_marker() {
        assert!(matches!(classify(Some("t"), Some("x")), ReturnAction::Commit("t")));
        assert!(matches!(classify(None, Some("x")), ReturnAction::Aborted));
        assert!(matches!(classify(Some(""), None), ReturnAction::Missing));
    }

    #[test]
    fn redirect_targets_keep_existing_query() {
        let target = with_query(
            "https://shop.test/gracias?src=webpay",
            &[("order_id", "abc".to_string())],
        );
        assert_eq!(target, "https://shop.test/gracias?src=webpay&order_id=abc");
    }
}
