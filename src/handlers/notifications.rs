use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{map_service_error, validate_input};
use crate::{
    entities::push_destination, errors::ApiError, handlers::AppState,
    notifications::PushRegistration, ApiResponse,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct PushDestinationResponse {
    pub owner_id: Uuid,
    pub platform: String,
    pub updated_at: DateTime<Utc>,
}

impl From<push_destination::Model> for PushDestinationResponse {
    fn from(model: push_destination::Model) -> Self {
        Self {
            owner_id: model.owner_id,
            platform: model.platform,
            updated_at: model.updated_at,
        }
    }
}

pub fn notifications_routes() -> Router<AppState> {
    Router::new().route("/notifications/push-destinations", post(register_push_destination))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/push-destinations",
    summary = "Register push destination",
    description = "Associate a device push token with an owner, replacing any previous one",
    request_body = PushRegistration,
    responses(
        (status = 200, description = "Registered", body = ApiResponse<PushDestinationResponse>),
        (status = 400, description = "Invalid token or platform", body = crate::errors::ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn register_push_destination(
    State(state): State<AppState>,
    Json(payload): Json<PushRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let stored = state
        .services
        .push_registry
        .register(payload)
        .await
        .map_err(map_service_error)?;
    Ok(Json(ApiResponse::success(PushDestinationResponse::from(
        stored,
    ))))
}
