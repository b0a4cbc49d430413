use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{entities::push_destination, errors::ServiceError};

fn validate_platform(platform: &str) -> Result<(), validator::ValidationError> {
    match platform {
        "ios" | "android" | "web" => Ok(()),
        _ => Err(validator::ValidationError::new("unsupported_platform")),
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PushRegistration {
    #[serde(alias = "ownerId")]
    pub owner_id: Uuid,
    #[validate(length(min = 1, max = 512))]
    pub token: String,
    #[validate(custom = "validate_platform")]
    pub platform: String,
}

/// One active push destination per owner; registering again replaces it.
#[derive(Clone)]
pub struct PushRegistry {
    db: Arc<DatabaseConnection>,
}

impl PushRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, registration), fields(owner_id = %registration.owner_id, platform = %registration.platform))]
    pub async fn register(
        &self,
        registration: PushRegistration,
    ) -> Result<push_destination::Model, ServiceError> {
        registration.validate()?;

        let now = Utc::now();
        let row = push_destination::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(registration.owner_id),
            token: Set(registration.token),
            platform: Set(registration.platform),
            created_at: Set(now),
            updated_at: Set(now),
        };

        push_destination::Entity::insert(row)
            .on_conflict(
                OnConflict::column(push_destination::Column::OwnerId)
                    .update_columns([
                        push_destination::Column::Token,
                        push_destination::Column::Platform,
                        push_destination::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        let stored = push_destination::Entity::find()
            .filter(push_destination::Column::OwnerId.eq(registration.owner_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("push destination vanished after upsert".to_string())
            })?;

        info!("Push destination registered");
        Ok(stored)
    }
}
