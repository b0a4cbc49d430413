use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contact record for an order owner. Identity itself lives with the auth provider;
/// `id` is the owner id it issues.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::push_destination::Entity")]
    PushDestination,
}

impl Related<super::push_destination::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PushDestination.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
