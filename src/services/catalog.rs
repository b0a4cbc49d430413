use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::instrument;

use crate::{
    entities::{filling, product, topping},
    errors::ServiceError,
};

/// Read-only lookups into the catalog used to describe cart and order lines.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn product(&self, id: i64) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn topping_name(&self, id: i64) -> Result<Option<String>, ServiceError> {
        Ok(topping::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|t| t.name))
    }

    pub async fn filling_name(&self, id: i64) -> Result<Option<String>, ServiceError> {
        Ok(filling::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|f| f.name))
    }

    /// Batch variant of [`CatalogService::product`] for use inside a transaction.
    #[instrument(skip(conn, ids), fields(count = ids.len()))]
    pub async fn products_by_id<C: ConnectionTrait>(
        conn: &C,
        ids: &[i64],
    ) -> Result<HashMap<i64, product::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = product::Entity::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(conn)
            .await?;
        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }
}
