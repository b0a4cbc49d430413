use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, DeliveryType, Entity as OrderEntity, OrderStatus},
        order_line,
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: i64,
    pub topping_id: Option<i64>,
    pub filling_id: Option<i64>,
    pub custom_message: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub product_name: String,
    pub product_image: Option<String>,
    pub topping_name: Option<String>,
    pub filling_name: Option<String>,
}

impl From<order_line::Model> for OrderLineResponse {
    fn from(line: order_line::Model) -> Self {
        Self {
            line_total: line.line_total(),
            id: line.id,
            product_id: line.product_id,
            topping_id: line.topping_id,
            filling_id: line.filling_id,
            custom_message: line.custom_message,
            quantity: line.quantity,
            unit_price: line.unit_price,
            product_name: line.product_name_snapshot,
            product_image: line.product_image_snapshot,
            topping_name: line.topping_name_snapshot,
            filling_name: line.filling_name_snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub pending_cart_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub status: OrderStatus,
    pub delivery_type: DeliveryType,
    #[schema(value_type = Option<Object>)]
    pub delivery_details: Option<serde_json::Value>,
    pub total: Decimal,
    pub authorization_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<OrderLineResponse>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            pending_cart_id: model.pending_cart_id,
            owner_id: model.owner_id,
            status: model.status,
            delivery_type: model.delivery_type,
            delivery_details: model.delivery_details,
            total: model.total,
            authorization_code: model.authorization_code,
            created_at: model.created_at,
            updated_at: model.updated_at,
            delivery_date: model.delivery_date,
            lines: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Read side for orders
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_order_with_lines(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let lines = order
            .find_related(order_line::Entity)
            .order_by_asc(order_line::Column::ProductId)
            .all(&*self.db)
            .await?;

        let mut response = OrderResponse::from(order);
        response.lines = lines.into_iter().map(OrderLineResponse::from).collect();
        Ok(response)
    }

    /// An owner's orders, newest first. `owner_id = None` lists every order.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        owner_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(owner_id) = owner_id {
            query = query.filter(order::Column::OwnerId.eq(owner_id));
        }

        let per_page = per_page.clamp(1, 100);
        let page = page.max(1);
        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(OrderResponse::from)
            .collect();

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    pub async fn find_by_pending_cart(
        &self,
        pending_cart_id: Uuid,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::PendingCartId.eq(pending_cart_id))
            .one(&*self.db)
            .await?)
    }
}
