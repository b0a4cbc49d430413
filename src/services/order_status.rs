use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, OrderStatus},
        order_line,
    },
    errors::ServiceError,
    notifications::{Notification, Notifier},
};

/// Result of asking for a status change. A rejection is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied {
        order: order::Model,
        previous: OrderStatus,
    },
    Rejected {
        current: OrderStatus,
        reason: String,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            TransitionOutcome::Applied { order, .. } => order.status,
            TransitionOutcome::Rejected { current, .. } => *current,
        }
    }
}

/// Moves orders through the fulfillment pipeline.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
}

impl OrderLifecycleService {
    pub fn new(db: Arc<DatabaseConnection>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Moves the order one step forward.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn advance(&self, order_id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find(order_id).await?;
        match order.status.next() {
            Some(next) => self.transition(order, next).await,
            None => Ok(TransitionOutcome::Rejected {
                current: order.status,
                reason: format!("Cannot advance an order that is {}", order.status),
            }),
        }
    }

    /// Cancels any order that is not yet delivered or cancelled.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find(order_id).await?;
        if !order.status.can_cancel() {
            return Ok(TransitionOutcome::Rejected {
                current: order.status,
                reason: format!("Cannot cancel an order that is {}", order.status),
            });
        }
        self.transition(order, OrderStatus::Cancelled).await
    }

    /// Records when the order will be handed over. Allowed in every status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn set_delivery_date(
        &self,
        order_id: Uuid,
        delivery_date: DateTime<Utc>,
    ) -> Result<order::Model, ServiceError> {
        let updated = order::Entity::update_many()
            .set(order::ActiveModel {
                delivery_date: Set(Some(delivery_date)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        info!(%delivery_date, "Delivery date set");
        self.find(order_id).await
    }

    /// Removes the order and its lines.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        // sqlite only honours ON DELETE CASCADE with foreign_keys enabled
        let lines = order_line::Entity::delete_many()
            .filter(order_line::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        order::Entity::delete_by_id(order_id).exec(&txn).await?;

        txn.commit().await?;
        info!(lines = lines.rows_affected, "Order deleted");
        Ok(())
    }

    async fn find(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Applies `to` only if the stored status is still the one we read.
    async fn transition(
        &self,
        order: order::Model,
        to: OrderStatus,
    ) -> Result<TransitionOutcome, ServiceError> {
        let previous = order.status;
        let now = Utc::now();

        let updated = order::Entity::update_many()
            .set(order::ActiveModel {
                status: Set(to),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(previous))
            .exec(&*self.db)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order.id));
        }

        let order = order::Model {
            status: to,
            updated_at: now,
            ..order
        };
        info!(from = %previous, to = %to, "Order status changed");

        self.notifier
            .notify(order.owner_id, Notification::status_changed(order.id, to))
            .await;

        Ok(TransitionOutcome::Applied { order, previous })
    }
}
