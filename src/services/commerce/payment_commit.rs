use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::cart_service::CartLine;
use crate::{
    entities::{
        order::{self, OrderStatus},
        order_line,
        pending_cart::{self, PendingCartStatus},
        product,
    },
    errors::ServiceError,
    notifications::{Notification, Notifier},
    services::{
        catalog::CatalogService,
        payments::{CommitResponse, GatewayError, PaymentGateway},
    },
};

/// Answer to a commit callback.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CommitOutcome {
    pub order_id: Uuid,
    pub pending_cart_id: Uuid,
    pub total: Decimal,
    /// The order already existed; this callback was a repeat delivery
    pub duplicate: bool,
}

/// Write attempts per callback before the order is reported unrecorded.
const MATERIALIZE_ATTEMPTS: u32 = 6;

enum Materialized {
    Created(order::Model, Vec<CartLine>),
    Existing(order::Model),
}

/// Turns an authorized gateway transaction into exactly one order.
#[derive(Clone)]
pub struct PaymentCommitService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentCommitService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            gateway,
            notifier,
        }
    }

    /// Commits `token` at the gateway and materializes the order.
    ///
    /// Safe to call any number of times for the same token: every call after
    /// the first answers with the order the first one created.
    #[instrument(skip(self))]
    pub async fn commit(&self, token: &str) -> Result<CommitOutcome, ServiceError> {
        let confirmation = self.confirm(token).await?;
        if !confirmation.is_authorized() {
            info!(
                token,
                session_id = %confirmation.session_id,
                status = %confirmation.status,
                response_code = ?confirmation.response_code,
                "Payment not authorized"
            );
            return Err(ServiceError::PaymentFailed(format!(
                "Payment was not authorized (status {})",
                confirmation.status
            )));
        }

        let result = match confirmation.session_id.parse::<Uuid>() {
            Ok(pending_cart_id) => self.materialize(pending_cart_id, &confirmation).await,
            Err(_) => Err(ServiceError::ReconciliationError(format!(
                "Session id '{}' is not a pending cart id",
                confirmation.session_id
            ))),
        };

        match result {
            Ok(Materialized::Created(order, lines)) => {
                self.credit_sales(&lines).await;
                self.notifier
                    .notify(order.owner_id, Notification::order_received(order.id))
                    .await;
                info!(order_id = %order.id, pending_cart_id = %order.pending_cart_id, "Order created from payment");
                Ok(outcome(&order, false))
            }
            Ok(Materialized::Existing(order)) => {
                info!(order_id = %order.id, "Repeat payment confirmation, returning existing order");
                Ok(outcome(&order, true))
            }
            Err(e) => {
                let e = match e {
                    ServiceError::ReconciliationError(_) => e,
                    other => ServiceError::ReconciliationError(other.to_string()),
                };
                error!(
                    token,
                    session_id = %confirmation.session_id,
                    buy_order = %confirmation.buy_order,
                    authorization_code = ?confirmation.authorization_code,
                    amount = confirmation.amount,
                    "Payment authorized but order was not recorded: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Commits, falling back to a status query when the token was committed before.
    async fn confirm(&self, token: &str) -> Result<CommitResponse, ServiceError> {
        let committed = match self.gateway.commit(token).await {
            Err(GatewayError::AlreadyProcessed) => {
                info!(token, "Transaction already committed, querying status");
                self.gateway.status(token).await
            }
            other => other,
        };
        committed.map_err(|e| {
            warn!(token, "Gateway commit failed: {}", e);
            ServiceError::PaymentFailed(format!("Payment could not be confirmed: {}", e))
        })
    }

    /// Runs the order write, retrying when the database refuses it.
    ///
    /// A failed write may mean a concurrent callback for the same cart won the
    /// race (unique index on Postgres, lock contention on SQLite), so the order
    /// is looked up again before anything is retried or reported.
    async fn materialize(
        &self,
        pending_cart_id: Uuid,
        confirmation: &CommitResponse,
    ) -> Result<Materialized, ServiceError> {
        let mut attempt = 1;
        loop {
            let err = match self.write_order(pending_cart_id, confirmation).await {
                Err(ServiceError::DatabaseError(e)) => e,
                other => return other,
            };

            match find_order_for_cart(&*self.db, pending_cart_id).await {
                Ok(Some(existing)) => {
                    debug!(
                        pending_cart_id = %pending_cart_id,
                        unique_violation = is_unique_violation(&err),
                        "Concurrent callback recorded the order first"
                    );
                    return Ok(Materialized::Existing(existing));
                }
                Ok(None) => {}
                Err(read_err) => {
                    warn!(pending_cart_id = %pending_cart_id, "Order lookup after failed write: {}", read_err);
                }
            }

            if attempt >= MATERIALIZE_ATTEMPTS {
                return Err(ServiceError::DatabaseError(err));
            }
            warn!(
                pending_cart_id = %pending_cart_id,
                attempt,
                "Order write failed, retrying: {}",
                err
            );
            tokio::time::sleep(Duration::from_millis(20 * 2_u64.pow(attempt - 1))).await;
            attempt += 1;
        }
    }

    /// One transactional attempt: order, lines and the paid mark, or nothing.
    async fn write_order(
        &self,
        pending_cart_id: Uuid,
        confirmation: &CommitResponse,
    ) -> Result<Materialized, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = pending_cart::Entity::find_by_id(pending_cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::ReconciliationError(format!(
                    "Pending cart {} not found",
                    pending_cart_id
                ))
            })?;

        if let Some(existing) = find_order_for_cart(&txn, pending_cart_id).await? {
            txn.rollback().await?;
            return Ok(Materialized::Existing(existing));
        }

        if Decimal::from(confirmation.amount) != cart.total.round_dp(0) {
            return Err(ServiceError::ReconciliationError(format!(
                "Authorized amount {} does not match cart total {}",
                confirmation.amount, cart.total
            )));
        }

        let lines: Vec<CartLine> = serde_json::from_value(cart.lines.clone())?;
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            pending_cart_id: Set(pending_cart_id),
            owner_id: Set(cart.owner_id),
            delivery_type: Set(cart.delivery_type),
            delivery_details: Set(cart.delivery_details.clone()),
            status: Set(OrderStatus::Received),
            total: Set(cart.total),
            authorization_code: Set(confirmation.authorization_code.clone()),
            buy_order: Set(Some(confirmation.buy_order.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            delivery_date: Set(None),
        };

        // dropping txn on any error below rolls it back
        let order = order.insert(&txn).await?;
        insert_lines(&txn, order.id, &lines).await?;

        let marked = pending_cart::Entity::update_many()
            .set(pending_cart::ActiveModel {
                status: Set(PendingCartStatus::Paid),
                paid_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(pending_cart::Column::Id.eq(pending_cart_id))
            .filter(pending_cart::Column::Status.eq(PendingCartStatus::Pending))
            .exec(&txn)
            .await?;
        if marked.rows_affected == 0 {
            return Err(ServiceError::ReconciliationError(format!(
                "Pending cart {} was already consumed",
                pending_cart_id
            )));
        }

        txn.commit().await?;
        Ok(Materialized::Created(order, lines))
    }

    /// Adds each line's quantity to its product's sales counter. A failure
    /// only skips that line.
    async fn credit_sales(&self, lines: &[CartLine]) {
        for line in lines {
            let result = product::Entity::update_many()
                .col_expr(
                    product::Column::SalesCount,
                    Expr::col(product::Column::SalesCount).add(i64::from(line.quantity)),
                )
                .filter(product::Column::Id.eq(line.product_id))
                .exec(&*self.db)
                .await;
            if let Err(e) = result {
                warn!(
                    product_id = line.product_id,
                    quantity = line.quantity,
                    "Sales counter not updated: {}",
                    e
                );
            }
        }
    }
}

fn outcome(order: &order::Model, duplicate: bool) -> CommitOutcome {
    CommitOutcome {
        order_id: order.id,
        pending_cart_id: order.pending_cart_id,
        total: order.total,
        duplicate,
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn find_order_for_cart<C: sea_orm::ConnectionTrait>(
    conn: &C,
    pending_cart_id: Uuid,
) -> Result<Option<order::Model>, DbErr> {
    order::Entity::find()
        .filter(order::Column::PendingCartId.eq(pending_cart_id))
        .one(conn)
        .await
}

/// Writes the order's lines with names and images as they are right now.
async fn insert_lines(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    lines: &[CartLine],
) -> Result<(), ServiceError> {
    let ids: Vec<i64> = lines.iter().map(|l| l.product_id).collect();
    let products = CatalogService::products_by_id(txn, &ids).await?;

    let rows: Vec<order_line::ActiveModel> = lines
        .iter()
        .map(|line| {
            let product = products.get(&line.product_id);
            let name = product
                .map(|p| p.name.clone())
                .or_else(|| line.product_name.clone())
                .unwrap_or_else(|| format!("Product {}", line.product_id));
            let image = product
                .and_then(|p| p.image_url.clone())
                .or_else(|| line.product_image.clone());

            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                topping_id: Set(line.topping_id),
                filling_id: Set(line.filling_id),
                custom_message: Set(line.custom_message.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                product_name_snapshot: Set(name),
                product_image_snapshot: Set(image),
                topping_name_snapshot: Set(line.topping_name.clone()),
                filling_name_snapshot: Set(line.filling_name.clone()),
            }
        })
        .collect();

    if !rows.is_empty() {
        order_line::Entity::insert_many(rows).exec(txn).await?;
    }
    Ok(())
}
