use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::cart_service::{Cart, RawCartLine};
use crate::{
    config::AppConfig,
    entities::pending_cart::{self, DeliveryType, PendingCartStatus},
    errors::ServiceError,
    services::{
        catalog::CatalogService,
        payments::{buy_order_for, CreateTransaction, PaymentGateway},
    },
};

/// Recipient data for home delivery. The wire names follow the storefront's forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryDetails {
    #[serde(rename = "nombre", alias = "name", default)]
    pub name: Option<String>,
    #[serde(rename = "direccion", alias = "address", default)]
    pub address: Option<String>,
    #[serde(rename = "contacto", alias = "contact", alias = "phone", default)]
    pub contact: Option<String>,
    #[serde(rename = "comentarios", alias = "comments", default)]
    pub comments: Option<String>,
}

impl DeliveryDetails {
    /// Names of the fields home delivery needs that are blank or absent.
    pub fn missing_for_delivery(&self) -> Vec<&'static str> {
        [
            ("nombre", &self.name),
            ("direccion", &self.address),
            ("contacto", &self.contact),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(field, _)| field)
        .collect()
    }
}

/// Which return URL the gateway should send the shopper back to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Web,
    Mobile,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    #[serde(default, alias = "ownerId")]
    pub owner_id: Option<Uuid>,
    #[serde(alias = "cart", alias = "items")]
    pub lines: Vec<RawCartLine>,
    #[serde(alias = "deliveryType")]
    pub delivery_type: DeliveryType,
    #[serde(default, alias = "deliveryDetails")]
    pub delivery_details: Option<DeliveryDetails>,
    #[serde(default)]
    pub client: ClientKind,
}

/// Where to send the shopper to pay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRedirect {
    pub pending_cart_id: Uuid,
    pub token: String,
    pub url: String,
    pub total: Decimal,
}

/// Snapshots a cart into a pending cart and opens a gateway transaction for it.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    catalog: CatalogService,
    gateway: Arc<dyn PaymentGateway>,
    delivery_surcharge: Decimal,
    web_return_url: String,
    mobile_return_url: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog: CatalogService::new(db.clone()),
            db,
            gateway,
            delivery_surcharge: config.delivery_surcharge(),
            web_return_url: config.payment_return_url.clone(),
            mobile_return_url: config.mobile_return_url().to_string(),
        }
    }

    /// Validates and prices the request without persisting anything.
    pub async fn quote(&self, request: &CheckoutRequest) -> Result<(Cart, Decimal), ServiceError> {
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        if request.delivery_type == DeliveryType::Envio {
            let missing = request
                .delivery_details
                .as_ref()
                .map(DeliveryDetails::missing_for_delivery)
                .unwrap_or_else(|| vec!["nombre", "direccion", "contacto"]);
            if !missing.is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "Delivery requires: {}",
                    missing.join(", ")
                )));
            }
        }

        let lines = request
            .lines
            .iter()
            .cloned()
            .map(RawCartLine::normalize)
            .collect::<Result<Vec<_>, _>>()?;
        let mut cart = Cart { lines }.normalize_legacy();
        self.price_from_catalog(&mut cart).await?;

        let mut total = cart.subtotal();
        if request.delivery_type == DeliveryType::Envio {
            total += self.delivery_surcharge;
        }
        Ok((cart, total))
    }

    #[instrument(skip(self, request), fields(owner_id = ?request.owner_id, delivery_type = %request.delivery_type))]
    pub async fn submit(&self, request: CheckoutRequest) -> Result<CheckoutRedirect, ServiceError> {
        let (cart, total) = self.quote(&request).await?;
        let amount = total.round_dp(0).to_i64().ok_or_else(|| {
            ServiceError::ValidationError(format!("Total {} is out of range", total))
        })?;

        let delivery_details = match request.delivery_type {
            DeliveryType::Envio => request
                .delivery_details
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
            DeliveryType::Retiro => None,
        };

        let pending_cart_id = Uuid::new_v4();
        let pending = pending_cart::ActiveModel {
            id: Set(pending_cart_id),
            owner_id: Set(request.owner_id),
            delivery_type: Set(request.delivery_type),
            delivery_details: Set(delivery_details),
            lines: Set(serde_json::to_value(&cart)?),
            total: Set(total),
            status: Set(PendingCartStatus::Pending),
            gateway_token: Set(None),
            created_at: Set(Utc::now()),
            paid_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        let return_url = match request.client {
            ClientKind::Web => self.web_return_url.clone(),
            ClientKind::Mobile => self.mobile_return_url.clone(),
        };
        let redirect = self
            .gateway
            .create_transaction(&CreateTransaction {
                buy_order: buy_order_for(pending_cart_id),
                session_id: pending_cart_id.to_string(),
                amount,
                return_url,
            })
            .await
            .map_err(|e| {
                // the pending cart stays behind; it can never become an order without a commit
                warn!(%pending_cart_id, "Gateway transaction creation failed: {}", e);
                ServiceError::PaymentFailed(format!("Could not start payment: {}", e))
            })?;

        let mut pending: pending_cart::ActiveModel = pending.into();
        pending.gateway_token = Set(Some(redirect.token.clone()));
        pending.update(&*self.db).await?;

        info!(%pending_cart_id, %total, lines = cart.lines.len(), "Checkout submitted");

        Ok(CheckoutRedirect {
            pending_cart_id,
            token: redirect.token,
            url: redirect.url,
            total,
        })
    }

    /// Replaces client-sent prices and product descriptions with the catalog's,
    /// and names any topping or filling the client left unnamed.
    async fn price_from_catalog(&self, cart: &mut Cart) -> Result<(), ServiceError> {
        let ids: Vec<i64> = cart.lines.iter().map(|l| l.product_id).collect();
        let products = CatalogService::products_by_id(&*self.db, &ids).await?;

        for line in &mut cart.lines {
            let product = products
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product {} is not available",
                        line.product_id
                    ))
                })?;
            line.unit_price = product.price;
            line.product_name = Some(product.name.clone());
            if product.image_url.is_some() {
                line.product_image = product.image_url.clone();
            }
            if let Some(id) = line.topping_id.filter(|_| line.topping_name.is_none()) {
                line.topping_name = self.catalog.topping_name(id).await?;
            }
            if let Some(id) = line.filling_id.filter(|_| line.filling_name.is_none()) {
                line.filling_name = self.catalog.filling_name(id).await?;
            }
        }
        Ok(())
    }

    pub async fn find_pending_cart(
        &self,
        id: Uuid,
    ) -> Result<Option<pending_cart::Model>, ServiceError> {
        Ok(pending_cart::Entity::find_by_id(id).one(&*self.db).await?)
    }
}
