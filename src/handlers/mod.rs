pub mod carts;
pub mod checkout;
pub mod common;
pub mod notifications;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    notifications::{
        DbRecipientDirectory, ExpoPushChannel, HttpEmailChannel, NotificationDispatcher,
        Notifier, PushRegistry,
    },
    services::{
        catalog::CatalogService,
        commerce::{CartService, CartStore, CheckoutService, FileCartStore, PaymentCommitService},
        order_status::OrderLifecycleService,
        orders::OrderService,
        payments::{PaymentGateway, WebpayGateway},
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub payment_commit: Arc<PaymentCommitService>,
    pub orders: Arc<OrderService>,
    pub lifecycle: Arc<OrderLifecycleService>,
    pub push_registry: Arc<PushRegistry>,
}

impl AppServices {
    /// Wires services around the given collaborators.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        cart_store: Arc<dyn CartStore>,
    ) -> Self {
        let catalog = CatalogService::new(db_pool.clone());

        Self {
            carts: Arc::new(CartService::new(cart_store, catalog)),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                gateway.clone(),
                config,
            )),
            payment_commit: Arc::new(PaymentCommitService::new(
                db_pool.clone(),
                gateway,
                notifier.clone(),
            )),
            orders: Arc::new(OrderService::new(db_pool.clone())),
            lifecycle: Arc::new(OrderLifecycleService::new(db_pool.clone(), notifier)),
            push_registry: Arc::new(PushRegistry::new(db_pool)),
        }
    }

    /// Production wiring: HTTP gateway, configured notification channels and
    /// file-backed carts.
    pub fn from_config(db_pool: Arc<DbPool>, config: &AppConfig) -> Result<Self, ServiceError> {
        let gateway = WebpayGateway::from_config(config)
            .map_err(|e| ServiceError::InternalError(format!("payment gateway client: {}", e)))?;

        let mut dispatcher =
            NotificationDispatcher::new(Arc::new(DbRecipientDirectory::new(db_pool.clone())));
        if let Some(endpoint) = &config.push_endpoint {
            let push = ExpoPushChannel::new(endpoint.clone(), config.notification_timeout())
                .map_err(|e| ServiceError::InternalError(format!("push channel: {}", e)))?;
            dispatcher = dispatcher.with_channel(Arc::new(push));
        }
        if let (Some(url), Some(key)) = (&config.email_api_url, &config.email_api_key) {
            let email = HttpEmailChannel::new(
                url.clone(),
                key.clone(),
                config.email_from.clone(),
                config.notification_timeout(),
            )
            .map_err(|e| ServiceError::InternalError(format!("email channel: {}", e)))?;
            dispatcher = dispatcher.with_channel(Arc::new(email));
        }
        tracing::info!(channels = ?dispatcher.channel_names(), "Notification channels configured");

        Ok(Self::new(
            db_pool,
            config,
            Arc::new(gateway),
            Arc::new(dispatcher),
            Arc::new(FileCartStore::new(config.cart_store_dir.clone())),
        ))
    }
}
