//! Best-effort customer notifications.
//!
//! [`NotificationDispatcher`] resolves where an owner can be reached and
//! attempts every channel independently. Nothing here returns an error to the
//! caller: failures are logged and counted in the [`DispatchReport`].

use async_trait::async_trait;
use futures::future::join_all;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::{customer, order::OrderStatus, push_destination};

pub mod channels;
pub mod registry;

pub use channels::{ExpoPushChannel, HttpEmailChannel};
pub use registry::{PushRegistration, PushRegistry};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("channel transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("channel rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("recipient lookup failed: {0}")]
    Directory(#[from] sea_orm::DbErr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Passed through to the push payload's `data`
    #[serde(default)]
    pub metadata: Value,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, metadata: Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            metadata,
        }
    }

    pub fn order_received(order_id: Uuid) -> Self {
        Self::new(
            "Order received",
            "We received your order and payment. We'll let you know when we start baking.",
            json!({ "order_id": order_id, "status": OrderStatus::Received }),
        )
    }

    pub fn status_changed(order_id: Uuid, status: OrderStatus) -> Self {
        Self::new(
            "Order update",
            format!("Your order is now {}.", status.label()),
            json!({ "order_id": order_id, "status": status }),
        )
    }
}

/// Where an owner can be reached. Empty fields mean "not registered".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    pub push_tokens: Vec<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// The one entry point services use to reach customers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner_id: Option<Uuid>, notification: Notification) -> DispatchReport;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn resolve(&self, owner_id: Uuid) -> Result<Recipient, NotificationError>;
}

/// A single delivery mechanism (push, email).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Addresses this channel would deliver to; empty means nothing to do.
    fn destinations(&self, recipient: &Recipient) -> Vec<String>;

    async fn deliver(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<(), NotificationError>;
}

/// Reads push tokens and contact emails from the database.
#[derive(Clone)]
pub struct DbRecipientDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbRecipientDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecipientDirectory for DbRecipientDirectory {
    async fn resolve(&self, owner_id: Uuid) -> Result<Recipient, NotificationError> {
        use sea_orm::{ColumnTrait, QueryFilter};

        let push_tokens = push_destination::Entity::find()
            .filter(push_destination::Column::OwnerId.eq(owner_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|d| d.token)
            .collect();
        let email = customer::Entity::find_by_id(owner_id)
            .one(&*self.db)
            .await?
            .map(|c| c.email)
            .filter(|e| !e.trim().is_empty());

        Ok(Recipient { push_tokens, email })
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    directory: Arc<dyn RecipientDirectory>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self {
            directory,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    #[instrument(skip(self, notification), fields(title = %notification.title))]
    async fn notify(&self, owner_id: Option<Uuid>, notification: Notification) -> DispatchReport {
        let Some(owner_id) = owner_id else {
            debug!("Notification skipped, order has no owner");
            return DispatchReport::default();
        };

        let recipient = match self.directory.resolve(owner_id).await {
            Ok(recipient) => recipient,
            Err(e) => {
                warn!(%owner_id, "Could not resolve notification recipient: {}", e);
                return DispatchReport::default();
            }
        };

        let deliveries = self.channels.iter().flat_map(|channel| {
            let notification = &notification;
            channel
                .destinations(&recipient)
                .into_iter()
                .map(move |destination| async move {
                    let result = channel.deliver(&destination, notification).await;
                    if let Err(e) = &result {
                        warn!(
                            %owner_id,
                            channel = channel.name(),
                            "Notification delivery failed: {}",
                            e
                        );
                    }
                    result.is_ok()
                })
        });

        let outcomes = join_all(deliveries).await;
        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let report = DispatchReport {
            delivered,
            failed: outcomes.len() - delivered,
        };
        debug!(%owner_id, delivered = report.delivered, failed = report.failed, "Notification dispatched");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedDirectory(Recipient);

    #[async_trait]
    impl RecipientDirectory for FixedDirectory {
        async fn resolve(&self, _owner_id: Uuid) -> Result<Recipient, NotificationError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl RecipientDirectory for FailingDirectory {
        async fn resolve(&self, _owner_id: Uuid) -> Result<Recipient, NotificationError> {
            Err(NotificationError::Rejected {
                status: 500,
                body: "down".into(),
            })
        }
    }

    /// Push-like channel that fails for tokens starting with `bad`.
    #[derive(Default)]
    struct StubPush {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationChannel for StubPush {
        fn name(&self) -> &'static str {
            "stub-push"
        }

        fn destinations(&self, recipient: &Recipient) -> Vec<String> {
            recipient.push_tokens.clone()
        }

        async fn deliver(&self, destination: &str, _n: &Notification) -> Result<(), NotificationError> {
            if destination.starts_with("bad") {
                return Err(NotificationError::Rejected {
                    status: 400,
                    body: "DeviceNotRegistered".into(),
                });
            }
            self.sent.lock().unwrap().push(destination.to_string());
            Ok(())
        }
    }

    fn sample() -> Notification {
        Notification::status_changed(Uuid::new_v4(), OrderStatus::Ready)
    }

    #[tokio::test]
    async fn one_failing_destination_does_not_stop_the_others() {
        let push = Arc::new(StubPush::default());
        let dispatcher = NotificationDispatcher::new(Arc::new(FixedDirectory(Recipient {
            push_tokens: vec!["bad-token".into(), "good-token".into()],
            email: None,
        })))
        .with_channel(push.clone());

        let report = dispatcher.notify(Some(Uuid::new_v4()), sample()).await;
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(*push.sent.lock().unwrap(), vec!["good-token".to_string()]);
    }

    #[tokio::test]
    async fn unregistered_owner_is_a_silent_no_op() {
        let dispatcher = NotificationDispatcher::new(Arc::new(FixedDirectory(Recipient::default())))
            .with_channel(Arc::new(StubPush::default()));
        let report = dispatcher.notify(Some(Uuid::new_v4()), sample()).await;
        assert_eq!(report.attempted(), 0);

        let report = dispatcher.notify(None, sample()).await;
        assert_eq!(report.attempted(), 0);
    }

    #[tokio::test]
    async fn directory_failure_is_swallowed() {
        let dispatcher = NotificationDispatcher::new(Arc::new(FailingDirectory))
            .with_channel(Arc::new(StubPush::default()));
        let report = dispatcher.notify(Some(Uuid::new_v4()), sample()).await;
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn status_notification_carries_order_metadata() {
        let id = Uuid::new_v4();
        let n = Notification::status_changed(id, OrderStatus::InProduction);
        assert_eq!(n.body, "Your order is now being prepared.");
        assert_eq!(n.metadata["status"], "in_production");
        assert_eq!(n.metadata["order_id"], id.to_string());
    }
}
