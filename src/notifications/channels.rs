use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{Notification, NotificationChannel, NotificationError, Recipient};

pub const EXPO_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

fn http_client(timeout: Duration) -> Result<reqwest::Client, NotificationError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn ensure_success(response: reqwest::Response) -> Result<String, NotificationError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a Value,
    sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    data: Option<PushTicket>,
}

/// Mobile push through an Expo-compatible push service.
#[derive(Clone)]
pub struct ExpoPushChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl ExpoPushChannel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for ExpoPushChannel {
    fn name(&self) -> &'static str {
        "push"
    }

    fn destinations(&self, recipient: &Recipient) -> Vec<String> {
        recipient.push_tokens.clone()
    }

    async fn deliver(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PushMessage {
                to: destination,
                title: &notification.title,
                body: &notification.body,
                data: &notification.metadata,
                sound: "default",
            })
            .send()
            .await?;
        let body = ensure_success(response).await?;

        // The push service answers 200 with a per-message ticket that may still be an error.
        if let Ok(PushResponse { data: Some(ticket) }) = serde_json::from_str(&body) {
            if ticket.status == "error" {
                return Err(NotificationError::Rejected {
                    status: 200,
                    body: ticket.message.unwrap_or(body),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EmailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Transactional email over a bearer-authenticated HTTP API.
#[derive(Clone)]
pub struct HttpEmailChannel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailChannel {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for HttpEmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn destinations(&self, recipient: &Recipient) -> Vec<String> {
        recipient.email.iter().cloned().collect()
    }

    async fn deliver(
        &self,
        destination: &str,
        notification: &Notification,
    ) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmailMessage {
                from: &self.from,
                to: destination,
                subject: &notification.title,
                text: &notification.body,
            })
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification() -> Notification {
        Notification::new("Order update", "Your order is now ready.", json!({"order_id": "o-1"}))
    }

    #[tokio::test]
    async fn push_posts_message_with_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/send"))
            .and(body_partial_json(json!({
                "to": "ExponentPushToken[abc]",
                "title": "Order update",
                "data": {"order_id": "o-1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "ok", "id": "ticket-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel =
            ExpoPushChannel::new(format!("{}/push/send", server.uri()), Duration::from_secs(2))
                .unwrap();
        channel
            .deliver("ExponentPushToken[abc]", &notification())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn push_error_ticket_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "error", "message": "DeviceNotRegistered"}
            })))
            .mount(&server)
            .await;

        let channel = ExpoPushChannel::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = channel.deliver("stale", &notification()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected { body, .. } if body == "DeviceNotRegistered"));
    }

    #[tokio::test]
    async fn email_uses_bearer_auth_and_reports_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer key-1"))
            .and(body_partial_json(json!({"to": "ana@example.com", "subject": "Order update"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"to": "blocked@example.com"})))
            .respond_with(ResponseTemplate::new(422).set_body_string("suppressed"))
            .mount(&server)
            .await;

        let channel = HttpEmailChannel::new(
            server.uri(),
            "key-1",
            "pedidos@bakery.test",
            Duration::from_secs(2),
        )
        .unwrap();
        channel.deliver("ana@example.com", &notification()).await.unwrap();
        assert!(matches!(
            channel.deliver("blocked@example.com", &notification()).await,
            Err(NotificationError::Rejected { status: 422, .. })
        ));
        assert_eq!(
            channel.destinations(&Recipient {
                push_tokens: vec![],
                email: Some("ana@example.com".into())
            }),
            vec!["ana@example.com".to_string()]
        );
    }
}
