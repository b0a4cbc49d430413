//! Client for the hosted card payment gateway.
//!
//! The flow is create -> shopper pays on the gateway's page -> commit. A
//! transaction can be committed exactly once; a second commit is answered
//! with `422`, after which [`PaymentGateway::status`] reports the outcome of
//! the first one.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{config::AppConfig, errors::ServiceError};

const TRANSACTIONS_PATH: &str = "rswebpaytransaction/api/webpay/v1.2/transactions";
const API_KEY_ID_HEADER: &str = "Tbk-Api-Key-Id";
const API_KEY_SECRET_HEADER: &str = "Tbk-Api-Key-Secret";

/// Longest `buy_order` the gateway accepts
pub const MAX_BUY_ORDER_LEN: usize = 26;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("transaction was already committed")]
    AlreadyProcessed,
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AlreadyProcessed => ServiceError::Conflict(err.to_string()),
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

/// Derives the merchant-side order reference from a pending cart id.
pub fn buy_order_for(pending_cart_id: Uuid) -> String {
    let mut reference = pending_cart_id.simple().to_string();
    reference.truncate(MAX_BUY_ORDER_LEN);
    reference
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateTransaction {
    pub buy_order: String,
    pub session_id: String,
    /// Whole units of the store currency
    pub amount: i64,
    pub return_url: String,
}

/// Where to send the shopper to pay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionRedirect {
    pub token: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CardDetail {
    pub card_number: Option<String>,
}

/// Result of a commit or status query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitResponse {
    pub vci: Option<String>,
    pub amount: i64,
    pub status: String,
    pub buy_order: String,
    pub session_id: String,
    pub card_detail: Option<CardDetail>,
    pub accounting_date: Option<String>,
    pub transaction_date: Option<String>,
    pub authorization_code: Option<String>,
    pub payment_type_code: Option<String>,
    pub response_code: Option<i32>,
    pub installments_number: Option<i32>,
}

impl CommitResponse {
    pub fn is_authorized(&self) -> bool {
        self.response_code == Some(0) && self.status == "AUTHORIZED"
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(
        &self,
        request: &CreateTransaction,
    ) -> Result<TransactionRedirect, GatewayError>;

    /// Settles the transaction. Fails with [`GatewayError::AlreadyProcessed`]
    /// when the token was committed before.
    async fn commit(&self, token: &str) -> Result<CommitResponse, GatewayError>;

    async fn status(&self, token: &str) -> Result<CommitResponse, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error_message: Option<String>,
}

/// HTTP implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct WebpayGateway {
    client: reqwest::Client,
    base_url: String,
    commerce_code: String,
    api_key: String,
}

impl WebpayGateway {
    pub fn new(
        base_url: impl Into<String>,
        commerce_code: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            commerce_code: commerce_code.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.gateway_base_url.clone(),
            config.gateway_commerce_code.clone(),
            config.gateway_api_key.clone(),
            config.gateway_timeout(),
        )
    }

    fn url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("{}/{}/{}", self.base_url, TRANSACTIONS_PATH, token),
            None => format!("{}/{}", self.base_url, TRANSACTIONS_PATH),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<&CreateTransaction>,
    ) -> Result<T, GatewayError> {
        let mut request = self
            .client
            .request(method, url)
            .header(API_KEY_ID_HEADER, &self.commerce_code)
            .header(API_KEY_SECRET_HEADER, &self.api_key);
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), "Gateway responded");

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let message = serde_json::from_str::<GatewayErrorBody>(&text)
                .ok()
                .and_then(|b| b.error_message)
                .unwrap_or_default();
            warn!(%message, "Gateway refused to process transaction again");
            return Err(GatewayError::AlreadyProcessed);
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for WebpayGateway {
    #[instrument(skip(self, request), fields(buy_order = %request.buy_order, amount = request.amount))]
    async fn create_transaction(
        &self,
        request: &CreateTransaction,
    ) -> Result<TransactionRedirect, GatewayError> {
        self.send(Method::POST, self.url(None), Some(request)).await
    }

    #[instrument(skip(self))]
    async fn commit(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        self.send(Method::PUT, self.url(Some(token)), None).await
    }

    #[instrument(skip(self))]
    async fn status(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        self.send(Method::GET, self.url(Some(token)), None).await
    }
}
