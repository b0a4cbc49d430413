#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use bakery_orders::{
    config::AppConfig,
    db,
    entities::{customer, filling, product, topping},
    handlers::AppServices,
    notifications::{DispatchReport, Notification, Notifier},
    services::{
        commerce::{CheckoutRequest, CommitOutcome, MemoryCartStore},
        payments::{
            CommitResponse, CreateTransaction, GatewayError, PaymentGateway, TransactionRedirect,
        },
    },
    AppState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const CAKE_ID: i64 = 1;
pub const KUCHEN_ID: i64 = 2;
pub const RETIRED_ID: i64 = 3;
pub const CHOCOLATE_TOPPING: i64 = 1;
pub const MANJAR_FILLING: i64 = 1;

/// In-process stand-in for the card gateway.
///
/// Tokens are handed out by `create_transaction`; committing a token twice
/// answers like the real gateway does (HTTP 422), and `status` then reports
/// the original authorization.
#[derive(Default)]
pub struct FakeGateway {
    transactions: Mutex<HashMap<String, CreateTransaction>>,
    committed: Mutex<HashSet<String>>,
    next_token: AtomicUsize,
    commit_calls: AtomicUsize,
    decline: AtomicBool,
    refuse_create: AtomicBool,
    amount_override: Mutex<Option<i64>>,
}

impl FakeGateway {
    pub fn decline_payments(&self) {
        self.decline.store(true, Ordering::SeqCst);
    }

    pub fn refuse_transactions(&self) {
        self.refuse_create.store(true, Ordering::SeqCst);
    }

    /// Reports this amount as authorized regardless of what was requested.
    pub fn authorize_amount(&self, amount: i64) {
        *self.amount_override.lock().unwrap() = Some(amount);
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn transaction(&self, token: &str) -> Option<CreateTransaction> {
        self.transactions.lock().unwrap().get(token).cloned()
    }

    fn response_for(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        let request = self.transaction(token).ok_or_else(|| GatewayError::Rejected {
            status: 404,
            body: format!("unknown token {}", token),
        })?;
        let declined = self.decline.load(Ordering::SeqCst);
        let amount = self.amount_override.lock().unwrap().unwrap_or(request.amount);

        Ok(CommitResponse {
            vci: Some("TSY".to_string()),
            amount,
            status: if declined { "FAILED" } else { "AUTHORIZED" }.to_string(),
            buy_order: request.buy_order,
            session_id: request.session_id,
            card_detail: None,
            accounting_date: Some("0320".to_string()),
            transaction_date: Some(Utc::now().to_rfc3339()),
            authorization_code: if declined { None } else { Some("1213".to_string()) },
            payment_type_code: Some("VD".to_string()),
            response_code: Some(if declined { -1 } else { 0 }),
            installments_number: Some(0),
        })
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_transaction(
        &self,
        request: &CreateTransaction,
    ) -> Result<TransactionRedirect, GatewayError> {
        if self.refuse_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 401,
                body: "Not Authorized".to_string(),
            });
        }
        let token = format!("tok-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.transactions
            .lock()
            .unwrap()
            .insert(token.clone(), request.clone());
        Ok(TransactionRedirect {
            token,
            url: "https://gateway.test/webpayserver/initTransaction".to_string(),
        })
    }

    async fn commit(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response_for(token)?;
        if !self.committed.lock().unwrap().insert(token.to_string()) {
            return Err(GatewayError::AlreadyProcessed);
        }
        Ok(response)
    }

    async fn status(&self, token: &str) -> Result<CommitResponse, GatewayError> {
        self.response_for(token)
    }
}

/// Keeps every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Option<Uuid>, Notification)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Option<Uuid>, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn for_order(&self, order_id: Uuid) -> Vec<Notification> {
        let id = order_id.to_string();
        self.sent()
            .into_iter()
            .map(|(_, n)| n)
            .filter(|n| n.metadata["order_id"] == Value::String(id.clone()))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, owner_id: Option<Uuid>, notification: Notification) -> DispatchReport {
        self.sent.lock().unwrap().push((owner_id, notification));
        DispatchReport {
            delivered: 1,
            failed: 0,
        }
    }
}

/// Helper harness for spinning up an application state backed by a scratch SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub owner_id: Uuid,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// Same harness with a wider pool, so transactions really overlap.
    pub async fn with_pool_size(max_connections: u32) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("bakery_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        cfg.web_success_url = "https://shop.test/pedido/exito".to_string();
        cfg.web_failure_url = "https://shop.test/pedido/fallido".to_string();
        cfg.mobile_return_url = Some("bakery://payment-return".to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let services = AppServices::new(
            db_arc.clone(),
            &cfg,
            gateway.clone(),
            notifier.clone(),
            Arc::new(MemoryCartStore::new()),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", bakery_orders::api_v1_routes())
            .with_state(state.clone());

        let app = Self {
            router,
            state,
            gateway,
            notifier,
            owner_id: Uuid::new_v4(),
            _db_dir: db_dir,
        };
        app.seed_catalog().await;
        app
    }

    async fn seed_catalog(&self) {
        let db = &*self.state.db;
        let now = Utc::now();
        for (id, name, price, active) in [
            (CAKE_ID, "Torta Tres Leches", dec!(4300), true),
            (KUCHEN_ID, "Kuchen de Nuez", dec!(5200), true),
            (RETIRED_ID, "Pie de Limon", dec!(3900), false),
        ] {
            product::ActiveModel {
                id: Set(id),
                name: Set(name.to_string()),
                image_url: Set(Some(format!("https://cdn.shop.test/{}.jpg", id))),
                price: Set(price),
                sales_count: Set(0),
                is_active: Set(active),
                created_at: Set(now),
            }
            .insert(db)
            .await
            .expect("seed product");
        }

        topping::ActiveModel {
            id: Set(CHOCOLATE_TOPPING),
            name: Set("Chocolate".to_string()),
        }
        .insert(db)
        .await
        .expect("seed topping");

        filling::ActiveModel {
            id: Set(MANJAR_FILLING),
            name: Set("Manjar".to_string()),
        }
        .insert(db)
        .await
        .expect("seed filling");

        customer::ActiveModel {
            id: Set(self.owner_id),
            email: Set("cliente@shop.test".to_string()),
            full_name: Set(Some("Ana Perez".to_string())),
            created_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed customer");
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn sales_count(&self, product_id: i64) -> i64 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists")
            .sales_count
    }

    /// Pickup checkout for the seeded owner.
    pub fn pickup_request(&self, lines: Value) -> CheckoutRequest {
        serde_json::from_value(serde_json::json!({
            "ownerId": self.owner_id,
            "deliveryType": "retiro",
            "lines": lines,
        }))
        .expect("valid checkout request")
    }

    /// Runs checkout and a successful commit, returning the new order.
    pub async fn place_paid_order(&self) -> CommitOutcome {
        let redirect = self
            .state
            .services
            .checkout
            .submit(self.pickup_request(serde_json::json!([
                { "productId": CAKE_ID, "quantity": 2, "unitPrice": 4300 },
                { "productId": KUCHEN_ID, "quantity": 1, "unitPrice": 5200 }
            ])))
            .await
            .expect("checkout succeeds");
        self.state
            .services
            .payment_commit
            .commit(&redirect.token)
            .await
            .expect("commit succeeds")
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Reads a decimal that may have been serialized as a string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}
