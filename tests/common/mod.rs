#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::Value;
use storefront_api::{
    auth::{user, AuthConfig, AuthService},
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::product::{self, Category},
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        catalog::NewProduct,
        checkout::CheckoutSettings,
        payment_gateway::{CreateIntentRequest, GatewayError, PaymentGateway, PaymentIntent},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_secret_key_with_32_plus_chars";

/// In-process stand-in for Stripe. Records every create request.
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<CreateIntentRequest>>,
    pub fail: AtomicBool,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn recorded(&self) -> Vec<CreateIntentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 401,
                message: "Invalid API Key provided (invalid_request_error)".into(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let intent = PaymentIntent {
            id: format!("pi_fake_{n}"),
            amount: request.amount,
            currency: request.currency.clone(),
            status: "requires_payment_method".into(),
            client_secret: Some(format!("pi_fake_{n}_secret_abc")),
            metadata: request.metadata.clone(),
        };
        self.requests.lock().unwrap().push(request);
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        Ok(PaymentIntent {
            id: intent_id.to_string(),
            amount: 0,
            currency: "usd".into(),
            status: "succeeded".into(),
            client_secret: None,
            metadata: Default::default(),
        })
    }
}

/// SQLite file under the temp dir, removed together with its WAL files on drop.
pub struct TempDatabase {
    path: PathBuf,
}

impl TempDatabase {
    pub fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!("storefront-{label}-{}.db", Uuid::new_v4()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Helper harness for spinning up the router against a SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub auth: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
    _database: Option<TempDatabase>,
}

impl TestApp {
    /// Router over an in-memory database. One connection so every query
    /// sees the same database.
    pub async fn new() -> Self {
        Self::with_database("sqlite::memory:".to_string(), 1, None).await
    }

    /// Router over a SQLite file with a real multi-connection pool, so
    /// concurrent requests run on separate connections.
    pub async fn file_backed(max_connections: u32) -> Self {
        let database = TempDatabase::new("concurrency");
        Self::with_database(database.url(), max_connections, Some(database)).await
    }

    async fn with_database(
        database_url: String,
        max_connections: u32,
        database: Option<TempDatabase>,
    ) -> Self {
        let cfg = AppConfig::new(
            database_url,
            TEST_JWT_SECRET.to_string(),
            "sk_test_fake".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg), db_arc.clone()));
        let services = AppServices::new(
            db_arc.clone(),
            gateway.clone(),
            event_sender,
            CheckoutSettings::from(&cfg),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            auth: auth.clone(),
        };

        Self {
            router: build_router(state.clone()),
            state,
            gateway,
            auth,
            _event_task: event_task,
            _database: database,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).expect("request"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error")
    }

    /// An unpersisted account plus a valid token for it.
    pub async fn user_with_token(&self, name: &str, email: &str) -> (user::Model, String) {
        let now = Utc::now();
        let account = user::Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "unused".to_string(),
            created_at: now,
            updated_at: now,
        };
        let token = self.auth.generate_token(&account).expect("token");
        (account, token)
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .catalog
            .import_products(
                vec![NewProduct {
                    name: name.to_string(),
                    price,
                    stock,
                    category: Category::Sneaker,
                    image: "/images/shoe.jpg".to_string(),
                }],
                false,
            )
            .await
            .expect("seed product")
            .remove(0)
    }

    pub async fn stock_of(&self, id: Uuid) -> Option<i32> {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("product lookup")
            .map(|p| p.stock)
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
