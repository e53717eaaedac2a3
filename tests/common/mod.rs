#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    routing::get,
    Router,
};
use chrono::Utc;
use pharmacart_api::{
    auth::Claims,
    config::AppConfig,
    db,
    entities::{cart_item, customer_address, prescription, prescription_invoice, product},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::gateway::{GatewaySession, PaymentGateway, SessionRequest},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_GATEWAY_SECRET: &str = "test_gateway_secret";

/// Deterministic in-process gateway. Sessions succeed with sequential ids;
/// the widget script fetch can be made to fail to exercise the
/// script-loader gate.
pub struct MockGateway {
    sessions_opened: AtomicUsize,
    script_ok: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicUsize::new(0),
            script_ok: AtomicBool::new(true),
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn set_script_ok(&self, ok: bool) {
        self.script_ok.store(ok, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn open_session(&self, request: SessionRequest) -> Result<GatewaySession, ServiceError> {
        let n = self.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewaySession {
            gateway_session_id: format!("sess_mock_{n}"),
            amount_minor: request.amount_minor,
            currency: request.currency,
        })
    }

    async fn fetch_checkout_script(&self) -> Result<(), ServiceError> {
        if self.script_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServiceError::GatewayError("script unavailable".into()))
        }
    }
}

/// Test application backed by an in-memory SQLite database and the mock
/// gateway. Each instance is fully isolated.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    pub user_id: Uuid,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "test_jwt_secret_that_is_long_enough_for_validation_0123456789abcdef".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.gateway.key_secret = TEST_GATEWAY_SECRET.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let redis_client = Arc::new(
            redis::Client::open(cfg.redis_url.clone()).expect("invalid redis url for tests"),
        );

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            redis_client.clone(),
            gateway.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            event_sender,
            services,
            redis: redis_client,
        };

        let user_id = Uuid::new_v4();
        let token = mint_token(&cfg, user_id);

        let router = Router::new()
            .route(
                "/health",
                get(pharmacart_api::health::simple_health_check),
            )
            .nest("/api/v1", pharmacart_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            user_id,
            token,
            _event_task: event_task,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize request body"))
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

    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, mrp: Decimal) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            mrp: Set(mrp),
            requires_prescription: Set(false),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_cart_item(&self, product_id: Uuid, quantity: i32) -> cart_item::Model {
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed cart item")
    }

    pub async fn seed_default_address(&self) -> customer_address::Model {
        self.seed_address_for(self.user_id).await
    }

    pub async fn seed_address_for(&self, user_id: Uuid) -> customer_address::Model {
        customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            recipient_name: Set("Asha Rao".to_string()),
            phone: Set(Some("9999000011".to_string())),
            address_line_1: Set("14 MG Road".to_string()),
            address_line_2: Set(None),
            city: Set("Bengaluru".to_string()),
            state: Set("Karnataka".to_string()),
            postal_code: Set("560001".to_string()),
            is_default: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    pub async fn seed_invoice(
        &self,
        amount: Decimal,
    ) -> (prescription::Model, prescription_invoice::Model) {
        let rx = prescription::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            status: Set(prescription::PrescriptionStatus::Invoiced),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed prescription");

        let invoice = prescription_invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(format!("INV-{}", &Uuid::new_v4().simple().to_string()[..10])),
            prescription_id: Set(rx.id),
            user_id: Set(self.user_id),
            total_amount: Set(amount),
            status: Set(prescription_invoice::InvoiceStatus::Sent),
            created_at: Set(Utc::now()),
            paid_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed invoice");

        (rx, invoice)
    }

    pub async fn cart_len(&self) -> u64 {
        cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(self.user_id))
            .count(&*self.state.db)
            .await
            .expect("count cart items")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn mint_token(cfg: &AppConfig, user_id: Uuid) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some("test@example.com".to_string()),
        permissions: vec![
            "orders:read".to_string(),
            "orders:create".to_string(),
            "payments:verify".to_string(),
        ],
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
        iss: cfg.auth_issuer.clone(),
        aud: cfg.auth_audience.clone(),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .expect("encode access token")
}

/// Reads a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
