use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use pawstore_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{product, ProductModel},
    events::{self, EventSender},
    AppState,
};

/// Test harness backed by a throwaway SQLite database. A single pooled
/// connection keeps concurrent requests serialized, which SQLite requires.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    db_file: String,
    token: String,
    pub user_id: Uuid,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_file = format!("pawstore_test_{}.db", Uuid::new_v4().simple());

        let mut cfg = AppConfig::new(
            format!("sqlite://{db_file}?mode=rwc"),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.shipping_cost = "7.00".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx, db_arc.clone(), None));

        let auth_cfg = AuthConfig::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        );
        let auth_service = Arc::new(AuthService::new(auth_cfg));

        let state = pawstore_api::build_state(db_arc, cfg, event_sender);

        let user_id = Uuid::new_v4();
        let token = auth_service
            .generate_token(
                user_id,
                Some("Test User".to_string()),
                Some("test@example.com".to_string()),
                vec!["admin".to_string(), "customer".to_string()],
            )
            .expect("mint access token");

        let auth_for_layer = auth_service.clone();
        let router = pawstore_api::app_routes()
            .layer(middleware::from_fn_with_state(
                auth_for_layer,
                |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
                 mut req: Request<Body>,
                 next: axum::middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            db_file,
            token,
            user_id,
            auth_service,
            _event_task: event_task,
        }
    }

    /// Access the bearer token for the default test user.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Mint a token for a different user, for access scoping tests.
    #[allow(dead_code)]
    pub fn token_for(&self, user_id: Uuid, roles: Vec<String>) -> String {
        self.auth_service
            .generate_token(user_id, None, None, roles)
            .expect("mint access token")
    }

    /// Send a request against the router with an optional bearer token.
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

    /// Convenience helper for authenticated JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Insert a product directly, bypassing the API surface.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            sku: Set(format!("SKU-{}", Uuid::new_v4().simple())),
            description: Set(format!("{} seeded for integration tests", name)),
            category: Set(Some("treats".to_string())),
            brand: Set(Some("PawBrand".to_string())),
            pet_type: Set(Some("dog".to_string())),
            price: Set(price),
            discount_price: Set(None),
            stock: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model
            .insert(&*self.state.db)
            .await
            .expect("seed product for tests")
    }

    /// Read back a product's current stock.
    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        use sea_orm::EntityTrait;

        pawstore_api::entities::Product::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Read a JSON body out of a response.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is valid json")
}

/// Parse a monetary JSON field into a `Decimal`. Database round-trips do not
/// preserve trailing zeros in the serialized form, so tests compare values,
/// never rendered strings.
#[allow(dead_code)]
pub fn money(value: &Value) -> Decimal {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
        .parse()
        .expect("monetary field parses as decimal")
}
