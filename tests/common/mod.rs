#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use retail_pos_api::{
    config::AppConfig,
    db,
    events::{self, Event, EventHandler, EventSender},
    handlers::{AppServices, BUSINESS_ID_HEADER},
    health::HealthState,
    middleware_helpers::request_id_middleware,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Collects every event the processing loop sees.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for EventLog {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A seeded tenant with its default location.
#[derive(Debug, Clone, Copy)]
pub struct Tenant {
    pub business_id: Uuid,
    pub location_id: Uuid,
}

/// Application state and router backed by an in-memory SQLite database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub events: Arc<EventLog>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<TempDir>,
}

impl TestApp {
    /// A single in-memory connection: every request runs one after another.
    pub async fn new() -> Self {
        Self::with_database("sqlite::memory:".to_string(), 1, None).await
    }

    /// A file-backed database with `connections` pooled connections, so spawned
    /// tasks really hit the database at the same time.
    pub async fn file_backed(connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("pos.db").display());
        Self::with_database(url, connections, Some(dir)).await
    }

    async fn with_database(url: String, connections: u32, dir: Option<TempDir>) -> Self {
        let mut cfg = AppConfig::new(url, "127.0.0.1".to_string(), 18_080, "test".to_string());
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = EventSender::new(event_tx);
        let log = Arc::new(EventLog::default());
        let handler: Arc<dyn EventHandler> = log.clone();
        let event_task = tokio::spawn(events::process_events(event_rx, vec![handler]));

        let services = AppServices::new(db_arc.clone(), event_sender.clone());
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            health: HealthState::new(),
        };

        let router = retail_pos_api::app_router()
            .layer(axum::middleware::from_fn(request_id_middleware))
            .with_state(state.clone());

        Self {
            router,
            state,
            events: log,
            _event_task: event_task,
            _db_dir: dir,
        }
    }

    /// Sends a request, optionally scoped to a business.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        business_id: Option<Uuid>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = business_id {
            builder = builder.header(BUSINESS_ID_HEADER, id.to_string());
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

    /// Sends a request and decodes the JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        business_id: Option<Uuid>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, business_id).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is not json")
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, tenant: &Tenant) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None, Some(tenant.business_id)).await
    }

    pub async fn post(&self, uri: &str, body: Value, tenant: &Tenant) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body), Some(tenant.business_id))
            .await
    }

    pub async fn put(&self, uri: &str, body: Value, tenant: &Tenant) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(body), Some(tenant.business_id))
            .await
    }

    /// Onboards a business through the API and returns its default location.
    pub async fn onboard(&self, name: &str, email: Option<&str>) -> Tenant {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/businesses",
                Some(json!({ "name": name, "email": email, "alert_channel": "email" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "onboarding failed: {body}");
        Tenant {
            business_id: uuid_at(&body, "/data/id"),
            location_id: uuid_at(&body, "/data/locations/0/id"),
        }
    }

    pub async fn add_location(&self, tenant: &Tenant, name: &str) -> Uuid {
        let (status, body) = self
            .post("/api/locations", json!({ "name": name }), tenant)
            .await;
        assert_eq!(status, StatusCode::CREATED, "location create failed: {body}");
        uuid_at(&body, "/data/id")
    }

    /// Creates a product with stock at the tenant's default location.
    pub async fn seed_product(
        &self,
        tenant: &Tenant,
        sku: &str,
        price: &str,
        quantity: i32,
        reorder_level: i32,
    ) -> Uuid {
        let (status, body) = self
            .post(
                "/api/products",
                json!({
                    "name": format!("Product {sku}"),
                    "sku": sku,
                    "price": price,
                    "reorder_level": reorder_level,
                    "stock": [{ "location_id": tenant.location_id, "quantity": quantity }]
                }),
                tenant,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "product create failed: {body}");
        uuid_at(&body, "/data/id")
    }

    /// Current quantity of a product at a location, read through the API.
    pub async fn stock_at(&self, tenant: &Tenant, product_id: Uuid, location_id: Uuid) -> i64 {
        let (status, body) = self
            .get(&format!("/api/products/{product_id}"), tenant)
            .await;
        assert_eq!(status, StatusCode::OK, "product fetch failed: {body}");
        body["data"]["stock"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .find(|row| row["location_id"] == json!(location_id))
                    .and_then(|row| row["quantity"].as_i64())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Waits for the event loop to drain whatever was sent so far.
    pub async fn settle_events(&self) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn uuid_at(body: &Value, pointer: &str) -> Uuid {
    let raw = body
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing uuid at {pointer} in {body}"));
    Uuid::parse_str(raw).expect("invalid uuid")
}

/// Decimals come back as strings; SQLite may drop trailing zeros.
pub fn decimal_at(body: &Value, pointer: &str) -> Decimal {
    match body.pointer(pointer) {
        Some(Value::String(s)) => Decimal::from_str(s).expect("invalid decimal"),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).expect("invalid decimal"),
        other => panic!("missing decimal at {pointer}: {other:?}"),
    }
}
