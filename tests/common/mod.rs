#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use order_service::{
    config::AppConfig,
    db::{self, DbConfig},
    errors::{ServiceError, Upstream},
    events::{self, EventSender},
    repositories::OrderRepository,
    services::{
        catalog::{ProductValidator, ValidatedProduct},
        orders::OrderService,
        payments::{PaymentSession, PaymentSessionRequest, PaymentSessionRequester},
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// In-process stand-in for the product catalog. Answers with every known
/// product whose id was requested, like the real service.
#[derive(Default)]
pub struct StubCatalog {
    products: Mutex<Vec<ValidatedProduct>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl StubCatalog {
    pub fn with_products(products: Vec<ValidatedProduct>) -> Self {
        Self {
            products: Mutex::new(products),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the catalog contents, e.g. to simulate a rename or repricing.
    pub fn set_products(&self, products: Vec<ValidatedProduct>) {
        *self.products.lock().unwrap() = products;
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductValidator for StubCatalog {
    async fn validate(&self, product_ids: &[String]) -> Result<Vec<ValidatedProduct>, ServiceError> {
        self.calls.lock().unwrap().push(product_ids.to_vec());
        let products = self.products.lock().unwrap();
        Ok(products
            .iter()
            .filter(|p| product_ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

/// Records every session request; can be switched into failure mode.
#[derive(Default)]
pub struct StubPayments {
    requests: Mutex<Vec<PaymentSessionRequest>>,
    failing: Mutex<bool>,
}

impl StubPayments {
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn requests(&self) -> Vec<PaymentSessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentSessionRequester for StubPayments {
    async fn request_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let order_id = request.order_id;
        self.requests.lock().unwrap().push(request);
        if *self.failing.lock().unwrap() {
            return Err(ServiceError::upstream(Upstream::Payments, "stub outage"));
        }
        Ok(PaymentSession {
            id: Some(format!("cs_{}", order_id.simple())),
            url: format!("https://checkout.test/{}", order_id),
            success_url: Some("https://shop.test/success".into()),
            cancel_url: Some("https://shop.test/cancel".into()),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::new(
        "sqlite::memory:".to_string(),
        "http://catalog.test".to_string(),
        "http://payments.test".to_string(),
        "127.0.0.1".to_string(),
        18_082,
        "test".to_string(),
    )
}

/// Fresh single-connection in-memory database with the schema applied.
pub async fn test_db() -> Arc<DatabaseConnection> {
    let pool = db::establish_connection_with_config(&DbConfig::sqlite_in_memory())
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    Arc::new(pool)
}

/// Helper harness wiring the real repository and router to stub upstreams.
pub struct TestApp {
    router: Router,
    pub repository: OrderRepository,
    pub catalog: Arc<StubCatalog>,
    pub payments: Arc<StubPayments>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new(products: Vec<ValidatedProduct>) -> Self {
        Self::with_config(products, test_config()).await
    }

    pub async fn with_config(products: Vec<ValidatedProduct>, cfg: AppConfig) -> Self {
        let db = test_db().await;
        let repository = OrderRepository::new(db.clone());
        let catalog = Arc::new(StubCatalog::with_products(products));
        let payments = Arc::new(StubPayments::default());

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let order_service = OrderService::new(
            Arc::new(repository.clone()),
            catalog.clone(),
            payments.clone(),
            Some(Arc::new(EventSender::new(event_tx))),
        );

        let state = AppState {
            db,
            config: cfg,
            order_service: Arc::new(order_service),
        };

        Self {
            router: order_service::app(state),
            repository,
            catalog,
            payments,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let body = body.map(|json| serde_json::to_vec(&json).expect("serialize json body"));
        self.raw_request(method, uri, body, headers).await
    }

    pub async fn raw_request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(bytes) => {
                builder = builder.header("content-type", "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn product(id: &str, name: &str, price: Decimal) -> ValidatedProduct {
    ValidatedProduct::new(id, name, price)
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
