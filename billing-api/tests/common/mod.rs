//! Shared setup for billing-api integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use billing_api::{
    gateway::{
        AuthGate, CorsSettings, Gateway, InvoiceOperations, Operation, OperationError,
        OperationRequest, OperationResponse, OperationResult, RouteTable,
    },
    services::{IdentityProvider, MockIdentityProvider},
    startup::build_router,
    AppState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

pub const VALID_TOKEN: &str = "valid-token";
pub const TEST_SUBJECT: &str = "user-123";

/// What the spy answers with.
#[derive(Clone)]
pub enum SpyReply {
    Ok(StatusCode, Value),
    Reject(StatusCode, Value),
    Fail(&'static str),
}

/// Records every call and answers with a canned reply.
pub struct SpyOperations {
    calls: Mutex<Vec<(Operation, OperationRequest)>>,
    reply: SpyReply,
    delay: Option<Duration>,
}

impl SpyOperations {
    pub fn new() -> Self {
        Self::replying(SpyReply::Ok(StatusCode::OK, json!({"message": "ok"})))
    }

    pub fn replying(reply: SpyReply) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(Operation, OperationRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn record(&self, operation: Operation, request: OperationRequest) -> OperationResult {
        self.calls.lock().unwrap().push((operation, request));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            SpyReply::Ok(status, body) => Ok(OperationResponse::new(*status, body.clone())),
            SpyReply::Reject(status, body) => Err(OperationError::Rejected {
                status: *status,
                body: body.clone(),
            }),
            SpyReply::Fail(reason) => Err(OperationError::Internal(anyhow::anyhow!(*reason))),
        }
    }
}

#[async_trait]
impl InvoiceOperations for SpyOperations {
    async fn create(&self, request: OperationRequest) -> OperationResult {
        self.record(Operation::Create, request).await
    }

    async fn list_all(&self, request: OperationRequest) -> OperationResult {
        self.record(Operation::ListAll, request).await
    }

    async fn get_one(&self, request: OperationRequest) -> OperationResult {
        self.record(Operation::GetOne, request).await
    }

    async fn update(&self, request: OperationRequest) -> OperationResult {
        self.record(Operation::Update, request).await
    }

    async fn delete(&self, request: OperationRequest) -> OperationResult {
        self.record(Operation::Delete, request).await
    }
}

pub fn mock_provider() -> MockIdentityProvider {
    MockIdentityProvider::new().with_token(VALID_TOKEN, TEST_SUBJECT)
}

pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new(operations: Arc<dyn InvoiceOperations>) -> Self {
        Self::with_provider(
            operations,
            Arc::new(mock_provider()),
            Duration::from_secs(5),
        )
    }

    pub fn with_provider(
        operations: Arc<dyn InvoiceOperations>,
        provider: Arc<dyn IdentityProvider>,
        deadline: Duration,
    ) -> Self {
        let cors = CorsSettings::default();
        let routes = RouteTable::invoices(&cors).expect("Failed to build route table");
        let gateway = Gateway::new(routes, AuthGate::new(provider), operations, deadline);
        let router = build_router(AppState::new(gateway, "billing-api"));
        Self { router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        self.send(authorized(method, uri, body)).await
    }
}

pub fn authorized(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    request(method, uri, Some(&format!("Bearer {}", VALID_TOKEN)), body)
}

pub fn request(
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Asserts the CORS headers every gateway response carries.
pub fn assert_cors(response: &Response<Body>, methods: &str) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], methods);
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type, Authorization"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
}
