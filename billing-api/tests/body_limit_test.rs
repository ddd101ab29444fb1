mod common;

use axum::{
    body::Body,
    http::{header, Method, StatusCode},
};
use common::{assert_cors, authorized, body_json, request, SpyOperations, TestApp};
use serde_json::json;
use std::sync::Arc;

/// Larger than axum's default 2 MB body limit.
const OVERSIZED: usize = 3 * 1024 * 1024;

fn oversized_body() -> Body {
    Body::from(vec![b' '; OVERSIZED])
}

#[tokio::test]
async fn test_oversized_body_without_credential_is_unauthorized() {
    let spy = Arc::new(SpyOperations::new());
    let app = TestApp::new(spy.clone());

    let mut request = request(Method::POST, "/billing/invoices", None, None);
    *request.body_mut() = oversized_body();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    assert_cors(&response, "OPTIONS, POST");
    assert_eq!(body_json(response).await, json!({"message": "Unauthorized"}));
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_payload_too_large_with_cors() {
    let spy = Arc::new(SpyOperations::new());
    let app = TestApp::new(spy.clone());

    for (method, uri, methods) in [
        (Method::POST, "/billing/invoices", "OPTIONS, POST"),
        (Method::PUT, "/billing/invoices/inv-1", "OPTIONS, PUT"),
    ] {
        let mut request = authorized(method, uri, None);
        *request.body_mut() = oversized_body();
        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE, "{}", uri);
        assert_cors(&response, methods);
        assert_eq!(
            body_json(response).await,
            json!({"message": "Request body too large"})
        );
    }

    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_oversized_body_on_unknown_path_is_not_found() {
    let app = TestApp::new(Arc::new(SpyOperations::new()));

    let mut request = authorized(Method::POST, "/billing/receipts", None);
    *request.body_mut() = oversized_body();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors(&response, "OPTIONS, GET, PUT, DELETE, POST");
}
