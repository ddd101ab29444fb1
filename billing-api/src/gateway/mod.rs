//! Request pipeline: preflight, AuthGate, Router, InvoiceOperations, response.

pub mod auth;
pub mod error;
pub mod operations;
pub mod response;
pub mod router;

use axum::{
    body::Bytes,
    extract::rejection::BytesRejection,
    http::{HeaderMap, Method},
    response::Response,
};
use metrics::counter;
use serde_json::Value;
use service_core::middleware::metrics::RouteLabel;
use std::{sync::Arc, time::Duration};
use tokio::time::{timeout_at, Instant};

pub use auth::{bearer_credential, AuthError, AuthGate};
pub use error::GatewayError;
pub use operations::{
    InvoiceOperations, Operation, OperationError, OperationRequest, OperationResponse,
    OperationResult,
};
pub use response::{CorsPolicy, CorsSettings};
pub use router::{BodyRule, PathParams, RouteNotFound, RouteTable};

const UNMATCHED_ROUTE: &str = "unmatched";

/// Request body as the server read it, or why it refused to.
pub type RequestBody = Result<Bytes, BytesRejection>;

/// Preflight, AuthGate, Router and InvoiceOperations behind one entry point.
#[derive(Clone)]
pub struct Gateway {
    routes: Arc<RouteTable>,
    auth: AuthGate,
    operations: Arc<dyn InvoiceOperations>,
    deadline: Duration,
}

impl Gateway {
    /// Gateway over a fixed route table; `deadline` bounds each request.
    pub fn new(
        routes: RouteTable,
        auth: AuthGate,
        operations: Arc<dyn InvoiceOperations>,
        deadline: Duration,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            auth,
            operations,
            deadline,
        }
    }

    /// Run one request to its single terminal outcome.
    pub async fn handle(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: RequestBody,
        request_id: Option<&str>,
    ) -> Response {
        let request_id = request_id.unwrap_or_default();

        if method == Method::OPTIONS {
            return self.preflight(path, request_id);
        }

        let deadline = Instant::now() + self.deadline;
        let cors = self.routes.cors_for(&method, path);

        let dispatch = self.dispatch(&method, path, headers, body, deadline).await;
        let operation = dispatch
            .operation
            .map(|op| op.as_str())
            .unwrap_or(UNMATCHED_ROUTE);

        let mut response = match &dispatch.outcome {
            Ok(result) => {
                tracing::info!(
                    request_id = %request_id,
                    operation = %operation,
                    status = %result.status,
                    "Request dispatched"
                );
                count(operation, "dispatched");
                response::dispatched(result, cors)
            }
            Err(err) => {
                log_failure(err, request_id, operation, &method, path);
                count(operation, err.outcome());
                response::failure(err, cors)
            }
        };

        response.extensions_mut().insert(RouteLabel(dispatch.label));
        response
    }

    fn preflight(&self, path: &str, request_id: &str) -> Response {
        let (mut response, label) = match self.routes.preflight(path) {
            Some((pattern, cors)) => {
                tracing::debug!(request_id = %request_id, route = %pattern.as_str(), "Preflight");
                count("preflight", "dispatched");
                (response::preflight(cors), pattern.as_str().to_string())
            }
            None => {
                let err = GatewayError::from(RouteNotFound {
                    method: Method::OPTIONS,
                    path: path.to_string(),
                });
                log_failure(&err, request_id, "preflight", &Method::OPTIONS, path);
                count("preflight", err.outcome());
                (
                    response::failure(&err, self.routes.fallback_cors()),
                    UNMATCHED_ROUTE.to_string(),
                )
            }
        };
        response.extensions_mut().insert(RouteLabel(label));
        response
    }

    /// AuthGate, then Router, then the operation, all bounded by `deadline`.
    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: RequestBody,
        deadline: Instant,
    ) -> Dispatch {
        let identity = match self
            .auth
            .authenticate(bearer_credential(headers), deadline)
            .await
        {
            Ok(identity) => identity,
            Err(err) => return Dispatch::unmatched(err.into()),
        };

        let resolved = match self.routes.resolve(method, path) {
            Ok(resolved) => resolved,
            Err(err) => return Dispatch::unmatched(err.into()),
        };

        let route = resolved.route;
        let mut dispatch = Dispatch {
            operation: Some(route.operation),
            label: route.pattern.as_str().to_string(),
            outcome: Err(GatewayError::Timeout),
        };

        let body = match body
            .map_err(GatewayError::from)
            .and_then(|body| decode_body(route.body, &body))
        {
            Ok(body) => body,
            Err(err) => {
                dispatch.outcome = Err(err);
                return dispatch;
            }
        };

        let request = OperationRequest {
            identity,
            params: resolved.params,
            body,
        };

        let call = route.operation.invoke(self.operations.as_ref(), request);
        dispatch.outcome = match timeout_at(deadline, call).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(OperationError::Rejected { status, body })) => {
                Ok(OperationResponse::new(status, body))
            }
            Ok(Err(OperationError::Internal(err))) => Err(GatewayError::Internal(err)),
            Err(_) => Err(GatewayError::Timeout),
        };
        dispatch
    }
}

/// How far a request got and where it ended.
struct Dispatch {
    operation: Option<Operation>,
    /// Route pattern for metric labels.
    label: String,
    outcome: Result<OperationResponse, GatewayError>,
}

impl Dispatch {
    fn unmatched(err: GatewayError) -> Self {
        Self {
            operation: None,
            label: UNMATCHED_ROUTE.to_string(),
            outcome: Err(err),
        }
    }
}

/// Parse the body for routes that take one; ignore it everywhere else.
fn decode_body(rule: BodyRule, body: &[u8]) -> Result<Option<Value>, GatewayError> {
    match rule {
        BodyRule::Absent => Ok(None),
        BodyRule::Required => {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Err(GatewayError::Validation("Request body is required".into()));
            }
            serde_json::from_slice(body)
                .map(Some)
                .map_err(|err| GatewayError::Validation(format!("Malformed JSON body: {}", err)))
        }
    }
}

fn count(operation: &'static str, outcome: &'static str) {
    counter!("gateway_outcomes_total", "operation" => operation, "outcome" => outcome).increment(1);
}

fn log_failure(err: &GatewayError, request_id: &str, operation: &str, method: &Method, path: &str) {
    match err {
        GatewayError::Auth(AuthError::Missing | AuthError::Invalid(_)) => {
            tracing::info!(request_id = %request_id, method = %method, error = %err, "Request unauthenticated");
        }
        GatewayError::RouteNotFound(_)
        | GatewayError::Validation(_)
        | GatewayError::UnreadableBody(_) => {
            tracing::info!(request_id = %request_id, method = %method, path = %path, error = %err, "Request rejected");
        }
        GatewayError::Auth(_) | GatewayError::Timeout | GatewayError::Internal(_) => {
            tracing::error!(request_id = %request_id, operation = %operation, error = %err, "Request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_requires_content() {
        assert!(matches!(
            decode_body(BodyRule::Required, b""),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            decode_body(BodyRule::Required, b"  \n"),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_decode_body_rejects_malformed_json() {
        let err = decode_body(BodyRule::Required, b"{\"customer\":").unwrap_err();
        assert!(err.to_string().contains("Malformed JSON body"));
    }

    #[test]
    fn test_decode_body_ignores_body_when_absent() {
        assert_eq!(decode_body(BodyRule::Absent, b"not json").unwrap(), None);
        assert_eq!(
            decode_body(BodyRule::Required, br#"{"customer":"A"}"#).unwrap(),
            Some(serde_json::json!({"customer": "A"}))
        );
    }
}
