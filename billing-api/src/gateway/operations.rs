//! Contract between the gateway and the invoice collaborators.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use super::router::PathParams;
use crate::models::Identity;

/// Path parameter carrying the invoice id on member routes.
pub const INVOICE_ID_PARAM: &str = "invoice_id";

/// The invoice operation a route dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    ListAll,
    GetOne,
    Update,
    Delete,
}

impl Operation {
    /// Name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create_invoice",
            Operation::ListAll => "list_invoices",
            Operation::GetOne => "get_invoice",
            Operation::Update => "update_invoice",
            Operation::Delete => "delete_invoice",
        }
    }

    /// Run this operation against `operations`.
    pub async fn invoke(
        self,
        operations: &dyn InvoiceOperations,
        request: OperationRequest,
    ) -> OperationResult {
        match self {
            Operation::Create => operations.create(request).await,
            Operation::ListAll => operations.list_all(request).await,
            Operation::GetOne => operations.get_one(request).await,
            Operation::Update => operations.update(request).await,
            Operation::Delete => operations.delete(request).await,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an operation receives from the gateway.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub identity: Identity,
    pub params: PathParams,
    /// Parsed JSON body, only for operations that take one.
    pub body: Option<Value>,
}

impl OperationRequest {
    /// The `invoice_id` path parameter of member routes.
    pub fn invoice_id(&self) -> Result<&str, OperationError> {
        self.params.get(INVOICE_ID_PARAM).ok_or_else(|| {
            OperationError::rejected(StatusCode::BAD_REQUEST, "invoice_id is required")
        })
    }
}

/// Status and body returned to the caller unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl OperationResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn created(body: Value) -> Self {
        Self::new(StatusCode::CREATED, body)
    }
}

/// How an operation failed.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Handler-reported failure; status and body reach the caller as-is.
    #[error("operation rejected the request with status {status}")]
    Rejected { status: StatusCode, body: Value },

    /// Unexpected failure, reported as a generic 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Rejection with a `{"message": ...}` body.
    pub fn rejected(status: StatusCode, message: impl Into<String>) -> Self {
        OperationError::Rejected {
            status,
            body: json!({ "message": message.into() }),
        }
    }
}

pub type OperationResult = Result<OperationResponse, OperationError>;

/// The five invoice operations. Persistence and business rules live behind
/// this trait.
#[async_trait]
pub trait InvoiceOperations: Send + Sync {
    async fn create(&self, request: OperationRequest) -> OperationResult;
    async fn list_all(&self, request: OperationRequest) -> OperationResult;
    async fn get_one(&self, request: OperationRequest) -> OperationResult;
    async fn update(&self, request: OperationRequest) -> OperationResult;
    async fn delete(&self, request: OperationRequest) -> OperationResult;
}
