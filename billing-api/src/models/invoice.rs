//! Bookkeeping shared by the invoice stores.
//!
//! Invoice payloads are opaque JSON objects. The stores only own the id and
//! the two timestamps; every other field is the caller's business.

use axum::http::StatusCode;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::gateway::OperationError;

pub const INVOICE_ID_FIELD: &str = "invoice_id";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Fields a caller may not set through a request body.
const PROTECTED_FIELDS: [&str; 4] = ["_id", INVOICE_ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

pub type InvoiceDocument = Map<String, Value>;

pub fn new_invoice_id() -> String {
    Uuid::new_v4().to_string()
}

/// Take a request body as an invoice document, dropping protected fields.
///
/// Field names must be storable as-is by every store, so keys starting
/// with `$` or containing `.` are refused at any depth.
pub fn document_from_body(body: Option<Value>) -> Result<InvoiceDocument, OperationError> {
    match body {
        Some(Value::Object(mut document)) => {
            for field in PROTECTED_FIELDS {
                document.remove(field);
            }
            if let Some(key) = find_reserved_key(&document) {
                return Err(OperationError::rejected(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid field name '{}': must not start with '$' or contain '.'", key),
                ));
            }
            Ok(document)
        }
        Some(_) => Err(OperationError::rejected(
            StatusCode::BAD_REQUEST,
            "Invoice payload must be a JSON object",
        )),
        None => Err(OperationError::rejected(
            StatusCode::BAD_REQUEST,
            "Invoice payload is required",
        )),
    }
}

fn find_reserved_key(document: &InvoiceDocument) -> Option<&str> {
    document.iter().find_map(|(key, value)| {
        if key.starts_with('$') || key.contains('.') {
            return Some(key.as_str());
        }
        find_reserved_key_in(value)
    })
}

fn find_reserved_key_in(value: &Value) -> Option<&str> {
    match value {
        Value::Object(document) => find_reserved_key(document),
        Value::Array(items) => items.iter().find_map(find_reserved_key_in),
        _ => None,
    }
}

pub fn stamp_created(document: &mut InvoiceDocument, invoice_id: &str, now: DateTime<Utc>) {
    let now = timestamp(now);
    document.insert(INVOICE_ID_FIELD.into(), Value::String(invoice_id.to_string()));
    document.insert(CREATED_AT_FIELD.into(), Value::String(now.clone()));
    document.insert(UPDATED_AT_FIELD.into(), Value::String(now));
}

/// Overlay `changes` onto `existing`, keeping fields the caller left out.
pub fn apply_update(existing: &mut InvoiceDocument, changes: InvoiceDocument, now: DateTime<Utc>) {
    existing.extend(changes);
    existing.insert(UPDATED_AT_FIELD.into(), Value::String(timestamp(now)));
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `{"message": ..., <key>: <value>}`
pub fn envelope(message: &str, key: &str, value: Value) -> Value {
    let mut body = Map::new();
    body.insert("message".into(), Value::String(message.to_string()));
    body.insert(key.to_string(), value);
    Value::Object(body)
}

pub fn not_found() -> OperationError {
    OperationError::Rejected {
        status: StatusCode::NOT_FOUND,
        body: json!({ "message": "Invoice not found" }),
    }
}

/// Backing store could not be reached or refused the write.
pub fn store_unavailable(err: impl std::fmt::Display) -> OperationError {
    tracing::error!(error = %err, "Invoice store failure");
    OperationError::rejected(StatusCode::FAILED_DEPENDENCY, "Invoice store unavailable")
}
