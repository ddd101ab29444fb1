use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::gateway::{InvoiceOperations, OperationRequest, OperationResponse, OperationResult};
use crate::models::invoice::{
    self, apply_update, document_from_body, envelope, new_invoice_id, stamp_created,
    InvoiceDocument, CREATED_AT_FIELD,
};

/// Process-local invoice store.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceStore {
    invoices: Arc<DashMap<String, InvoiceDocument>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }
}

#[async_trait]
impl InvoiceOperations for InMemoryInvoiceStore {
    async fn create(&self, request: OperationRequest) -> OperationResult {
        let mut document = document_from_body(request.body)?;
        let invoice_id = new_invoice_id();
        stamp_created(&mut document, &invoice_id, Utc::now());

        self.invoices.insert(invoice_id.clone(), document.clone());
        tracing::info!(invoice_id = %invoice_id, subject = %request.identity.subject(), "Invoice created");

        Ok(OperationResponse::created(envelope(
            "Invoice created successfully",
            "invoice",
            Value::Object(document),
        )))
    }

    async fn list_all(&self, _request: OperationRequest) -> OperationResult {
        let mut invoices: Vec<InvoiceDocument> = self
            .invoices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        invoices.sort_by(|a, b| {
            let created = |doc: &InvoiceDocument| {
                doc.get(CREATED_AT_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_default()
            };
            created(a).cmp(&created(b))
        });

        Ok(OperationResponse::ok(envelope(
            "Invoices retrieved successfully",
            "invoices",
            Value::Array(invoices.into_iter().map(Value::Object).collect()),
        )))
    }

    async fn get_one(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?;
        let document = self
            .invoices
            .get(invoice_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(invoice::not_found)?;

        Ok(OperationResponse::ok(envelope(
            "Invoice retrieved successfully",
            "invoice",
            Value::Object(document),
        )))
    }

    async fn update(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?.to_string();
        let changes = document_from_body(request.body)?;

        let document = {
            let mut entry = self
                .invoices
                .get_mut(&invoice_id)
                .ok_or_else(invoice::not_found)?;
            apply_update(entry.value_mut(), changes, Utc::now());
            entry.value().clone()
        };
        tracing::info!(invoice_id = %invoice_id, "Invoice updated");

        Ok(OperationResponse::ok(envelope(
            "Invoice updated successfully",
            "invoice",
            Value::Object(document),
        )))
    }

    async fn delete(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?;
        self.invoices
            .remove(invoice_id)
            .ok_or_else(invoice::not_found)?;
        tracing::info!(invoice_id = %invoice_id, "Invoice deleted");

        Ok(OperationResponse::ok(envelope(
            "Invoice deleted successfully",
            "invoice_id",
            Value::String(invoice_id.to_string()),
        )))
    }
}
