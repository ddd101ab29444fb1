use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_document, Bson, Document},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, IndexModel,
};
use serde_json::Value;
use service_core::error::AppError;

use crate::gateway::{
    InvoiceOperations, OperationError, OperationRequest, OperationResponse, OperationResult,
};
use crate::models::invoice::{
    self, document_from_body, envelope, new_invoice_id, stamp_created, timestamp,
    InvoiceDocument, UPDATED_AT_FIELD,
};

const ID_FIELD: &str = "_id";

/// Invoices as opaque documents in one MongoDB collection, keyed by
/// `_id = invoice_id`.
#[derive(Clone)]
pub struct MongoInvoiceStore {
    client: MongoClient,
    invoices: Collection<Document>,
}

impl MongoInvoiceStore {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, collection = %collection, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let invoices = client.database(database).collection(collection);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, invoices })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        let created_at_index = IndexModel::builder()
            .keys(doc! { "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("created_at_order".to_string())
                    .build(),
            )
            .build();

        self.invoices
            .create_index(created_at_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create created_at index on invoices collection: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created index on invoices.created_at");

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}

fn to_bson(document: &InvoiceDocument) -> Result<Document, OperationError> {
    to_document(document)
        .map_err(|e| OperationError::Internal(anyhow::anyhow!("Failed to encode invoice: {}", e)))
}

/// Stored document back to the caller's shape; `_id` is internal.
fn from_bson(mut document: Document) -> Value {
    document.remove(ID_FIELD);
    Bson::Document(document).into_relaxed_extjson()
}

#[async_trait]
impl InvoiceOperations for MongoInvoiceStore {
    async fn create(&self, request: OperationRequest) -> OperationResult {
        let mut document = document_from_body(request.body)?;
        let invoice_id = new_invoice_id();
        stamp_created(&mut document, &invoice_id, Utc::now());

        let mut stored = to_bson(&document)?;
        stored.insert(ID_FIELD, invoice_id.as_str());

        self.invoices
            .insert_one(stored, None)
            .await
            .map_err(invoice::store_unavailable)?;
        tracing::info!(invoice_id = %invoice_id, subject = %request.identity.subject(), "Invoice created");

        Ok(OperationResponse::created(envelope(
            "Invoice created successfully",
            "invoice",
            Value::Object(document),
        )))
    }

    async fn list_all(&self, _request: OperationRequest) -> OperationResult {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();

        let documents: Vec<Document> = self
            .invoices
            .find(None, options)
            .await
            .map_err(invoice::store_unavailable)?
            .try_collect()
            .await
            .map_err(invoice::store_unavailable)?;

        Ok(OperationResponse::ok(envelope(
            "Invoices retrieved successfully",
            "invoices",
            Value::Array(documents.into_iter().map(from_bson).collect()),
        )))
    }

    async fn get_one(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?;
        let document = self
            .invoices
            .find_one(doc! { "_id": invoice_id }, None)
            .await
            .map_err(invoice::store_unavailable)?
            .ok_or_else(invoice::not_found)?;

        Ok(OperationResponse::ok(envelope(
            "Invoice retrieved successfully",
            "invoice",
            from_bson(document),
        )))
    }

    async fn update(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?.to_string();
        let mut changes = to_bson(&document_from_body(request.body)?)?;
        changes.insert(UPDATED_AT_FIELD, timestamp(Utc::now()));

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let document = self
            .invoices
            .find_one_and_update(doc! { "_id": invoice_id.as_str() }, doc! { "$set": changes }, options)
            .await
            .map_err(invoice::store_unavailable)?;
        if document.is_some() {
            tracing::info!(invoice_id = %invoice_id, "Invoice updated");
        }

        updated(document)
    }

    async fn delete(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?;
        let result = self
            .invoices
            .delete_one(doc! { "_id": invoice_id }, None)
            .await
            .map_err(invoice::store_unavailable)?;

        deleted(result.deleted_count, invoice_id)
    }
}

/// `find_one_and_update` yields nothing for an unknown id.
fn updated(document: Option<Document>) -> OperationResult {
    let document = document.ok_or_else(invoice::not_found)?;
    Ok(OperationResponse::ok(envelope(
        "Invoice updated successfully",
        "invoice",
        from_bson(document),
    )))
}

fn deleted(deleted_count: u64, invoice_id: &str) -> OperationResult {
    if deleted_count == 0 {
        return Err(invoice::not_found());
    }
    tracing::info!(invoice_id = %invoice_id, "Invoice deleted");

    Ok(OperationResponse::ok(envelope(
        "Invoice deleted successfully",
        "invoice_id",
        Value::String(invoice_id.to_string()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_bson_conversion_hides_internal_id() {
        let document = json!({"customer": "A", "total": 12, "lines": [{"sku": "x"}]})
            .as_object()
            .cloned()
            .unwrap();

        let mut stored = to_bson(&document).unwrap();
        stored.insert(ID_FIELD, "inv-1");

        assert_eq!(
            from_bson(stored),
            json!({"customer": "A", "total": 12, "lines": [{"sku": "x"}]})
        );
    }

    fn rejected_status(result: OperationResult) -> StatusCode {
        match result {
            Err(OperationError::Rejected { status, body }) => {
                assert_eq!(body, json!({"message": "Invoice not found"}));
                status
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_update_of_unknown_invoice_is_not_found() {
        assert_eq!(rejected_status(updated(None)), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_update_returns_stored_document() {
        let response = updated(Some(doc! { "_id": "inv-1", "invoice_id": "inv-1", "total": 3 })).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.body,
            json!({"message": "Invoice updated successfully", "invoice": {"invoice_id": "inv-1", "total": 3}})
        );
    }

    #[test]
    fn test_delete_of_unknown_invoice_is_not_found() {
        assert_eq!(rejected_status(deleted(0, "inv-1")), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_delete_reports_the_removed_id() {
        let response = deleted(1, "inv-1").unwrap();
        assert_eq!(
            response.body,
            json!({"message": "Invoice deleted successfully", "invoice_id": "inv-1"})
        );
    }
}
