//! Alegra mirror: every invoice kept by the primary store is also written to
//! the Alegra billing API.

use async_trait::async_trait;
use axum::http::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use service_core::observability::{TracedClientExt, TracedRequest};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AlegraConfig;
use crate::gateway::{
    InvoiceOperations, OperationError, OperationRequest, OperationResponse, OperationResult,
};
use crate::models::invoice::{
    self, envelope, CREATED_AT_FIELD, INVOICE_ID_FIELD, UPDATED_AT_FIELD,
};

/// A failed call to Alegra.
#[derive(Debug, Error)]
pub enum AlegraError {
    #[error("alegra request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("alegra returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed alegra response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Client for Alegra's `/invoices` resource.
#[derive(Clone)]
pub struct AlegraClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_key: Secret<String>,
}

impl AlegraClient {
    /// Build the HTTP client with the configured timeout.
    pub fn new(config: &AlegraConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Alegra client: {}", e))?;

        tracing::info!(url = %config.base_url, "Alegra mirror initialized");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/invoices", self.base_url)
    }

    fn member_url(&self, invoice_id: &str) -> String {
        format!("{}/invoices/{}", self.base_url, urlencoding::encode(invoice_id))
    }

    async fn send(&self, request: TracedRequest) -> Result<reqwest::Response, AlegraError> {
        Ok(request
            .basic_auth(&self.email, Some(self.api_key.expose_secret()))
            .send()
            .await?)
    }

    /// Body of a successful reply; an empty body reads as `null`.
    async fn read(response: reqwest::Response) -> Result<Value, AlegraError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(AlegraError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn create_invoice(&self, invoice: &Value) -> Result<Value, AlegraError> {
        let url = self.collection_url();
        let response = self.send(self.client.traced_post(&url).json(invoice)).await?;
        Self::read(response).await
    }

    pub async fn list_invoices(&self) -> Result<Value, AlegraError> {
        let url = self.collection_url();
        let response = self.send(self.client.traced_get(&url)).await?;
        Self::read(response).await
    }

    /// `None` when Alegra does not know the invoice.
    pub async fn get_invoice(&self, invoice_id: &str) -> Result<Option<Value>, AlegraError> {
        let url = self.member_url(invoice_id);
        let response = self.send(self.client.traced_get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read(response).await.map(Some)
    }

    pub async fn update_invoice(&self, invoice_id: &str, invoice: &Value) -> Result<Value, AlegraError> {
        let url = self.member_url(invoice_id);
        let response = self.send(self.client.traced_put(&url).json(invoice)).await?;
        Self::read(response).await
    }

    pub async fn delete_invoice(&self, invoice_id: &str) -> Result<Value, AlegraError> {
        let url = self.member_url(invoice_id);
        let response = self.send(self.client.traced_delete(&url)).await?;
        Self::read(response).await
    }
}

/// Primary invoice store with every change mirrored into Alegra.
///
/// Reads fall back to Alegra for invoices the primary store does not hold,
/// and listings carry both sides.
pub struct MirroredInvoiceStore {
    primary: Arc<dyn InvoiceOperations>,
    alegra: AlegraClient,
}

impl MirroredInvoiceStore {
    pub fn new(primary: Arc<dyn InvoiceOperations>, alegra: AlegraClient) -> Self {
        Self { primary, alegra }
    }
}

fn mirror_unavailable(err: AlegraError) -> OperationError {
    tracing::error!(error = %err, "Alegra mirror failure");
    OperationError::rejected(StatusCode::FAILED_DEPENDENCY, "Invoice mirror unavailable")
}

/// The caller's invoice fields; store bookkeeping stays local.
fn mirror_payload(response: &OperationResponse) -> Value {
    let mut payload = response.body["invoice"].clone();
    if let Value::Object(fields) = &mut payload {
        for field in [INVOICE_ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            fields.remove(field);
        }
    }
    payload
}

fn attach(response: &mut OperationResponse, key: &str, value: Value) {
    if let Value::Object(body) = &mut response.body {
        body.insert(key.to_string(), value);
    }
}

#[async_trait]
impl InvoiceOperations for MirroredInvoiceStore {
    async fn create(&self, request: OperationRequest) -> OperationResult {
        let mut response = self.primary.create(request).await?;
        let mirrored = self
            .alegra
            .create_invoice(&mirror_payload(&response))
            .await
            .map_err(mirror_unavailable)?;
        attach(&mut response, "alegra_invoice", mirrored);
        Ok(response)
    }

    async fn list_all(&self, request: OperationRequest) -> OperationResult {
        let mut response = self.primary.list_all(request).await?;
        let mirrored = self
            .alegra
            .list_invoices()
            .await
            .map_err(mirror_unavailable)?;
        attach(&mut response, "alegra_invoices", mirrored);
        Ok(response)
    }

    async fn get_one(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?.to_string();
        match self.primary.get_one(request).await {
            Err(OperationError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND => {
                tracing::debug!(invoice_id = %invoice_id, "Invoice not held locally, asking Alegra");
                let invoice = self
                    .alegra
                    .get_invoice(&invoice_id)
                    .await
                    .map_err(mirror_unavailable)?
                    .ok_or_else(invoice::not_found)?;
                Ok(OperationResponse::ok(envelope(
                    "Invoice retrieved successfully",
                    "invoice",
                    invoice,
                )))
            }
            other => other,
        }
    }

    async fn update(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?.to_string();
        let mut response = self.primary.update(request).await?;
        let mirrored = self
            .alegra
            .update_invoice(&invoice_id, &mirror_payload(&response))
            .await
            .map_err(mirror_unavailable)?;
        attach(&mut response, "alegra_invoice", mirrored);
        Ok(response)
    }

    async fn delete(&self, request: OperationRequest) -> OperationResult {
        let invoice_id = request.invoice_id()?.to_string();
        let mut response = self.primary.delete(request).await?;
        let mirrored = self
            .alegra
            .delete_invoice(&invoice_id)
            .await
            .map_err(mirror_unavailable)?;
        attach(&mut response, "alegra_response", mirrored);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AlegraClient {
        AlegraClient::new(&AlegraConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            email: "ops@example.com".to_string(),
            api_key: Secret::new("key".to_string()),
            timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_invoice_reads_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/invoices/inv-1"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).get_invoice("inv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_reply_reads_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/invoices/inv-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert_eq!(client(&server).delete_invoice("inv-1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/invoices"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad key"})))
            .mount(&server)
            .await;

        let err = client(&server).list_invoices().await.unwrap_err();
        assert!(matches!(
            err,
            AlegraError::Status { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[test]
    fn test_mirror_payload_drops_store_bookkeeping() {
        let response = OperationResponse::created(json!({
            "message": "Invoice created successfully",
            "invoice": {
                "invoice_id": "inv-1",
                "created_at": "2024-01-01T00:00:00.000Z",
                "updated_at": "2024-01-01T00:00:00.000Z",
                "client": "A",
                "total": 10
            }
        }));

        assert_eq!(mirror_payload(&response), json!({"client": "A", "total": 10}));
    }
}
