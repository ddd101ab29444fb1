use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};
use service_core::observability::TracedClientExt;
use std::time::Duration;

use super::identity::{identity_from_claims, IdentityProvider, ProviderError};
use crate::config::IntrospectionConfig;
use crate::models::Identity;

/// Asks an OAuth2 introspection endpoint (RFC 7662) about each token.
#[derive(Clone)]
pub struct IntrospectionIdentityProvider {
    client: reqwest::Client,
    url: String,
    client_id: String,
    client_secret: Secret<String>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(flatten)]
    claims: Map<String, Value>,
}

impl IntrospectionIdentityProvider {
    /// Build the HTTP client with the configured timeout.
    pub fn new(config: &IntrospectionConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build introspection client: {}", e))?;

        tracing::info!(url = %config.url, "Introspection identity provider initialized");

        Ok(Self {
            client,
            url: config.url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for IntrospectionIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity, ProviderError> {
        let response = self
            .client
            .traced_post(&self.url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("token", credential), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(anyhow::anyhow!("introspection request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Introspection endpoint returned an error");
            return Err(ProviderError::Unavailable(anyhow::anyhow!(
                "introspection endpoint returned {}",
                status
            )));
        }

        let introspection: IntrospectionResponse = response.json().await.map_err(|e| {
            ProviderError::Unavailable(anyhow::anyhow!("malformed introspection response: {}", e))
        })?;

        if !introspection.active {
            return Err(ProviderError::Rejected("token is not active".to_string()));
        }

        identity_from_claims(introspection.claims)
    }
}
