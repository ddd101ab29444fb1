//! Identity provider seam used by the AuthGate.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::Identity;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The credential is not acceptable: bad signature, expired, revoked.
    #[error("credential rejected: {0}")]
    Rejected(String),

    /// The provider could not give a verdict.
    #[error("identity provider unavailable: {0:#}")]
    Unavailable(anyhow::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Identity, ProviderError>;
}

/// Identity from decoded claims; `sub` must be a non-empty string.
pub(crate) fn identity_from_claims(claims: Map<String, Value>) -> Result<Identity, ProviderError> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();

    Identity::new(subject, claims)
        .ok_or_else(|| ProviderError::Rejected("token has no subject".to_string()))
}

/// Fixed token table for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    tokens: HashMap<String, String>,
    delay: Option<Duration>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, subject: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), subject.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let subject = self
            .tokens
            .get(credential)
            .ok_or_else(|| ProviderError::Rejected("unknown token".to_string()))?;

        let mut claims = Map::new();
        claims.insert("sub".into(), Value::String(subject.clone()));
        identity_from_claims(claims)
    }
}
