use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use std::fs;

use super::identity::{identity_from_claims, IdentityProvider, ProviderError};
use crate::config::{JwtAlgorithm, JwtConfig};
use crate::models::Identity;

/// Verifies signed JWTs locally against a configured key.
#[derive(Clone)]
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
    audience: Option<String>,
}

impl JwtIdentityProvider {
    /// Load the RS256 public key or HS256 secret and build the validation rules.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let (algorithm, decoding_key) = match config.algorithm {
            JwtAlgorithm::RS256 => {
                let path = config.public_key_path.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("identity.jwt.public_key_path is required for RS256")
                })?;
                let pem = fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("Failed to read public key from {}: {}", path, e)
                })?;
                let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;
                (Algorithm::RS256, key)
            }
            JwtAlgorithm::HS256 => {
                let secret = config.shared_secret.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("identity.jwt.shared_secret is required for HS256")
                })?;
                if secret.expose_secret().is_empty() {
                    anyhow::bail!("identity.jwt.shared_secret must not be empty");
                }
                (
                    Algorithm::HS256,
                    DecodingKey::from_secret(secret.expose_secret().as_bytes()),
                )
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_seconds;
        validation.validate_exp = true;
        // Audience is checked by hand: access tokens carry `client_id` instead of `aud`.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        tracing::info!(algorithm = ?algorithm, issuer = ?config.issuer, "JWT identity provider initialized");

        Ok(Self {
            decoding_key,
            validation,
            audience: config.audience.clone(),
        })
    }

    fn check_audience(&self, claims: &Map<String, Value>) -> Result<(), ProviderError> {
        let Some(expected) = self.audience.as_deref() else {
            return Ok(());
        };

        let in_aud = match claims.get("aud") {
            Some(Value::String(aud)) => aud == expected,
            Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(expected)),
            _ => false,
        };
        let in_client_id = claims.get("client_id").and_then(Value::as_str) == Some(expected);

        if in_aud || in_client_id {
            Ok(())
        } else {
            Err(ProviderError::Rejected("audience mismatch".to_string()))
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<Identity, ProviderError> {
        let token = decode::<Map<String, Value>>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| ProviderError::Rejected(format!("invalid token: {}", e)))?;

        self.check_audience(&token.claims)?;
        identity_from_claims(token.claims)
    }
}
