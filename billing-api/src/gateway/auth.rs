//! AuthGate: every non-preflight request passes here before routing.

use axum::http::{header, HeaderMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::models::Identity;
use crate::services::identity::{IdentityProvider, ProviderError};

/// Why a request did not authenticate.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    Missing,

    #[error("invalid bearer credential: {0}")]
    Invalid(String),

    #[error("identity provider unavailable: {0:#}")]
    Unavailable(anyhow::Error),

    #[error("identity provider exceeded the request deadline")]
    Timeout,
}

/// Checks the bearer credential of every non-preflight request.
#[derive(Clone)]
pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthGate {
    /// Gate backed by `provider`, consulted once per request.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Single attempt, bounded by `deadline`.
    pub async fn authenticate(
        &self,
        credential: Option<&str>,
        deadline: Instant,
    ) -> Result<Identity, AuthError> {
        let credential = credential.ok_or(AuthError::Missing)?;

        match timeout_at(deadline, self.provider.verify(credential)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(ProviderError::Rejected(reason))) => Err(AuthError::Invalid(reason)),
            Ok(Err(ProviderError::Unavailable(err))) => Err(AuthError::Unavailable(err)),
            Err(_) => Err(AuthError::Timeout),
        }
    }
}

/// Token from `Authorization: Bearer <token>` or a bare `Authorization: <token>`.
///
/// Other schemes (e.g. `Basic`) and blank values count as no credential.
pub fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();

    let token = match value.split_once(char::is_whitespace) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        Some(_) => return None,
        None if value.eq_ignore_ascii_case("bearer") => return None,
        None => value,
    };

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::MockIdentityProvider;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_credential(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_credential(&headers("bearer   abc ")), Some("abc"));
    }

    #[test]
    fn test_bare_token_is_accepted() {
        assert_eq!(bearer_credential(&headers("eyJhbGciOi.x.y")), Some("eyJhbGciOi.x.y"));
    }

    #[test]
    fn test_blank_and_foreign_schemes_are_missing() {
        assert_eq!(bearer_credential(&HeaderMap::new()), None);
        assert_eq!(bearer_credential(&headers("")), None);
        assert_eq!(bearer_credential(&headers("Bearer ")), None);
        assert_eq!(bearer_credential(&headers("Basic dXNlcjpwYXNz")), None);
    }

    #[tokio::test]
    async fn test_authenticate_maps_provider_verdicts() {
        let gate = AuthGate::new(Arc::new(
            MockIdentityProvider::new().with_token("good", "user-1"),
        ));
        let deadline = Instant::now() + Duration::from_secs(5);

        let identity = gate.authenticate(Some("good"), deadline).await.unwrap();
        assert_eq!(identity.subject(), "user-1");

        assert!(matches!(
            gate.authenticate(Some("bad"), deadline).await,
            Err(AuthError::Invalid(_))
        ));
        assert!(matches!(
            gate.authenticate(None, deadline).await,
            Err(AuthError::Missing)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_honours_deadline() {
        let gate = AuthGate::new(Arc::new(
            MockIdentityProvider::new()
                .with_token("good", "user-1")
                .with_delay(Duration::from_millis(200)),
        ));
        let deadline = Instant::now() + Duration::from_millis(20);

        assert!(matches!(
            gate.authenticate(Some("good"), deadline).await,
            Err(AuthError::Timeout)
        ));
    }
}
