//! Response envelope: JSON bodies, passthrough status, CORS on every outcome.

use axum::{
    http::{
        header::{self, HeaderMap, HeaderValue, InvalidHeaderValue},
        Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use super::error::GatewayError;
use super::operations::OperationResponse;

const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// Process-wide CORS settings every route policy is derived from.
#[derive(Debug, Clone)]
pub struct CorsSettings {
    allow_origin: HeaderValue,
    max_age: HeaderValue,
}

impl CorsSettings {
    /// Fails when `allow_origin` is not a valid header value.
    pub fn new(allow_origin: &str, max_age_seconds: u64) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(allow_origin)?,
            max_age: HeaderValue::from(max_age_seconds),
        })
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            max_age: HeaderValue::from_static("3600"),
        }
    }
}

/// CORS response headers for one route or path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    methods: Vec<Method>,
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl CorsPolicy {
    /// `OPTIONS` is always allowed and listed first.
    pub fn new(settings: &CorsSettings, methods: &[Method]) -> Result<Self, InvalidHeaderValue> {
        let mut allowed = vec![Method::OPTIONS];
        for method in methods {
            if !allowed.contains(method) {
                allowed.push(method.clone());
            }
        }

        let allow_methods = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            methods: allowed,
            allow_origin: settings.allow_origin.clone(),
            allow_methods: HeaderValue::from_str(&allow_methods)?,
            allow_headers: HeaderValue::from_static(ALLOWED_HEADERS),
            max_age: settings.max_age.clone(),
        })
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Insert the four CORS headers, replacing any already set.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allow_origin.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers.clone(),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
    }
}

/// JSON body with CORS; a 204 carries no body.
pub fn json(status: StatusCode, body: &Value, cors: &CorsPolicy) -> Response {
    let mut response = if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(body)).into_response()
    };
    cors.apply(response.headers_mut());
    response
}

/// Operation result, status and body untouched.
pub fn dispatched(outcome: &OperationResponse, cors: &CorsPolicy) -> Response {
    json(outcome.status, &outcome.body, cors)
}

/// Gateway failure; unauthenticated requests also get `WWW-Authenticate: Bearer`.
pub fn failure(err: &GatewayError, cors: &CorsPolicy) -> Response {
    let mut response = json(err.status(), &err.body(), cors);
    if err.is_unauthenticated() {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer"),
        );
    }
    response
}

/// Empty 204 answering an OPTIONS preflight.
pub fn preflight(cors: &CorsPolicy) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_lists_options_first_without_duplicates() {
        let policy = CorsPolicy::new(
            &CorsSettings::default(),
            &[Method::GET, Method::OPTIONS, Method::PUT],
        )
        .unwrap();
        assert_eq!(
            policy.methods(),
            &[Method::OPTIONS, Method::GET, Method::PUT]
        );
    }

    #[test]
    fn test_apply_sets_all_cors_headers() {
        let settings = CorsSettings::new("https://app.example.com", 600).unwrap();
        let policy = CorsPolicy::new(&settings, &[Method::POST]).unwrap();

        let mut headers = HeaderMap::new();
        policy.apply(&mut headers);

        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "OPTIONS, POST");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "600");
    }

    #[test]
    fn test_json_sets_content_type_and_status() {
        let policy = CorsPolicy::new(&CorsSettings::default(), &[Method::GET]).unwrap();
        let response = json(
            StatusCode::ACCEPTED,
            &serde_json::json!({"message": "queued"}),
            &policy,
        );
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        assert!(CorsSettings::new("bad\norigin", 60).is_err());
    }
}
