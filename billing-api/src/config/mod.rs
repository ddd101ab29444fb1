use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, ServerConfig};
use service_core::error::AppError;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Budget for the identity check plus the operation, per request.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            allow_origin: default_allow_origin(),
            max_age_seconds: default_max_age_seconds(),
        }
    }
}

impl GatewayConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Jwt,
    Introspection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub kind: IdentityKind,
    #[serde(default)]
    pub jwt: Option<JwtConfig>,
    #[serde(default)]
    pub introspection: Option<IntrospectionConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    RS256,
    HS256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: JwtAlgorithm,
    /// PEM public key, RS256 only.
    #[serde(default)]
    pub public_key_path: Option<String>,
    /// HS256 only.
    #[serde(default)]
    pub shared_secret: Option<Secret<String>>,
    #[serde(default)]
    pub issuer: Option<String>,
    /// Matched against `aud`, or `client_id` for access tokens without one.
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_leeway_seconds")]
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionConfig {
    pub url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    #[serde(default = "default_introspection_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub uri: Option<Secret<String>>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Mirror every invoice into Alegra when present.
    #[serde(default)]
    pub alegra: Option<AlegraConfig>,
}

/// Alegra billing API credentials; requests use HTTP basic auth.
#[derive(Debug, Clone, Deserialize)]
pub struct AlegraConfig {
    #[serde(default = "default_alegra_url")]
    pub base_url: String,
    pub email: String,
    pub api_key: Secret<String>,
    #[serde(default = "default_alegra_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            uri: None,
            database: default_database(),
            collection: default_collection(),
            alegra: None,
        }
    }
}

impl BillingConfig {
    pub fn load() -> Result<Self, AppError> {
        core_config::load("configuration")
    }
}

fn default_service_name() -> String {
    "billing-api".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_deadline_ms() -> u64 {
    10_000
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_max_age_seconds() -> u64 {
    3600
}

fn default_jwt_algorithm() -> JwtAlgorithm {
    JwtAlgorithm::RS256
}

fn default_leeway_seconds() -> u64 {
    30
}

fn default_introspection_timeout_ms() -> u64 {
    5_000
}

fn default_database() -> String {
    "billing".to_string()
}

fn default_collection() -> String {
    "invoices".to_string()
}

fn default_alegra_url() -> String {
    "https://api.alegra.com/api/v1".to_string()
}

fn default_alegra_timeout_ms() -> u64 {
    5_000
}
