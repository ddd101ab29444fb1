use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Listener settings shared by every HTTP service.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Load a service configuration.
///
/// Sources, lowest precedence first: `.env` (via dotenvy), an optional
/// `<file_name>.{yaml,toml,json}` file, then `APP__`-prefixed environment
/// variables where `__` separates nested keys (`APP__SERVER__PORT=9000`).
pub fn load<T: DeserializeOwned>(file_name: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file_name).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);
    }

    #[test]
    fn test_server_config_partial_override() {
        let server: ServerConfig = serde_json::from_str(r#"{"port": 9100}"#).unwrap();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 9100);
    }
}
