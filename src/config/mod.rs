//! Configuration module for the measures tracker.
//!
//! Server and client settings are loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// How long the JSONP fallback waits for its callback.
pub const DEFAULT_JSONP_TIMEOUT: Duration = Duration::from_millis(8000);

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key required on reads and writes (open when unset)
    pub api_key: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Catalog JSON loaded into the database at startup
    pub catalog_path: Option<PathBuf>,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_key = non_empty_var("MEDIDAS_API_KEY");

        let db_path = env::var("MEDIDAS_DB_PATH")
            .unwrap_or_else(|_| "./data/medidas.sqlite".to_string())
            .into();

        let catalog_path = non_empty_var("MEDIDAS_CATALOG_PATH").map(PathBuf::from);

        let raw_addr =
            env::var("MEDIDAS_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = raw_addr.parse().map_err(|e| {
            AppError::Validation(format!("Invalid MEDIDAS_BIND_ADDR '{}': {}", raw_addr, e))
        })?;

        let log_level = env::var("MEDIDAS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_key,
            db_path,
            catalog_path,
            bind_addr,
            log_level,
        })
    }
}

/// Client-side data source settings.
///
/// The environment only provides defaults; values saved through the tracker session
/// take precedence once persisted.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote endpoint URL
    pub endpoint: Option<String>,
    /// API key sent as `key` on every request
    pub api_key: Option<String>,
    /// Pasted catalog JSON used when the endpoint is missing or failing
    pub inline_json: Option<String>,
    /// JSONP fallback timeout
    pub jsonp_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            inline_json: None,
            jsonp_timeout: DEFAULT_JSONP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Load client defaults from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let jsonp_timeout = env::var("MEDIDAS_JSONP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_JSONP_TIMEOUT);

        Self {
            endpoint: non_empty_var("MEDIDAS_DEFAULT_ENDPOINT"),
            api_key: non_empty_var("MEDIDAS_DEFAULT_API_KEY"),
            inline_json: None,
            jsonp_timeout,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("MEDIDAS_API_KEY");
        env::remove_var("MEDIDAS_DB_PATH");
        env::remove_var("MEDIDAS_CATALOG_PATH");
        env::remove_var("MEDIDAS_BIND_ADDR");
        env::remove_var("MEDIDAS_LOG_LEVEL");

        let config = Config::from_env().unwrap();

        assert!(config.api_key.is_none());
        assert!(config.catalog_path.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/medidas.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_default_client_config() {
        env::remove_var("MEDIDAS_DEFAULT_ENDPOINT");
        env::remove_var("MEDIDAS_DEFAULT_API_KEY");
        env::remove_var("MEDIDAS_JSONP_TIMEOUT_MS");

        let config = ClientConfig::from_env();

        assert!(config.endpoint.is_none());
        assert!(config.api_key.is_none());
        assert!(config.inline_json.is_none());
        assert_eq!(config.jsonp_timeout, Duration::from_secs(8));
    }
}
