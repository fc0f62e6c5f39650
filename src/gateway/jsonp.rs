//! Script-callback (JSONP) fallback for reads that fail as plain fetches.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::GatewayError;

/// Loads a URL whose response calls `callback(<json>)` and hands back the JSON argument.
#[async_trait]
pub trait ScriptBridge: Send + Sync {
    async fn load(&self, url: Url, callback: &str) -> Result<Value, GatewayError>;
}

/// Fetches the script over HTTP and unwraps the callback invocation.
#[derive(Debug, Clone)]
pub struct HttpScriptBridge {
    client: reqwest::Client,
}

impl HttpScriptBridge {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScriptBridge for HttpScriptBridge {
    async fn load(&self, url: Url, callback: &str) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        unwrap_callback(&body, callback)
    }
}

/// A fresh global-safe callback name.
pub fn callback_name() -> String {
    format!("__medidas_cb_{}", uuid::Uuid::new_v4().simple())
}

/// Whether `name` is a plain (dotted) JavaScript identifier.
pub fn is_valid_callback(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    name.len() <= 128
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}

/// Extract the JSON argument of `callback(...)`, tolerating a `/**/` prefix and a trailing `;`.
pub fn unwrap_callback(body: &str, callback: &str) -> Result<Value, GatewayError> {
    let body = body.trim();
    let body = body.strip_prefix("/**/").unwrap_or(body).trim_start();
    let inner = body
        .strip_prefix(callback)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .map(|rest| rest.trim_end().trim_end_matches(';').trim_end())
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| {
            GatewayError::Jsonp(format!("response does not invoke callback {}", callback))
        })?;
    serde_json::from_str(inner).map_err(|e| GatewayError::Jsonp(e.to_string()))
}
