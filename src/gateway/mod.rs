//! Remote endpoint client.
//!
//! Reads try a plain GET first and retry once through the [`ScriptBridge`] (JSONP) when that
//! fails. Writes are form-encoded POSTs mirrored on a background task: the caller gets a
//! [`MirrorHandle`] it may await or drop, and a failed write is only logged.

mod jsonp;

pub use jsonp::*;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ClientConfig, DEFAULT_JSONP_TIMEOUT};
use crate::errors::AppError;
use crate::models::{fields, Action, Catalog, SharedState, StudentState};
use crate::parser::parse_catalog;

/// Failures talking to the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No endpoint configured
    NoEndpoint,
    /// The configured endpoint is not a URL
    InvalidUrl(String),
    /// Non-2xx answer
    Status(u16),
    /// Connection or body read failure
    Transport(String),
    /// Body was not JSON
    Decode(String),
    /// The JSONP callback never fired
    JsonpTimeout,
    /// The JSONP script did not deliver a usable payload
    Jsonp(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::NoEndpoint => write!(f, "no endpoint configured"),
            GatewayError::InvalidUrl(msg) => write!(f, "invalid endpoint URL: {}", msg),
            GatewayError::Status(code) => write!(f, "HTTP {}", code),
            GatewayError::Transport(msg) => write!(f, "request failed: {}", msg),
            GatewayError::Decode(msg) => write!(f, "invalid JSON response: {}", msg),
            GatewayError::JsonpTimeout => write!(f, "JSONP timeout"),
            GatewayError::Jsonp(msg) => write!(f, "JSONP error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

/// What happened to a mirrored write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    Delivered,
    /// No endpoint configured, nothing was sent.
    Skipped,
    Failed(String),
}

/// Handle to a best-effort write. Dropping it leaves the write running in the background.
#[derive(Debug)]
pub struct MirrorHandle {
    task: Option<JoinHandle<MirrorOutcome>>,
}

impl MirrorHandle {
    fn skipped() -> Self {
        Self { task: None }
    }

    /// Wait for the write to settle.
    pub async fn outcome(self) -> MirrorOutcome {
        match self.task {
            None => MirrorOutcome::Skipped,
            Some(task) => task
                .await
                .unwrap_or_else(|e| MirrorOutcome::Failed(e.to_string())),
        }
    }
}

/// Client for the remote read/write endpoint.
#[derive(Clone)]
pub struct RemoteGateway {
    client: reqwest::Client,
    endpoint: Option<Url>,
    /// Why a configured endpoint was rejected.
    invalid_endpoint: Option<String>,
    api_key: Option<String>,
    bridge: Arc<dyn ScriptBridge>,
    jsonp_timeout: Duration,
}

impl RemoteGateway {
    /// Build a gateway. An unparseable endpoint is logged and every read reports it as
    /// [`GatewayError::InvalidUrl`]; writes are skipped.
    pub fn new(endpoint: Option<&str>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::new();
        let parsed = endpoint.map(|raw| (raw, Url::parse(raw.trim())));
        let (endpoint, invalid_endpoint) = match parsed {
            None => (None, None),
            Some((_, Ok(url))) => (Some(url), None),
            Some((raw, Err(e))) => {
                let reason = format!("{}: {}", raw, e);
                warn!("{}", GatewayError::InvalidUrl(reason.clone()));
                (None, Some(reason))
            }
        };
        Self {
            bridge: Arc::new(HttpScriptBridge::new(client.clone())),
            client,
            endpoint,
            invalid_endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
            jsonp_timeout: DEFAULT_JSONP_TIMEOUT,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.endpoint.as_deref(), config.api_key.clone())
            .with_jsonp_timeout(config.jsonp_timeout)
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn ScriptBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_jsonp_timeout(mut self, timeout: Duration) -> Self {
        self.jsonp_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// Whether an endpoint was configured at all, valid or not.
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() || self.invalid_endpoint.is_some()
    }

    fn read_url(&self, action: Option<&str>) -> Result<Url, GatewayError> {
        let mut url = match (&self.endpoint, &self.invalid_endpoint) {
            (Some(url), _) => url.clone(),
            (None, Some(reason)) => return Err(GatewayError::InvalidUrl(reason.clone())),
            (None, None) => return Err(GatewayError::NoEndpoint),
        };
        if action.is_some() || self.api_key.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(action) = action {
                query.append_pair(fields::ACTION, action);
            }
            if let Some(key) = &self.api_key {
                query.append_pair(fields::KEY, key);
            }
        }
        Ok(url)
    }

    async fn fetch_json(&self, url: Url) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }
        resp.json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// Load through the script bridge, giving up after the JSONP timeout.
    pub async fn jsonp_fetch(&self, url: Url) -> Result<Value, GatewayError> {
        let callback = callback_name();
        let mut url = url;
        url.query_pairs_mut().append_pair("callback", &callback);
        match tokio::time::timeout(self.jsonp_timeout, self.bridge.load(url, &callback)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::JsonpTimeout),
        }
    }

    /// Load and validate the catalog: fetch, then JSONP once if the fetch or its payload fails.
    pub async fn load_catalog(&self) -> Result<Catalog, AppError> {
        let url = self.read_url(None)?;

        let first = match self.fetch_json(url.clone()).await {
            Ok(raw) => parse_catalog(&raw).map_err(AppError::from),
            Err(e) => Err(AppError::from(e)),
        };
        match first {
            Ok(catalog) => Ok(catalog),
            Err(e) => {
                warn!("Catalog fetch failed ({}), retrying with JSONP", e);
                let raw = self.jsonp_fetch(url).await?;
                Ok(parse_catalog(&raw)?)
            }
        }
    }

    /// Load the shared snapshot (`action=estado`). Any failure yields an empty map.
    pub async fn load_shared_state(&self) -> SharedState {
        let Ok(url) = self.read_url(Some("estado")) else {
            return SharedState::new();
        };
        let raw = match self.fetch_json(url.clone()).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Shared state fetch failed ({}), retrying with JSONP", e);
                match self.jsonp_fetch(url).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("Shared state unavailable: {}", e);
                        return SharedState::new();
                    }
                }
            }
        };
        shared_state_from(&raw)
    }

    /// Mirror a write in the background. Failures are logged and never surfaced.
    pub fn mirror(&self, action: &Action) -> MirrorHandle {
        let Some(endpoint) = self.endpoint.clone() else {
            return MirrorHandle::skipped();
        };
        let form = match action_form(action, self.api_key.as_deref()) {
            Ok(form) => form,
            Err(e) => {
                warn!("Could not encode {} action: {}", action.name(), e);
                return MirrorHandle::skipped();
            }
        };
        let client = self.client.clone();
        let name = action.name();
        let task = tokio::spawn(async move {
            match send_form(&client, endpoint, &form).await {
                Ok(_) => {
                    info!(action = name, "Mirrored write delivered");
                    MirrorOutcome::Delivered
                }
                Err(e) => {
                    warn!(action = name, "Mirrored write failed: {}", e);
                    MirrorOutcome::Failed(e.to_string())
                }
            }
        });
        MirrorHandle { task: Some(task) }
    }
}

fn action_form(
    action: &Action,
    api_key: Option<&str>,
) -> Result<Vec<(&'static str, String)>, GatewayError> {
    let mut form = action
        .to_form()
        .map_err(|e| GatewayError::Decode(e.to_string()))?;
    if let Some(key) = api_key {
        form.push((fields::KEY, key.to_string()));
    }
    Ok(form)
}

async fn send_form(
    client: &reqwest::Client,
    endpoint: Url,
    form: &[(&'static str, String)],
) -> Result<Value, GatewayError> {
    let resp = client
        .post(endpoint)
        .form(form)
        .send()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(GatewayError::Status(resp.status().as_u16()));
    }
    Ok(resp.json().await.unwrap_or(Value::Null))
}

/// Pick the `estado` map out of a response, skipping entries that do not deserialize.
fn shared_state_from(raw: &Value) -> SharedState {
    let Some(entries) = raw.get("estado").and_then(Value::as_object) else {
        return SharedState::new();
    };
    entries
        .iter()
        .filter_map(
            |(id, value)| match serde_json::from_value::<StudentState>(value.clone()) {
                Ok(state) => Some((id.clone(), state)),
                Err(e) => {
                    warn!("Skipping unreadable state for {}: {}", id, e);
                    None
                }
            },
        )
        .collect()
}
