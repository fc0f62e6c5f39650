//! Key-value persistence port used by the client session.
//!
//! The whole shared state is stored as one JSON blob under [`keys::STATE`]; the data
//! source settings live under their own keys.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{SharedState, StudentState};

/// Fixed storage keys.
pub mod keys {
    pub const STATE: &str = "medidas_estado_v1";
    pub const ENDPOINT: &str = "gs_endpoint";
    pub const INLINE_JSON: &str = "gs_inline_json";
    pub const API_KEY: &str = "gs_api_key";
}

/// String storage addressed by fixed keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

/// In-process store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Read the persisted snapshot. Missing or unreadable snapshots start empty.
pub async fn load_shared_state(store: &dyn KeyValueStore) -> SharedState {
    let raw = match store.get(keys::STATE).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return SharedState::new(),
        Err(e) => {
            tracing::warn!("Could not read state snapshot: {}", e);
            return SharedState::new();
        }
    };
    let entries: Map<String, Value> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Discarding unreadable state snapshot: {}", e);
            return SharedState::new();
        }
    };
    // One bad student must not cost the others their state.
    entries
        .into_iter()
        .filter_map(
            |(id, value)| match serde_json::from_value::<StudentState>(value) {
                Ok(state) => Some((id, state)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable state for {}: {}", id, e);
                    None
                }
            },
        )
        .collect()
}

/// Overwrite the persisted snapshot.
pub async fn save_shared_state(
    store: &dyn KeyValueStore,
    shared: &SharedState,
) -> Result<(), AppError> {
    let raw = serde_json::to_string(shared)?;
    store.set(keys::STATE, &raw).await
}

/// A stored setting, with empty strings read as unset.
pub async fn load_setting(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(value) => value.filter(|v| !v.trim().is_empty()),
        Err(e) => {
            tracing::warn!("Could not read setting {}: {}", key, e);
            None
        }
    }
}
