//! Secret accessor for the service-account key.
//!
//! The key lives only in a server-side [`SecretStore`]. It is read fresh on
//! every operation so a rotated or revoked key takes effect immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use tokio::sync::RwLock;
use tracing::{debug, info};

use portal_gdrive::ServiceAccountKey;

use crate::error::SecretError;

/// Server-side key/value secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when nothing is stored under `name`.
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError>;

    /// Store `value`, replacing any previous value.
    async fn put(&self, name: &str, value: &str) -> Result<(), SecretError>;

    /// Remove the value; `Ok(false)` when there was nothing to remove.
    async fn delete(&self, name: &str) -> Result<bool, SecretError>;
}

/// In-process secret store.
#[derive(Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemorySecretStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the store being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SecretError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SecretError::Unavailable("secret store is unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError> {
        self.check()?;
        Ok(self.values.read().await.get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str) -> Result<(), SecretError> {
        self.check()?;
        self.values.write().await.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, SecretError> {
        self.check()?;
        Ok(self.values.write().await.remove(name).is_some())
    }
}

/// Decode a `setSecret` payload: raw key JSON, or base64 of it.
pub fn decode_secret_payload(raw: &str) -> Result<ServiceAccountKey, SecretError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SecretError::Malformed("secret payload is empty".into()));
    }

    let json = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let compact: String = trimmed.split_whitespace().collect();
        let bytes = STANDARD
            .decode(&compact)
            .or_else(|_| URL_SAFE.decode(&compact))
            .map_err(|_| SecretError::Malformed("payload is neither JSON nor base64".into()))?;
        String::from_utf8(bytes)
            .map_err(|_| SecretError::Malformed("decoded payload is not UTF-8".into()))?
    };

    let key = ServiceAccountKey::from_json(&json).map_err(|e| SecretError::Malformed(e.message))?;
    key.validate().map_err(|e| SecretError::Malformed(e.message))?;
    Ok(key)
}

/// Reads and writes the service-account key under a configured name.
#[derive(Clone)]
pub struct SecretAccessor {
    store: Arc<dyn SecretStore>,
    name: String,
}

impl SecretAccessor {
    pub fn new(store: Arc<dyn SecretStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Load and parse the stored key.
    ///
    /// `NotConfigured` (nothing stored) and `Unavailable` (store unreachable)
    /// are kept apart so callers never report a network outage as missing.
    pub async fn get_service_account_key(&self) -> Result<ServiceAccountKey, SecretError> {
        let raw = self
            .store
            .get(&self.name)
            .await?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SecretError::NotConfigured(self.name.clone()))?;

        let key = ServiceAccountKey::from_json(&raw).map_err(|e| SecretError::Malformed(e.message))?;
        debug!(client_email = %key.client_email, "loaded service account key");
        Ok(key)
    }

    /// Decode, validate and store a key, replacing any previous one.
    pub async fn store_service_account_key(
        &self,
        payload: &str,
    ) -> Result<ServiceAccountKey, SecretError> {
        let key = decode_secret_payload(payload)?;
        let canonical = serde_json::to_string(&key)
            .map_err(|e| SecretError::Malformed(format!("cannot encode key: {e}")))?;
        self.store.put(&self.name, &canonical).await?;
        info!(client_email = %key.client_email, "service account key stored");
        Ok(key)
    }

    /// Remove the stored key.
    pub async fn clear(&self) -> Result<bool, SecretError> {
        let removed = self.store.delete(&self.name).await?;
        info!(removed, "service account key cleared");
        Ok(removed)
    }
}
