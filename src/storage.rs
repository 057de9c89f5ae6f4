//! # Portal Store
//!
//! JSON-file persistence for everything the drive administration core reads
//! and writes outside Google: client records, caller profiles, the audit log
//! and the service-account key.
//!
//! ## Data Structure
//!
//! - **clients**: client records with their shared drive, once assigned
//! - **profiles**: bearer token to caller profile
//! - **auditLog**: append-only audit entries
//! - **secrets**: named secrets (the service-account key)
//! - **timestamp**: Unix timestamp of last modification
//!
//! Every write goes through one async mutex and replaces the file
//! atomically. The in-memory copy only changes after the write succeeded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use portal_drive_admin::audit::{newest_first, AuditLog, AuditLogEntry};
use portal_drive_admin::backend::{assign_in, ClientRepository, ProfileDirectory};
use portal_drive_admin::secrets::SecretStore;
use portal_drive_admin::{Backend, CallerProfile, ClientRecord, PortalError, PortalResult, SecretError};

/// Everything persisted in the store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreData {
    #[serde(default)]
    pub clients: Vec<ClientRecord>,
    #[serde(default)]
    pub profiles: HashMap<String, CallerProfile>,
    #[serde(default)]
    pub audit_log: Vec<AuditLogEntry>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default)]
    pub timestamp: u64,
}

pub struct PortalStore {
    store_path: PathBuf,
    data: Mutex<StoreData>,
}

/// The store file could not be read, parsed or written.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(String);

impl From<StoreError> for PortalError {
    fn from(e: StoreError) -> Self {
        PortalError::Backend(e.0)
    }
}

impl PortalStore {
    /// Open the store at `store_path`; a missing file is an empty store.
    pub async fn open(store_path: impl Into<PathBuf>) -> Result<Arc<Self>, StoreError> {
        let store_path = store_path.into();
        let data = load_data(&store_path).await?.unwrap_or_default();
        debug!(
            path = %store_path.display(),
            clients = data.clients.len(),
            "portal store opened"
        );
        Ok(Arc::new(Self {
            store_path,
            data: Mutex::new(data),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    /// The store as the core's collaborators.
    pub fn backend(self: &Arc<Self>) -> Backend {
        Backend {
            clients: self.clone(),
            profiles: self.clone(),
            audit: self.clone(),
            secrets: self.clone(),
        }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }

    /// Apply `change` to a copy, write it, then keep it.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut StoreData) -> Result<T, PortalError>,
    ) -> Result<T, PortalError> {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        let out = change(&mut next)?;
        next.timestamp = unix_now();
        save_data(&self.store_path, &next).await?;
        *guard = next;
        Ok(out)
    }

    pub async fn upsert_client(&self, client: ClientRecord) -> PortalResult<()> {
        self.update(|data| {
            match data.clients.iter_mut().find(|c| c.id == client.id) {
                Some(existing) => *existing = client,
                None => data.clients.push(client),
            }
            Ok(())
        })
        .await
    }

    pub async fn add_profile(&self, bearer_token: impl Into<String>, profile: CallerProfile) -> PortalResult<()> {
        let token = bearer_token.into();
        self.update(|data| {
            data.profiles.insert(token, profile);
            Ok(())
        })
        .await
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn load_data(path: &Path) -> Result<Option<StoreData>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError(format!("failed to read {}: {e}", path.display()))),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError(format!("failed to parse {}: {e}", path.display())))
}

async fn save_data(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(data).map_err(|e| StoreError(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| StoreError(format!("failed to write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError(format!("failed to replace {}: {e}", path.display())))
}

// ── Core collaborators ───────────────────────────────────────────────

#[async_trait]
impl ClientRepository for PortalStore {
    async fn clients_without_drive(&self) -> PortalResult<Vec<ClientRecord>> {
        let data = self.data.lock().await;
        Ok(data.clients.iter().filter(|c| !c.has_drive()).cloned().collect())
    }

    async fn clients_with_drive(&self) -> PortalResult<Vec<ClientRecord>> {
        let data = self.data.lock().await;
        Ok(data.clients.iter().filter(|c| c.has_drive()).cloned().collect())
    }

    async fn assign_drive(&self, client_id: &str, drive_id: &str, drive_name: &str) -> PortalResult<()> {
        self.update(|data| assign_in(&mut data.clients, client_id, drive_id, drive_name))
            .await
    }
}

#[async_trait]
impl ProfileDirectory for PortalStore {
    async fn resolve(&self, bearer_token: &str) -> PortalResult<Option<CallerProfile>> {
        Ok(self.data.lock().await.profiles.get(bearer_token).cloned())
    }
}

#[async_trait]
impl AuditLog for PortalStore {
    async fn append(&self, entry: AuditLogEntry) -> PortalResult<()> {
        self.update(|data| {
            data.audit_log.push(entry);
            Ok(())
        })
        .await
    }

    async fn recent(&self, limit: usize) -> PortalResult<Vec<AuditLogEntry>> {
        Ok(newest_first(&self.data.lock().await.audit_log, limit))
    }
}

#[async_trait]
impl SecretStore for PortalStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.data.lock().await.secrets.get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str) -> Result<(), SecretError> {
        self.update(|data| {
            data.secrets.insert(name.to_string(), value.to_string());
            Ok(())
        })
        .await
        .map_err(|e| SecretError::Backend(e.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<bool, SecretError> {
        self.update(|data| Ok(data.secrets.remove(name).is_some()))
            .await
            .map_err(|e| SecretError::Backend(e.to_string()))
    }
}
