//! Backend collaborators the core consumes.
//!
//! The portal's database owns clients and profiles; the core only sees the
//! narrow traits below. Every service gets them injected through [`Backend`],
//! and the in-memory implementations stand in for the database in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::audit::{AuditLog, MemoryAuditLog};
use crate::error::{PortalError, PortalResult};
use crate::secrets::{MemorySecretStore, SecretStore};

/// Portal role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

/// Profile of the caller of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerProfile {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl CallerProfile {
    pub fn admin(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with `Forbidden` unless the caller is an administrator.
    pub fn require_admin(&self) -> PortalResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(PortalError::Forbidden(format!(
                "{} is not an administrator",
                self.username
            )))
        }
    }
}

/// The slice of a client record drive provisioning reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    pub company_name: String,
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub drive_name: Option<String>,
}

impl ClientRecord {
    pub fn new(id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company_name: company_name.into(),
            drive_id: None,
            drive_name: None,
        }
    }

    pub fn has_drive(&self) -> bool {
        self.drive_id.as_deref().map_or(false, |d| !d.is_empty())
    }
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn clients_without_drive(&self) -> PortalResult<Vec<ClientRecord>>;

    async fn clients_with_drive(&self) -> PortalResult<Vec<ClientRecord>>;

    /// Record the drive created for a client.
    ///
    /// A drive id, once assigned, is immutable: assigning to a client that
    /// already has one fails.
    async fn assign_drive(&self, client_id: &str, drive_id: &str, drive_name: &str)
        -> PortalResult<()>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Resolve a bearer token to its profile; `Ok(None)` for unknown tokens.
    async fn resolve(&self, bearer_token: &str) -> PortalResult<Option<CallerProfile>>;
}

/// Assign a drive to a client held in a plain list.
pub fn assign_in(
    clients: &mut [ClientRecord],
    client_id: &str,
    drive_id: &str,
    drive_name: &str,
) -> PortalResult<()> {
    let client = clients
        .iter_mut()
        .find(|c| c.id == client_id)
        .ok_or_else(|| PortalError::Backend(format!("client {client_id} does not exist")))?;
    if client.has_drive() {
        return Err(PortalError::Backend(format!(
            "client {client_id} already has drive {}",
            client.drive_id.as_deref().unwrap_or_default()
        )));
    }
    client.drive_id = Some(drive_id.to_string());
    client.drive_name = Some(drive_name.to_string());
    Ok(())
}

/// Clients and profiles held in memory.
#[derive(Default)]
pub struct MemoryDirectory {
    clients: RwLock<Vec<ClientRecord>>,
    profiles: RwLock<HashMap<String, CallerProfile>>,
    failing_assignments: RwLock<Vec<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_client(&self, client: ClientRecord) {
        self.clients.write().await.push(client);
    }

    pub async fn add_profile(&self, token: impl Into<String>, profile: CallerProfile) {
        self.profiles.write().await.insert(token.into(), profile);
    }

    /// Make `assign_drive` fail for this client.
    pub async fn fail_assignment(&self, client_id: impl Into<String>) {
        self.failing_assignments.write().await.push(client_id.into());
    }

    pub async fn client(&self, client_id: &str) -> Option<ClientRecord> {
        self.clients
            .read()
            .await
            .iter()
            .find(|c| c.id == client_id)
            .cloned()
    }
}

#[async_trait]
impl ClientRepository for MemoryDirectory {
    async fn clients_without_drive(&self) -> PortalResult<Vec<ClientRecord>> {
        Ok(self
            .clients
            .read()
            .await
            .iter()
            .filter(|c| !c.has_drive())
            .cloned()
            .collect())
    }

    async fn clients_with_drive(&self) -> PortalResult<Vec<ClientRecord>> {
        Ok(self
            .clients
            .read()
            .await
            .iter()
            .filter(|c| c.has_drive())
            .cloned()
            .collect())
    }

    async fn assign_drive(
        &self,
        client_id: &str,
        drive_id: &str,
        drive_name: &str,
    ) -> PortalResult<()> {
        if self.failing_assignments.read().await.iter().any(|id| id == client_id) {
            return Err(PortalError::Backend(format!(
                "could not update client {client_id}"
            )));
        }
        let mut clients = self.clients.write().await;
        assign_in(&mut clients, client_id, drive_id, drive_name)
    }
}

#[async_trait]
impl ProfileDirectory for MemoryDirectory {
    async fn resolve(&self, bearer_token: &str) -> PortalResult<Option<CallerProfile>> {
        Ok(self.profiles.read().await.get(bearer_token).cloned())
    }
}

/// The collaborators every service is constructed with.
#[derive(Clone)]
pub struct Backend {
    pub clients: Arc<dyn ClientRepository>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub audit: Arc<dyn AuditLog>,
    pub secrets: Arc<dyn SecretStore>,
}

/// A fully in-memory backend plus handles to its concrete parts.
pub struct MemoryBackend {
    pub directory: Arc<MemoryDirectory>,
    pub audit: Arc<MemoryAuditLog>,
    pub secrets: Arc<MemorySecretStore>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            directory: MemoryDirectory::new(),
            audit: MemoryAuditLog::new(),
            secrets: MemorySecretStore::new(),
        }
    }

    pub fn backend(&self) -> Backend {
        Backend {
            clients: self.directory.clone(),
            profiles: self.directory.clone(),
            audit: self.audit.clone(),
            secrets: self.secrets.clone(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partitions_by_drive() {
        let dir = MemoryDirectory::new();
        dir.add_client(ClientRecord::new("c1", "Acme")).await;
        dir.add_client(ClientRecord {
            drive_id: Some("0A1".into()),
            drive_name: Some("Beta".into()),
            ..ClientRecord::new("c2", "Beta")
        })
        .await;
        dir.add_client(ClientRecord {
            drive_id: Some(String::new()),
            ..ClientRecord::new("c3", "Gamma")
        })
        .await;

        let without: Vec<_> = dir.clients_without_drive().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(without, vec!["c1", "c3"]);
        assert_eq!(dir.clients_with_drive().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drive_id_is_immutable() {
        let dir = MemoryDirectory::new();
        dir.add_client(ClientRecord::new("c1", "Acme")).await;
        dir.assign_drive("c1", "0A1", "Acme").await.unwrap();
        let err = dir.assign_drive("c1", "0A2", "Acme").await.unwrap_err();
        assert!(matches!(err, PortalError::Backend(_)));
        assert_eq!(dir.client("c1").await.unwrap().drive_id.as_deref(), Some("0A1"));
    }

    #[tokio::test]
    async fn unknown_client_cannot_be_assigned() {
        let dir = MemoryDirectory::new();
        assert!(dir.assign_drive("ghost", "0A1", "x").await.is_err());
    }

    #[tokio::test]
    async fn resolves_profiles_by_token() {
        let dir = MemoryDirectory::new();
        dir.add_profile("tok-admin", CallerProfile::admin("u1", "alice")).await;
        assert!(dir.resolve("tok-admin").await.unwrap().unwrap().is_admin());
        assert!(dir.resolve("nope").await.unwrap().is_none());
    }

    #[test]
    fn client_role_is_forbidden() {
        let caller = CallerProfile {
            user_id: "u2".into(),
            username: "bob".into(),
            role: Role::Client,
        };
        assert!(matches!(caller.require_admin(), Err(PortalError::Forbidden(_))));
        assert!(CallerProfile::admin("u1", "alice").require_admin().is_ok());
    }
}
