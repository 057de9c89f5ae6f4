//! The Drive operations the portal depends on, behind a trait.
//!
//! `GDriveClient` is the production implementation. `SimulatedDrive` keeps
//! drives and permissions in memory so callers can be tested without a
//! network, and lets a test inject per-drive failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::GDriveClient;
use crate::types::*;
use crate::{about, drives, sharing};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Authenticated access to the Drive API.
///
/// Implementations must be `Send + Sync` so a client can be shared across
/// the tasks of a provisioning batch.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Identity and storage quota of the authenticated principal.
    async fn about(&self) -> GDriveResult<DriveAbout>;

    /// Create a shared drive; `request_id` is the idempotency key.
    async fn create_drive(&self, name: &str, request_id: &str) -> GDriveResult<SharedDrive>;

    /// Every permission currently on a shared drive.
    async fn list_permissions(&self, drive_id: &str) -> GDriveResult<Vec<DrivePermission>>;

    /// Grant a permission on a shared drive.
    async fn create_permission(
        &self,
        drive_id: &str,
        request: &CreatePermissionRequest,
    ) -> GDriveResult<DrivePermission>;
}

#[async_trait]
impl DriveApi for GDriveClient {
    async fn about(&self) -> GDriveResult<DriveAbout> {
        about::get_about(self).await
    }

    async fn create_drive(&self, name: &str, request_id: &str) -> GDriveResult<SharedDrive> {
        drives::create_drive(self, name, request_id).await
    }

    async fn list_permissions(&self, drive_id: &str) -> GDriveResult<Vec<DrivePermission>> {
        sharing::list_all_permissions(self, drive_id).await
    }

    async fn create_permission(
        &self,
        drive_id: &str,
        request: &CreatePermissionRequest,
    ) -> GDriveResult<DrivePermission> {
        sharing::create_permission(self, drive_id, request).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated drive (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
struct SimDrive {
    name: String,
    permissions: Vec<DrivePermission>,
}

#[derive(Default)]
struct SimState {
    drives: HashMap<String, SimDrive>,
    /// requestId → drive id, so a repeated create returns the first drive.
    request_ids: HashMap<String, String>,
    /// Keyed by drive id or drive name.
    create_failures: HashMap<String, GDriveError>,
    grant_failures: HashMap<String, GDriveError>,
    list_failures: HashMap<String, GDriveError>,
    /// Fails every call when set.
    outage: Option<GDriveError>,
    next_id: usize,
}

/// A fully in-memory Drive.
pub struct SimulatedDrive {
    state: Mutex<SimState>,
    about: DriveAbout,
    create_calls: AtomicUsize,
    permission_writes: AtomicUsize,
}

impl SimulatedDrive {
    /// An empty drive store whose `about` reports `principal`.
    pub fn new(principal: impl Into<String>) -> Arc<Self> {
        Self::with_about(DriveAbout {
            user_display_name: "Simulated Admin".into(),
            user_email: principal.into(),
            storage_used: 0,
            storage_limit: 0,
            can_create_drives: true,
        })
    }

    pub fn with_about(about: DriveAbout) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState::default()),
            about,
            create_calls: AtomicUsize::new(0),
            permission_writes: AtomicUsize::new(0),
        })
    }

    /// Seed an existing drive with no permissions.
    pub async fn insert_drive(&self, id: impl Into<String>, name: impl Into<String>) {
        let mut st = self.state.lock().await;
        st.drives.insert(
            id.into(),
            SimDrive {
                name: name.into(),
                permissions: Vec::new(),
            },
        );
    }

    /// Seed a permission on an existing drive.
    pub async fn insert_permission(&self, drive_id: &str, permission: DrivePermission) {
        let mut st = self.state.lock().await;
        if let Some(drive) = st.drives.get_mut(drive_id) {
            drive.permissions.push(permission);
        }
    }

    /// Make `create_drive` fail for drives with this name.
    pub async fn fail_create(&self, name: impl Into<String>, err: GDriveError) {
        self.state.lock().await.create_failures.insert(name.into(), err);
    }

    /// Make `create_permission` fail on the drive with this id or name.
    pub async fn fail_grant(&self, drive: impl Into<String>, err: GDriveError) {
        self.state.lock().await.grant_failures.insert(drive.into(), err);
    }

    /// Make `list_permissions` fail on the drive with this id or name.
    pub async fn fail_list(&self, drive: impl Into<String>, err: GDriveError) {
        self.state.lock().await.list_failures.insert(drive.into(), err);
    }

    /// Fail every call with `err` until cleared with `None`.
    pub async fn set_outage(&self, err: Option<GDriveError>) {
        self.state.lock().await.outage = err;
    }

    /// Number of `create_drive` calls that reached the store.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_permission` calls that changed state.
    pub fn permission_writes(&self) -> usize {
        self.permission_writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a drive's permissions.
    pub async fn permissions(&self, drive_id: &str) -> Vec<DrivePermission> {
        let st = self.state.lock().await;
        st.drives
            .get(drive_id)
            .map(|d| d.permissions.clone())
            .unwrap_or_default()
    }

    /// Ids of every drive with the given name.
    pub async fn drive_ids_named(&self, name: &str) -> Vec<String> {
        let st = self.state.lock().await;
        st.drives
            .iter()
            .filter(|(_, d)| d.name == name)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

fn keyed_failure(
    failures: &HashMap<String, GDriveError>,
    drive_id: &str,
    drive: Option<&SimDrive>,
) -> Option<GDriveError> {
    failures
        .get(drive_id)
        .or_else(|| drive.and_then(|d| failures.get(&d.name)))
        .cloned()
}

fn drive_not_found(drive_id: &str) -> GDriveError {
    GDriveError::not_found(format!("Shared drive not found: {drive_id}"))
}

#[async_trait]
impl DriveApi for SimulatedDrive {
    async fn about(&self) -> GDriveResult<DriveAbout> {
        let st = self.state.lock().await;
        if let Some(err) = &st.outage {
            return Err(err.clone());
        }
        Ok(self.about.clone())
    }

    async fn create_drive(&self, name: &str, request_id: &str) -> GDriveResult<SharedDrive> {
        let mut st = self.state.lock().await;
        if let Some(err) = &st.outage {
            return Err(err.clone());
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = st.create_failures.get(name) {
            return Err(err.clone());
        }
        if let Some(existing) = st.request_ids.get(request_id).cloned() {
            let drive = st
                .drives
                .get(&existing)
                .ok_or_else(|| drive_not_found(&existing))?;
            return Ok(SharedDrive {
                id: existing,
                name: drive.name.clone(),
                created_time: None,
                hidden: false,
            });
        }

        st.next_id += 1;
        let id = format!("0ASIM{:04}", st.next_id);
        st.drives.insert(
            id.clone(),
            SimDrive {
                name: name.to_string(),
                permissions: Vec::new(),
            },
        );
        st.request_ids.insert(request_id.to_string(), id.clone());
        Ok(SharedDrive {
            id,
            name: name.to_string(),
            created_time: Some(chrono::Utc::now()),
            hidden: false,
        })
    }

    async fn list_permissions(&self, drive_id: &str) -> GDriveResult<Vec<DrivePermission>> {
        let st = self.state.lock().await;
        if let Some(err) = &st.outage {
            return Err(err.clone());
        }
        let drive = st.drives.get(drive_id);
        if let Some(err) = keyed_failure(&st.list_failures, drive_id, drive) {
            return Err(err);
        }
        drive
            .map(|d| d.permissions.clone())
            .ok_or_else(|| drive_not_found(drive_id))
    }

    async fn create_permission(
        &self,
        drive_id: &str,
        request: &CreatePermissionRequest,
    ) -> GDriveResult<DrivePermission> {
        let mut st = self.state.lock().await;
        if let Some(err) = &st.outage {
            return Err(err.clone());
        }
        if let Some(err) = keyed_failure(&st.grant_failures, drive_id, st.drives.get(drive_id)) {
            return Err(err);
        }
        let drive = st
            .drives
            .get_mut(drive_id)
            .ok_or_else(|| drive_not_found(drive_id))?;

        let email = request.email_address.clone().unwrap_or_default();
        // Granting to a principal that already has an entry replaces its role.
        drive.permissions.retain(|p| !p.is_for(&email));
        let permission = DrivePermission {
            id: format!("perm-{}", drive.permissions.len() + 1),
            permission_type: request.permission_type,
            role: request.role,
            email_address: Some(email),
            domain: None,
            display_name: None,
            deleted: false,
        };
        drive.permissions.push(permission.clone());
        self.permission_writes.fetch_add(1, Ordering::SeqCst);
        Ok(permission)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
