//! Permission reconciliation for shared drives.
//!
//! A drive is healthy when both the service account and the support group
//! hold manager (or stronger) on it. ACLs are read live on every call and
//! never cached. `fix` repairs only the service account; the group is granted
//! at provisioning time and by the backfill.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use portal_gdrive::{CreatePermissionRequest, DriveApi, DrivePermission, PermissionRole};

use crate::backend::ClientRecord;
use crate::error::{PortalError, PortalResult};

/// Observed ACL state for the two principals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheck {
    pub drive_id: String,
    pub has_service_account_permission: bool,
    pub service_account_role: Option<String>,
    pub has_group_permission: bool,
    pub group_role: Option<String>,
    pub service_account_email: String,
    pub group_email: String,
}

impl PermissionCheck {
    pub fn is_healthy(&self) -> bool {
        self.has_service_account_permission && self.has_group_permission
    }
}

/// Result of `fix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    pub success: bool,
    pub already_exists: bool,
    pub email: String,
    pub group_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackfillStatus {
    Granted,
    AlreadyPresent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResult {
    pub client_id: String,
    pub company_name: String,
    pub drive_id: String,
    pub status: BackfillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub success: bool,
    pub granted: usize,
    pub already_present: usize,
    pub failed: usize,
    pub results: Vec<BackfillResult>,
}

impl BackfillSummary {
    pub fn from_results(results: Vec<BackfillResult>) -> Self {
        let count = |s: BackfillStatus| results.iter().filter(|r| r.status == s).count();
        let (granted, already_present, failed) = (
            count(BackfillStatus::Granted),
            count(BackfillStatus::AlreadyPresent),
            count(BackfillStatus::Failed),
        );
        Self {
            success: failed == 0,
            granted,
            already_present,
            failed,
            results,
        }
    }
}

/// Strongest live role held by `email`, if any.
pub fn role_of(permissions: &[DrivePermission], email: &str) -> Option<PermissionRole> {
    permissions
        .iter()
        .filter(|p| !p.deleted && p.is_for(email))
        .map(|p| p.role)
        .max()
}

fn require_drive_id(drive_id: &str) -> PortalResult<&str> {
    let trimmed = drive_id.trim();
    if trimmed.is_empty() {
        return Err(PortalError::InvalidRequest("driveId is required".into()));
    }
    Ok(trimmed)
}

/// Compares desired and observed ACL state for one service account and group.
pub struct PermissionReconciler {
    drive: Arc<dyn DriveApi>,
    service_account_email: String,
    group_email: String,
}

impl PermissionReconciler {
    pub fn new(
        drive: Arc<dyn DriveApi>,
        service_account_email: impl Into<String>,
        group_email: impl Into<String>,
    ) -> Self {
        Self {
            drive,
            service_account_email: service_account_email.into(),
            group_email: group_email.into(),
        }
    }

    // ── Check ────────────────────────────────────────────────────

    /// Read the drive's ACL and report both principals.
    ///
    /// No matching entry is the ordinary "missing" state, not an error.
    pub async fn check(&self, drive_id: &str) -> PortalResult<PermissionCheck> {
        let drive_id = require_drive_id(drive_id)?;
        let permissions = self.drive.list_permissions(drive_id).await?;

        let sa_role = role_of(&permissions, &self.service_account_email);
        let group_role = role_of(&permissions, &self.group_email);

        Ok(PermissionCheck {
            drive_id: drive_id.to_string(),
            has_service_account_permission: sa_role.map_or(false, |r| r.is_manager()),
            service_account_role: sa_role.map(|r| r.label().to_string()),
            has_group_permission: group_role.map_or(false, |r| r.is_manager()),
            group_role: group_role.map(|r| r.label().to_string()),
            service_account_email: self.service_account_email.clone(),
            group_email: self.group_email.clone(),
        })
    }

    // ── Fix ──────────────────────────────────────────────────────

    /// Grant the service account manager unless it already has it.
    pub async fn fix(&self, drive_id: &str) -> PortalResult<FixOutcome> {
        let check = self.check(drive_id).await?;
        if check.has_service_account_permission {
            return Ok(FixOutcome {
                success: true,
                already_exists: true,
                email: self.service_account_email.clone(),
                group_email: self.group_email.clone(),
            });
        }

        let request =
            CreatePermissionRequest::user(self.service_account_email.as_str(), PermissionRole::MANAGER);
        self.drive.create_permission(&check.drive_id, &request).await?;
        info!(drive_id = %check.drive_id, email = %self.service_account_email, "granted service account manager");

        Ok(FixOutcome {
            success: true,
            already_exists: false,
            email: self.service_account_email.clone(),
            group_email: self.group_email.clone(),
        })
    }

    // ── Group ────────────────────────────────────────────────────

    /// Grant the support group manager on a drive, without checking first.
    pub async fn grant_group(&self, drive_id: &str) -> PortalResult<()> {
        let request = CreatePermissionRequest::group(self.group_email.as_str(), PermissionRole::MANAGER);
        self.drive.create_permission(drive_id, &request).await?;
        Ok(())
    }

    /// Make sure the support group holds manager on one drive.
    pub async fn ensure_group(&self, drive_id: &str) -> PortalResult<BackfillStatus> {
        let check = self.check(drive_id).await?;
        if check.has_group_permission {
            return Ok(BackfillStatus::AlreadyPresent);
        }
        self.grant_group(&check.drive_id).await?;
        Ok(BackfillStatus::Granted)
    }

    /// `ensure_group` over many client drives; one failure never stops the rest.
    pub async fn backfill(&self, clients: Vec<ClientRecord>, concurrency: usize) -> BackfillSummary {
        let targets = clients.into_iter().filter_map(|client| {
            let drive_id = client.drive_id.clone().filter(|d| !d.is_empty())?;
            Some((client, drive_id))
        });
        let results: Vec<BackfillResult> = stream::iter(targets)
            .map(|(client, drive_id)| async move {
                let (status, error) = match self.ensure_group(&drive_id).await {
                    Ok(status) => (status, None),
                    Err(err) => {
                        warn!(client_id = %client.id, drive_id = %drive_id, error = %err, "group backfill failed");
                        (BackfillStatus::Failed, Some(err.to_string()))
                    }
                };
                BackfillResult {
                    client_id: client.id,
                    company_name: client.company_name,
                    drive_id,
                    status,
                    error,
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        BackfillSummary::from_results(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_gdrive::{GDriveError, GDriveErrorKind, PermissionType, SimulatedDrive};

    const SA: &str = "drive-bot@portal.iam.gserviceaccount.com";
    const GROUP: &str = "drive-support@example.com";

    fn perm(kind: PermissionType, email: &str, role: PermissionRole) -> DrivePermission {
        DrivePermission {
            permission_type: kind,
            role,
            email_address: Some(email.into()),
            ..Default::default()
        }
    }

    async fn setup() -> (Arc<SimulatedDrive>, PermissionReconciler) {
        let sim = SimulatedDrive::new("admin@example.com");
        sim.insert_drive("D1", "Acme").await;
        let reconciler = PermissionReconciler::new(sim.clone(), SA, GROUP);
        (sim, reconciler)
    }

    #[tokio::test]
    async fn empty_acl_reports_both_missing() {
        let (_, r) = setup().await;
        let check = r.check("D1").await.unwrap();
        assert!(!check.has_service_account_permission);
        assert!(!check.has_group_permission);
        assert_eq!(check.service_account_role, None);
        assert_eq!(check.group_role, None);
    }

    #[tokio::test]
    async fn example_scenario_check_fix_check() {
        let (sim, r) = setup().await;
        let before = r.check("D1").await.unwrap();
        assert!(!before.has_service_account_permission && !before.has_group_permission);

        let fixed = r.fix("D1").await.unwrap();
        assert!(fixed.success);
        assert!(!fixed.already_exists);
        assert_eq!(fixed.email, SA);
        assert_eq!(fixed.group_email, GROUP);
        assert_eq!(sim.permission_writes(), 1);

        let after = r.check("D1").await.unwrap();
        assert!(after.has_service_account_permission);
        assert_eq!(after.service_account_role.as_deref(), Some("manager"));
        assert!(!after.has_group_permission);
    }

    #[tokio::test]
    async fn fix_is_idempotent() {
        let (sim, r) = setup().await;
        assert!(!r.fix("D1").await.unwrap().already_exists);
        let second = r.fix("D1").await.unwrap();
        assert!(second.success);
        assert!(second.already_exists);
        assert_eq!(sim.permission_writes(), 1);
    }

    #[tokio::test]
    async fn role_table_decides_permission() {
        use PermissionRole::*;
        let table = [
            (Reader, false),
            (Commenter, false),
            (Writer, false),
            (FileOrganizer, false),
            (Organizer, true),
            (Owner, true),
            (Unknown, false),
        ];
        for (role, expected) in table {
            let sim = SimulatedDrive::new("admin@example.com");
            sim.insert_drive("D1", "Acme").await;
            sim.insert_permission("D1", perm(PermissionType::User, SA, role)).await;
            sim.insert_permission("D1", perm(PermissionType::Group, GROUP, role)).await;
            let r = PermissionReconciler::new(sim.clone(), SA, GROUP);
            let check = r.check("D1").await.unwrap();
            assert_eq!(check.has_service_account_permission, expected, "{role}");
            assert_eq!(check.has_group_permission, expected, "{role}");
            assert_eq!(check.service_account_role.as_deref(), Some(role.label()));
        }
    }

    #[tokio::test]
    async fn writer_is_upgraded_by_fix() {
        let (sim, r) = setup().await;
        sim.insert_permission("D1", perm(PermissionType::User, SA, PermissionRole::Writer)).await;
        let outcome = r.fix("D1").await.unwrap();
        assert!(!outcome.already_exists);
        assert_eq!(r.check("D1").await.unwrap().service_account_role.as_deref(), Some("manager"));
    }

    #[tokio::test]
    async fn fix_never_touches_group() {
        let (sim, r) = setup().await;
        r.fix("D1").await.unwrap();
        let perms = sim.permissions("D1").await;
        assert!(perms.iter().all(|p| !p.is_for(GROUP)));
    }

    #[tokio::test]
    async fn email_match_is_case_insensitive_and_ignores_deleted() {
        let (sim, r) = setup().await;
        sim.insert_permission(
            "D1",
            perm(PermissionType::User, &SA.to_uppercase(), PermissionRole::Organizer),
        )
        .await;
        let mut gone = perm(PermissionType::Group, GROUP, PermissionRole::Organizer);
        gone.deleted = true;
        sim.insert_permission("D1", gone).await;
        let check = r.check("D1").await.unwrap();
        assert!(check.has_service_account_permission);
        assert!(!check.has_group_permission);
    }

    #[tokio::test]
    async fn failure_taxonomy() {
        let (sim, r) = setup().await;
        let err = r.check("missing").await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
        assert!(!err.is_retryable());

        sim.fail_grant("D1", GDriveError::new(GDriveErrorKind::PermissionDenied, "no"))
            .await;
        let err = r.fix("D1").await.unwrap_err();
        assert!(matches!(err, PortalError::InsufficientPrivilege(_)));

        sim.set_outage(Some(GDriveError::network("connection reset"))).await;
        let err = r.check("D1").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn grant_failure_is_not_success() {
        let (sim, r) = setup().await;
        sim.fail_grant("D1", GDriveError::new(GDriveErrorKind::ServerError, "boom")).await;
        assert!(r.fix("D1").await.is_err());
        assert_eq!(sim.permission_writes(), 0);
    }

    #[tokio::test]
    async fn blank_drive_id_rejected() {
        let (_, r) = setup().await;
        assert!(matches!(r.check("  ").await, Err(PortalError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn backfill_reports_each_drive() {
        let sim = SimulatedDrive::new("admin@example.com");
        for (id, name) in [("D1", "Acme"), ("D2", "Beta"), ("D3", "Gamma")] {
            sim.insert_drive(id, name).await;
        }
        sim.insert_permission("D2", perm(PermissionType::Group, GROUP, PermissionRole::Organizer))
            .await;
        sim.fail_grant("D3", GDriveError::new(GDriveErrorKind::PermissionDenied, "no"))
            .await;
        let r = PermissionReconciler::new(sim.clone(), SA, GROUP);

        let clients = ["D1", "D2", "D3", "missing"]
            .iter()
            .enumerate()
            .map(|(i, d)| ClientRecord {
                drive_id: Some(d.to_string()),
                ..ClientRecord::new(format!("c{i}"), format!("Client {i}"))
            })
            .chain(std::iter::once(ClientRecord::new("c-none", "No drive")))
            .collect();

        let summary = r.backfill(clients, 2).await;
        assert_eq!(summary.results.len(), 4);
        assert_eq!(summary.granted, 1);
        assert_eq!(summary.already_present, 1);
        assert_eq!(summary.failed, 2);
        assert!(!summary.success);

        let d1 = summary.results.iter().find(|r| r.drive_id == "D1").unwrap();
        assert_eq!(d1.status, BackfillStatus::Granted);
        let missing = summary.results.iter().find(|r| r.drive_id == "missing").unwrap();
        assert!(missing.error.as_deref().unwrap().contains("not found"));
    }
}
