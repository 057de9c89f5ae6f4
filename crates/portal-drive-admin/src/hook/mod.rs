//! Integration hook used by the admin UI.
//!
//! `refresh` runs ping, then usage and audit side by side, then a permission
//! check on the most recently touched drive. Each step lands in its own
//! [`Section`] so one failing call only blanks its own part of the page.
//!
//! Mutations run on a spawned task. Dropping the returned future stops
//! listening for the result; the call itself still completes and is audited.

pub mod functions;
pub mod poller;

pub use functions::{
    DriveFunctions, HttpDriveFunctions, LocalDriveFunctions, CREATE_SHARED_DRIVES_PATH,
    DRIVE_MANAGEMENT_PATH,
};
pub use poller::StatusPoller;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::actions::{
    DriveAction, PingResult, RevokeResult, SecretConfiguration, SecretPayload, SetSecretResult,
    UsageReport,
};
use crate::audit::AuditLogEntry;
use crate::error::{ErrorBody, PortalError, PortalResult};
use crate::provisioning::ProvisioningSummary;
use crate::reconcile::{BackfillSummary, FixOutcome, PermissionCheck};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One independently rendered part of the status page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum Section<T> {
    Loaded(T),
    Failed(ErrorBody),
    /// Not attempted because an earlier step ruled it out.
    Skipped,
}

impl<T> Section<T> {
    fn from_result(result: PortalResult<T>) -> Self {
        match result {
            Ok(value) => Self::Loaded(value),
            Err(err) => Self::Failed(ErrorBody::from(&err)),
        }
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Headline state derived from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    /// A key is stored (known only when the ping got an answer).
    pub configured: bool,
    /// The key works.
    pub active: bool,
    /// Whether the service account can manage the inspected drive.
    pub has_permission: Option<bool>,
    pub role: Option<String>,
    /// Both the service account and the support group manage the drive.
    pub fully_shared: Option<bool>,
    pub is_network_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSnapshot {
    pub ping: PingResult,
    pub usage: Section<UsageReport>,
    pub audit: Section<Vec<AuditLogEntry>>,
    /// Drive picked for the permission check.
    pub drive_id: Option<String>,
    pub permission: Section<PermissionCheck>,
    pub refreshed_at: DateTime<Utc>,
}

impl IntegrationSnapshot {
    pub fn status(&self) -> IntegrationStatus {
        let ping_error = self.ping.error.as_ref();
        let is_network_error = ping_error.is_some_and(|e| e.is_network_error);
        let configured = self.ping.success
            || ping_error.is_some_and(|e| !e.is_network_error && e.kind.implies_key_present());
        let permission = self.permission.loaded();
        IntegrationStatus {
            configured,
            active: self.ping.success,
            has_permission: permission.map(|p| p.has_service_account_permission),
            role: permission.and_then(|p| p.service_account_role.clone()),
            fully_shared: permission.map(PermissionCheck::is_healthy),
            is_network_error,
        }
    }

    /// Storage use in percent, when usage loaded and a quota exists.
    pub fn usage_percent(&self) -> Option<f64> {
        self.usage.loaded().and_then(UsageReport::percent_used)
    }
}

/// Drive referenced by the newest audit entry that names one.
pub fn latest_drive_id(entries: &[AuditLogEntry]) -> Option<String> {
    entries.iter().find_map(AuditLogEntry::referenced_drive_id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Notices
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Short message for a toast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }

    fn failed(what: &str, err: &PortalError) -> Self {
        if err.is_network() {
            Self::error(format!("{what} failed: the drive service could not be reached ({err})"))
        } else {
            Self::error(format!("{what} failed: {err}"))
        }
    }
}

/// What a mutating hook action reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport<T> {
    pub notice: Notice,
    /// `None` when the call failed.
    pub outcome: Option<T>,
}

/// Proof that the user confirmed revoking the key.
#[derive(Debug)]
pub struct RevokeConfirmation {
    _confirmed: (),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Hook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct IntegrationHook {
    functions: Arc<dyn DriveFunctions>,
}

async fn call<T: DeserializeOwned>(functions: &dyn DriveFunctions, action: &DriveAction) -> PortalResult<T> {
    let value = functions.invoke(action).await?;
    serde_json::from_value(value)
        .map_err(|e| PortalError::Internal(format!("unexpected {} response: {e}", action.name())))
}

/// Run `fut` on its own task and wait for it.
async fn detached<T, F>(what: &'static str, fut: F) -> PortalResult<T>
where
    T: Send + 'static,
    F: Future<Output = PortalResult<T>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(join) => {
            error!(action = what, error = %join, "drive action task did not complete");
            Err(PortalError::Internal(format!("{what} did not complete: {join}")))
        }
    }
}

impl IntegrationHook {
    pub fn new(functions: Arc<dyn DriveFunctions>) -> Self {
        Self { functions }
    }

    // ── Reads ────────────────────────────────────────────────────

    pub async fn ping(&self) -> PingResult {
        call(self.functions.as_ref(), &DriveAction::Ping)
            .await
            .unwrap_or_else(|err| PingResult::failed(&err))
    }

    /// Same three-way answer as the server; an unreachable server is a
    /// network error, never "not configured".
    pub async fn check_secret_configuration(&self) -> SecretConfiguration {
        match call(self.functions.as_ref(), &DriveAction::CheckSecretConfiguration).await {
            Ok(config) => config,
            Err(err) => SecretConfiguration {
                configured: false,
                message: err.to_string(),
                service_account: None,
                is_network_error: err.is_network(),
            },
        }
    }

    pub async fn check_permission(&self, drive_id: &str) -> PortalResult<PermissionCheck> {
        let action = DriveAction::CheckServiceAccountPermission { drive_id: drive_id.to_string() };
        call(self.functions.as_ref(), &action).await
    }

    /// Build a fresh snapshot. Never fails; failures are recorded per section.
    pub async fn refresh(&self, audit_limit: usize) -> IntegrationSnapshot {
        let ping = self.ping().await;
        let unreachable = ping.error.as_ref().is_some_and(|e| e.is_network_error);

        let usage = async {
            if !ping.success {
                return Section::Skipped;
            }
            Section::<UsageReport>::from_result(call(self.functions.as_ref(), &DriveAction::Usage).await)
        };
        let audit = async {
            if unreachable {
                return Section::Skipped;
            }
            let action = DriveAction::Audit { limit: audit_limit };
            Section::<Vec<AuditLogEntry>>::from_result(call(self.functions.as_ref(), &action).await)
        };
        let (usage, audit) = tokio::join!(usage, audit);

        let drive_id = audit.loaded().and_then(|entries| latest_drive_id(entries));
        let permission = match drive_id.as_deref() {
            Some(id) if ping.success => Section::from_result(self.check_permission(id).await),
            _ => Section::Skipped,
        };
        debug!(
            active = ping.success,
            drive_id = drive_id.as_deref().unwrap_or(""),
            "integration status refreshed"
        );

        IntegrationSnapshot {
            ping,
            usage,
            audit,
            drive_id,
            permission,
            refreshed_at: Utc::now(),
        }
    }

    // ── Mutations ────────────────────────────────────────────────

    fn spawn_call<T>(&self, action: DriveAction) -> impl Future<Output = PortalResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let functions = self.functions.clone();
        let name = action.name();
        detached(name, async move { call(functions.as_ref(), &action).await })
    }

    /// Grant the service account manager on `drive_id`. Only ever runs
    /// when the user asks for it.
    pub async fn fix(&self, drive_id: &str) -> ActionReport<FixOutcome> {
        let action = DriveAction::FixPermission { drive_id: drive_id.to_string() };
        match self.spawn_call::<FixOutcome>(action).await {
            Ok(outcome) => {
                let notice = if outcome.already_exists {
                    Notice::success(format!("{} already manages this drive", outcome.email))
                } else {
                    Notice::success(format!("Granted manager access to {}", outcome.email))
                };
                ActionReport { notice, outcome: Some(outcome) }
            }
            Err(err) => ActionReport { notice: Notice::failed("Fixing permissions", &err), outcome: None },
        }
    }

    pub fn confirm_revoke(&self) -> RevokeConfirmation {
        RevokeConfirmation { _confirmed: () }
    }

    pub async fn revoke(&self, _confirmation: RevokeConfirmation) -> ActionReport<RevokeResult> {
        match self.spawn_call::<RevokeResult>(DriveAction::Revoke).await {
            Ok(result) => ActionReport {
                notice: Notice::success("Service account key revoked"),
                outcome: Some(result),
            },
            Err(err) => ActionReport { notice: Notice::failed("Revoking the key", &err), outcome: None },
        }
    }

    /// Upload a key as raw JSON or base64 of JSON.
    pub async fn upload_secret(&self, payload: impl Into<String>) -> ActionReport<SetSecretResult> {
        let action = DriveAction::SetSecret { secret: SecretPayload(payload.into()) };
        match self.spawn_call::<SetSecretResult>(action).await {
            Ok(result) => ActionReport {
                notice: Notice::success(format!("Saved key for {}", result.service_account)),
                outcome: Some(result),
            },
            Err(err) => ActionReport { notice: Notice::failed("Saving the key", &err), outcome: None },
        }
    }

    pub async fn backfill(&self) -> ActionReport<BackfillSummary> {
        match self.spawn_call::<BackfillSummary>(DriveAction::BackfillPermissions).await {
            Ok(summary) => {
                let message = format!(
                    "Support group access: {} granted, {} already present, {} failed",
                    summary.granted, summary.already_present, summary.failed
                );
                let notice = if summary.failed > 0 {
                    Notice::warning(message)
                } else {
                    Notice::success(message)
                };
                ActionReport { notice, outcome: Some(summary) }
            }
            Err(err) => ActionReport {
                notice: Notice::failed("Backfilling permissions", &err),
                outcome: None,
            },
        }
    }

    /// Create shared drives for every client that lacks one.
    pub async fn provision(&self) -> ActionReport<ProvisioningSummary> {
        let functions = self.functions.clone();
        let run = detached("createSharedDrives", async move {
            functions.create_shared_drives().await
        });
        match run.await {
            Ok(summary) => {
                let incomplete = summary
                    .results
                    .iter()
                    .any(|r| !r.success || r.permission_error.is_some());
                let notice = if incomplete {
                    Notice::warning(summary.message.clone())
                } else {
                    Notice::success(summary.message.clone())
                };
                ActionReport { notice, outcome: Some(summary) }
            }
            Err(err) => ActionReport {
                notice: Notice::failed("Creating shared drives", &err),
                outcome: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLog, PERMISSION_FIXED};
    use crate::backend::{CallerProfile, ClientRecord, MemoryBackend, Role};
    use crate::config::DriveAdminConfig;
    use crate::error::ErrorKind;
    use crate::facade::DriveAdminFacade;
    use crate::factory::StaticDriveClientFactory;
    use async_trait::async_trait;
    use portal_gdrive::{DriveAbout, DrivePermission, GDriveError, PermissionRole, SimulatedDrive};
    use serde_json::Value;

    const SA: &str = "drive-bot@portal.iam.gserviceaccount.com";
    const KEY: &str = r#"{"type":"service_account","client_email":"drive-bot@portal.iam.gserviceaccount.com","private_key":"pem"}"#;

    struct Fixture {
        mem: MemoryBackend,
        sim: Arc<SimulatedDrive>,
        facade: Arc<DriveAdminFacade>,
        hook: IntegrationHook,
    }

    fn fixture_as(caller: CallerProfile) -> Fixture {
        let mem = MemoryBackend::new();
        let sim = SimulatedDrive::with_about(DriveAbout {
            user_email: "workspace-admin@example.com".into(),
            storage_used: 25,
            storage_limit: 100,
            ..Default::default()
        });
        let facade = Arc::new(DriveAdminFacade::new(
            DriveAdminConfig::default(),
            mem.backend(),
            Arc::new(StaticDriveClientFactory::new(sim.clone())),
        ));
        let hook = IntegrationHook::new(Arc::new(LocalDriveFunctions::new(facade.clone(), caller)));
        Fixture { mem, sim, facade, hook }
    }

    fn fixture() -> Fixture {
        fixture_as(CallerProfile::admin("u1", "alice"))
    }

    /// Every call fails as if the server were down.
    struct Offline;

    #[async_trait]
    impl DriveFunctions for Offline {
        async fn invoke(&self, _action: &DriveAction) -> PortalResult<Value> {
            Err(PortalError::Network("connection refused".into()))
        }

        async fn create_shared_drives(&self) -> PortalResult<ProvisioningSummary> {
            Err(PortalError::Network("connection refused".into()))
        }
    }

    #[test]
    fn latest_drive_prefers_newest_entry() {
        let entries = vec![
            AuditLogEntry::new("secret_uploaded", "alice", "Uploaded key"),
            AuditLogEntry::new("drive_created", "alice", "Created").with_drive("0ANEWER01"),
            AuditLogEntry::new("drive_created", "alice", "Created (Drive ID: 0AOLDER01)"),
        ];
        assert_eq!(latest_drive_id(&entries).as_deref(), Some("0ANEWER01"));
        assert_eq!(latest_drive_id(&entries[2..]).as_deref(), Some("0AOLDER01"));
        assert_eq!(latest_drive_id(&entries[..1]), None);
    }

    fn snapshot_after_ping_error(err: PortalError) -> IntegrationSnapshot {
        IntegrationSnapshot {
            ping: PingResult::failed(&err),
            usage: Section::Skipped,
            audit: Section::Skipped,
            drive_id: None,
            permission: Section::Skipped,
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn configured_only_when_the_ping_error_proves_a_key() {
        let rejected = snapshot_after_ping_error(PortalError::Auth("token revoked".into())).status();
        assert!(rejected.configured && !rejected.active);
        let unusable = snapshot_after_ping_error(PortalError::CredentialInvalid("bad pem".into())).status();
        assert!(unusable.configured);

        for err in [
            PortalError::Unauthenticated("unknown or expired session".into()),
            PortalError::Forbidden("admin only".into()),
            PortalError::Backend("store".into()),
            PortalError::NotConfigured,
        ] {
            let status = snapshot_after_ping_error(err.clone()).status();
            assert!(!status.configured, "{err}");
            assert!(!status.is_network_error, "{err}");
        }
    }

    #[tokio::test]
    async fn refresh_unconfigured_skips_credentialed_sections() {
        let f = fixture();
        let snap = f.hook.refresh(10).await;
        assert!(!snap.ping.success);
        assert!(snap.usage.is_skipped());
        assert!(snap.audit.loaded().is_some());
        assert!(snap.permission.is_skipped());

        let status = snap.status();
        assert!(!status.configured);
        assert!(!status.active);
        assert!(!status.is_network_error);
    }

    #[tokio::test]
    async fn refresh_checks_drive_from_audit_trail() {
        let f = fixture();
        f.hook.upload_secret(KEY).await;
        f.sim.insert_drive("0ADRIVE001", "Acme").await;
        f.mem
            .audit
            .append(AuditLogEntry::new("drive_created", "alice", "Created shared drive (Drive ID: 0ADRIVE001)"))
            .await
            .unwrap();

        let snap = f.hook.refresh(10).await;
        assert!(snap.ping.success);
        assert_eq!(snap.usage_percent(), Some(25.0));
        assert_eq!(snap.drive_id.as_deref(), Some("0ADRIVE001"));
        let check = snap.permission.loaded().unwrap();
        assert!(!check.has_service_account_permission);

        let status = snap.status();
        assert!(status.configured && status.active);
        assert_eq!(status.has_permission, Some(false));
        // Nothing was repaired on the way.
        assert_eq!(f.sim.permission_writes(), 0);
    }

    #[tokio::test]
    async fn permission_failure_degrades_only_its_section() {
        let f = fixture();
        f.hook.upload_secret(KEY).await;
        f.sim.insert_drive("0ADRIVE002", "Globex").await;
        f.sim.fail_list("0ADRIVE002", GDriveError::network("reset")).await;
        f.mem
            .audit
            .append(AuditLogEntry::new("drive_created", "alice", "Created").with_drive("0ADRIVE002"))
            .await
            .unwrap();

        let snap = f.hook.refresh(10).await;
        assert!(snap.ping.success);
        assert!(snap.usage.loaded().is_some());
        assert!(snap.audit.loaded().is_some());
        assert!(snap.permission.error().unwrap().is_network_error);
    }

    #[tokio::test]
    async fn offline_server_is_network_error_everywhere() {
        let hook = IntegrationHook::new(Arc::new(Offline));
        let snap = hook.refresh(10).await;
        assert!(snap.status().is_network_error);
        assert!(!snap.status().configured);
        assert!(snap.audit.is_skipped());

        let config = hook.check_secret_configuration().await;
        assert!(!config.configured);
        assert!(config.is_network_error);

        let report = hook.fix("0ADRIVE003").await;
        assert_eq!(report.notice.level, NoticeLevel::Error);
        assert!(report.outcome.is_none());
    }

    #[tokio::test]
    async fn fix_reports_grant_then_existing_access() {
        let f = fixture();
        f.hook.upload_secret(KEY).await;
        f.sim.insert_drive("0ADRIVE004", "Initech").await;

        let first = f.hook.fix("0ADRIVE004").await;
        assert_eq!(first.notice.level, NoticeLevel::Success);
        assert!(!first.outcome.unwrap().already_exists);

        let second = f.hook.fix("0ADRIVE004").await;
        assert!(second.outcome.unwrap().already_exists);
        assert_eq!(f.sim.permission_writes(), 1);
        assert!(f.mem.audit.actions().await.contains(&PERMISSION_FIXED.to_string()));
    }

    #[tokio::test]
    async fn fix_skips_write_when_already_manager() {
        let f = fixture();
        f.hook.upload_secret(KEY).await;
        f.sim.insert_drive("0ADRIVE005", "Umbrella").await;
        f.sim
            .insert_permission(
                "0ADRIVE005",
                DrivePermission {
                    id: "p1".into(),
                    email_address: Some(SA.into()),
                    role: PermissionRole::Organizer,
                    ..Default::default()
                },
            )
            .await;
        let report = f.hook.fix("0ADRIVE005").await;
        assert!(report.outcome.unwrap().already_exists);
        assert_eq!(f.sim.permission_writes(), 0);
    }

    #[tokio::test]
    async fn revoke_requires_confirmation_and_clears_key() {
        let f = fixture();
        let saved = f.hook.upload_secret(KEY).await;
        assert_eq!(saved.outcome.unwrap().service_account, SA);
        assert!(f.hook.ping().await.success);

        let confirmation = f.hook.confirm_revoke();
        let report = f.hook.revoke(confirmation).await;
        assert_eq!(report.notice.level, NoticeLevel::Success);

        let ping = f.hook.ping().await;
        assert!(!ping.success);
        assert_eq!(ping.error.unwrap().kind, ErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn bad_upload_is_an_error_notice() {
        let f = fixture();
        let report = f.hook.upload_secret("not a key").await;
        assert_eq!(report.notice.level, NoticeLevel::Error);
        assert!(!f.facade.check_secret_configuration().await.configured);
    }

    #[tokio::test]
    async fn provision_reports_partial_failure_as_warning() {
        let f = fixture();
        f.hook.upload_secret(KEY).await;
        f.mem.directory.add_client(ClientRecord::new("c1", "Acme")).await;
        f.mem.directory.add_client(ClientRecord::new("c2", "Globex")).await;
        f.sim.fail_create("Globex", GDriveError::network("timeout")).await;

        let report = f.hook.provision().await;
        assert_eq!(report.notice.level, NoticeLevel::Warning);
        let summary = report.outcome.unwrap();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn provision_as_client_is_forbidden() {
        let f = fixture_as(CallerProfile {
            role: Role::Client,
            ..CallerProfile::admin("u2", "bob")
        });
        let report = f.hook.provision().await;
        assert_eq!(report.notice.level, NoticeLevel::Error);
        assert_eq!(f.sim.create_calls(), 0);
    }

    #[tokio::test]
    async fn dropped_fix_still_completes() {
        let f = fixture();
        f.hook.upload_secret(KEY).await;
        f.sim.insert_drive("0ADRIVE006", "Hooli").await;

        let pending = f.hook.fix("0ADRIVE006");
        // Poll once so the task is spawned, then walk away.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(1), pending).await;

        for _ in 0..100 {
            if f.sim.permission_writes() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.sim.permission_writes(), 1);
    }
}
