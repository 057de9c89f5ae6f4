//! Status, audit and repair operations behind the drive-management function.
//!
//! Nothing here is cached. The key is read and a client built for every
//! call, so a rotation or revoke is visible to the very next request.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use portal_gdrive::{DriveApi, ServiceAccountKey};

use crate::actions::{
    ActionData, DriveAction, Envelope, PingResult, RevokeResult, SecretConfiguration,
    SetSecretResult, UsageReport, MAX_AUDIT_LIMIT,
};
use crate::audit::{
    self, AuditLogEntry, PERMISSIONS_BACKFILLED, PERMISSION_FIXED, SECRET_REVOKED, SECRET_UPLOADED,
};
use crate::backend::{Backend, CallerProfile};
use crate::config::DriveAdminConfig;
use crate::error::{PortalError, PortalResult, SecretError};
use crate::factory::DriveClientFactory;
use crate::provisioning::{ProvisioningOperation, ProvisioningSummary};
use crate::reconcile::{BackfillSummary, FixOutcome, PermissionCheck, PermissionReconciler};
use crate::secrets::SecretAccessor;

pub struct DriveAdminFacade {
    config: DriveAdminConfig,
    secrets: SecretAccessor,
    factory: Arc<dyn DriveClientFactory>,
    backend: Backend,
    provisioning: ProvisioningOperation,
}

impl DriveAdminFacade {
    pub fn new(
        config: DriveAdminConfig,
        backend: Backend,
        factory: Arc<dyn DriveClientFactory>,
    ) -> Self {
        let secrets = SecretAccessor::new(backend.secrets.clone(), config.secret_name.clone());
        let provisioning = ProvisioningOperation::new(
            secrets.clone(),
            factory.clone(),
            backend.clients.clone(),
            backend.audit.clone(),
            config.support_group_email.clone(),
            config.effective_concurrency(),
        );
        Self {
            config,
            secrets,
            factory,
            backend,
            provisioning,
        }
    }

    pub fn config(&self) -> &DriveAdminConfig {
        &self.config
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn connect(&self) -> PortalResult<(ServiceAccountKey, Arc<dyn DriveApi>)> {
        let key = self.secrets.get_service_account_key().await?;
        let drive = self.factory.build(&key).await?;
        Ok((key, drive))
    }

    async fn reconciler(&self) -> PortalResult<PermissionReconciler> {
        let (key, drive) = self.connect().await?;
        Ok(PermissionReconciler::new(
            drive,
            key.client_email,
            self.config.support_group_email.clone(),
        ))
    }

    // ── Status ───────────────────────────────────────────────────

    /// Load the key, mint a token and make one lightweight call.
    ///
    /// Every failure is folded into the result. This proves the credential
    /// works, not that it can reach any particular drive.
    pub async fn ping(&self) -> PingResult {
        let (key, drive) = match self.connect().await {
            Ok(pair) => pair,
            Err(err) => return PingResult::failed(&err),
        };
        match drive.about().await {
            Ok(about) => PingResult {
                success: true,
                service_account: Some(key.client_email),
                acting_as: Some(about.user_email).filter(|e| !e.is_empty()),
                error: None,
            },
            Err(err) => PingResult::failed(&PortalError::from(err)),
        }
    }

    pub async fn usage(&self) -> PortalResult<UsageReport> {
        let (_, drive) = self.connect().await?;
        let about = drive.about().await?;
        Ok(UsageReport {
            bytes_used: about.storage_used,
            total_quota: about.storage_limit,
        })
    }

    /// Most recent audit entries first, at most `limit` (capped).
    pub async fn audit(&self, limit: usize) -> PortalResult<Vec<AuditLogEntry>> {
        self.backend.audit.recent(limit.min(MAX_AUDIT_LIMIT)).await
    }

    /// Whether a key is stored, without touching Google.
    ///
    /// An unreachable store is reported as `isNetworkError`, never as
    /// "not configured".
    pub async fn check_secret_configuration(&self) -> SecretConfiguration {
        match self.secrets.get_service_account_key().await {
            Ok(key) => match key.validate() {
                Ok(()) => SecretConfiguration {
                    configured: true,
                    message: "Service account key is configured".into(),
                    service_account: Some(key.client_email),
                    is_network_error: false,
                },
                Err(err) => SecretConfiguration {
                    configured: false,
                    message: format!("Stored service account key is invalid: {}", err.message),
                    service_account: None,
                    is_network_error: false,
                },
            },
            Err(SecretError::NotConfigured(_)) => SecretConfiguration {
                configured: false,
                message: "No service account key has been uploaded".into(),
                service_account: None,
                is_network_error: false,
            },
            Err(SecretError::Unavailable(msg)) => SecretConfiguration {
                configured: false,
                message: format!("Could not reach the secret store: {msg}"),
                service_account: None,
                is_network_error: true,
            },
            Err(SecretError::Malformed(msg)) => SecretConfiguration {
                configured: false,
                message: format!("Stored service account key is invalid: {msg}"),
                service_account: None,
                is_network_error: false,
            },
            Err(SecretError::Backend(msg)) => SecretConfiguration {
                configured: false,
                message: format!("Secret store failed: {msg}"),
                service_account: None,
                is_network_error: false,
            },
        }
    }

    /// The stored key, for in-process callers only.
    pub async fn get_secret(&self) -> PortalResult<ServiceAccountKey> {
        Ok(self.secrets.get_service_account_key().await?)
    }

    // ── Permissions ──────────────────────────────────────────────

    pub async fn check_permission(&self, drive_id: &str) -> PortalResult<PermissionCheck> {
        self.reconciler().await?.check(drive_id).await
    }

    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn fix_permission(
        &self,
        caller: &CallerProfile,
        drive_id: &str,
    ) -> PortalResult<FixOutcome> {
        caller.require_admin()?;
        let outcome = self.reconciler().await?.fix(drive_id).await?;
        if !outcome.already_exists {
            audit::record(
                self.backend.audit.as_ref(),
                AuditLogEntry::new(
                    PERMISSION_FIXED,
                    caller.username.as_str(),
                    format!("Granted manager to {} on drive {}", outcome.email, drive_id.trim()),
                )
                .with_drive(drive_id.trim()),
            )
            .await;
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(caller = %caller.username))]
    pub async fn backfill_permissions(&self, caller: &CallerProfile) -> PortalResult<BackfillSummary> {
        caller.require_admin()?;
        let clients = self.backend.clients.clients_with_drive().await?;
        let reconciler = self.reconciler().await?;
        let summary = reconciler
            .backfill(clients, self.config.effective_concurrency())
            .await;
        audit::record(
            self.backend.audit.as_ref(),
            AuditLogEntry::new(
                PERMISSIONS_BACKFILLED,
                caller.username.as_str(),
                format!(
                    "Support group backfill: {} granted, {} already present, {} failed",
                    summary.granted, summary.already_present, summary.failed
                ),
            ),
        )
        .await;
        Ok(summary)
    }

    // ── Secret lifecycle ─────────────────────────────────────────

    #[instrument(skip_all, fields(caller = %caller.username))]
    pub async fn set_secret(&self, caller: &CallerProfile, payload: &str) -> PortalResult<SetSecretResult> {
        caller.require_admin()?;
        let key = self.secrets.store_service_account_key(payload).await?;
        audit::record(
            self.backend.audit.as_ref(),
            AuditLogEntry::new(
                SECRET_UPLOADED,
                caller.username.as_str(),
                format!("Uploaded service account key for {}", key.client_email),
            ),
        )
        .await;
        Ok(SetSecretResult {
            success: true,
            service_account: key.client_email,
        })
    }

    /// Clear the stored key. Revoking when nothing is stored still succeeds.
    #[instrument(skip_all, fields(caller = %caller.username))]
    pub async fn revoke(&self, caller: &CallerProfile) -> PortalResult<RevokeResult> {
        caller.require_admin()?;
        let removed = self.secrets.clear().await?;
        let details = if removed {
            "Service account key revoked"
        } else {
            "Revoke requested; no service account key was stored"
        };
        audit::record(
            self.backend.audit.as_ref(),
            AuditLogEntry::new(SECRET_REVOKED, caller.username.as_str(), details),
        )
        .await;
        Ok(RevokeResult { success: true })
    }

    // ── Provisioning ─────────────────────────────────────────────

    pub async fn provision_drives(&self, caller: &CallerProfile) -> PortalResult<ProvisioningSummary> {
        self.provisioning.run(caller).await
    }

    // ── Function boundary ────────────────────────────────────────

    /// Run one drive-management action for an administrator.
    pub async fn dispatch(&self, caller: &CallerProfile, action: DriveAction) -> PortalResult<ActionData> {
        caller.require_admin()?;
        if action.is_mutating() {
            info!(action = action.name(), caller = %caller.username, "drive-management change requested");
        } else {
            debug!(action = action.name(), caller = %caller.username, "drive-management action");
        }
        match action {
            DriveAction::Ping => Ok(ActionData::Ping(self.ping().await)),
            DriveAction::Usage => self.usage().await.map(ActionData::Usage),
            DriveAction::Audit { limit } => self.audit(limit).await.map(ActionData::Audit),
            DriveAction::SetSecret { secret } => {
                self.set_secret(caller, &secret.0).await.map(ActionData::SetSecret)
            }
            DriveAction::Revoke => self.revoke(caller).await.map(ActionData::Revoke),
            DriveAction::CheckServiceAccountPermission { drive_id } => {
                self.check_permission(&drive_id).await.map(ActionData::Permission)
            }
            DriveAction::FixPermission { drive_id } => {
                self.fix_permission(caller, &drive_id).await.map(ActionData::Fix)
            }
            DriveAction::BackfillPermissions => {
                self.backfill_permissions(caller).await.map(ActionData::Backfill)
            }
            DriveAction::CheckSecretConfiguration => Ok(ActionData::SecretConfiguration(
                self.check_secret_configuration().await,
            )),
            DriveAction::GetSecret => Err(PortalError::Forbidden(
                "getSecret is only available inside the server".into(),
            )),
        }
    }

    /// `dispatch` wrapped in the response envelope.
    pub async fn handle(&self, caller: &CallerProfile, action: DriveAction) -> Envelope<ActionData> {
        let name = action.name();
        let result = self.dispatch(caller, action).await;
        if let Err(err) = &result {
            info!(action = name, kind = ?err.kind(), error = %err, "drive-management action failed");
        }
        Envelope::from_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::SecretPayload;
    use crate::backend::{ClientRecord, MemoryBackend, Role};
    use crate::error::ErrorKind;
    use crate::factory::StaticDriveClientFactory;
    use crate::reconcile::BackfillStatus;
    use portal_gdrive::{DriveAbout, GDriveError, PermissionRole, SimulatedDrive};

    const SA: &str = "drive-bot@portal.iam.gserviceaccount.com";
    const KEY: &str = r#"{"type":"service_account","client_email":"drive-bot@portal.iam.gserviceaccount.com","private_key":"pem","token_uri":"https://oauth2.googleapis.com/token"}"#;

    struct Fixture {
        mem: MemoryBackend,
        sim: Arc<SimulatedDrive>,
        facade: DriveAdminFacade,
    }

    fn fixture_with(about: DriveAbout) -> Fixture {
        let mem = MemoryBackend::new();
        let sim = SimulatedDrive::with_about(about);
        let facade = DriveAdminFacade::new(
            DriveAdminConfig::default(),
            mem.backend(),
            Arc::new(StaticDriveClientFactory::new(sim.clone())),
        );
        Fixture { mem, sim, facade }
    }

    fn fixture() -> Fixture {
        fixture_with(DriveAbout {
            user_email: "workspace-admin@example.com".into(),
            storage_used: 1024,
            storage_limit: 4096,
            ..Default::default()
        })
    }

    async fn configured() -> Fixture {
        let f = fixture();
        f.facade.set_secret(&admin(), KEY).await.unwrap();
        f
    }

    fn admin() -> CallerProfile {
        CallerProfile::admin("u1", "alice")
    }

    fn client_caller() -> CallerProfile {
        CallerProfile {
            role: Role::Client,
            ..CallerProfile::admin("u2", "bob")
        }
    }

    #[tokio::test]
    async fn ping_unconfigured_reports_failure() {
        let f = fixture();
        let ping = f.facade.ping().await;
        assert!(!ping.success);
        assert_eq!(ping.error.unwrap().kind, ErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn ping_configured_succeeds() {
        let f = configured().await;
        let ping = f.facade.ping().await;
        assert!(ping.success);
        assert_eq!(ping.service_account.as_deref(), Some(SA));
        assert_eq!(ping.acting_as.as_deref(), Some("workspace-admin@example.com"));
    }

    #[tokio::test]
    async fn revoke_then_ping_is_not_stale() {
        let f = configured().await;
        assert!(f.facade.ping().await.success);
        assert!(f.facade.revoke(&admin()).await.unwrap().success);
        let ping = f.facade.ping().await;
        assert!(!ping.success);
        assert_eq!(ping.error.unwrap().kind, ErrorKind::NotConfigured);
        assert!(f.mem.audit.actions().await.contains(&SECRET_REVOKED.to_string()));
    }

    #[tokio::test]
    async fn ping_network_failure_is_flagged() {
        let f = configured().await;
        f.sim.set_outage(Some(GDriveError::network("connection reset"))).await;
        let ping = f.facade.ping().await;
        assert!(!ping.success);
        assert!(ping.error.unwrap().is_network_error);
    }

    #[tokio::test]
    async fn secret_configuration_is_three_way() {
        let f = fixture();
        let absent = f.facade.check_secret_configuration().await;
        assert!(!absent.configured);
        assert!(!absent.is_network_error);

        f.mem.secrets.set_unavailable(true);
        let unknown = f.facade.check_secret_configuration().await;
        assert!(!unknown.configured);
        assert!(unknown.is_network_error);

        f.mem.secrets.set_unavailable(false);
        f.facade.set_secret(&admin(), KEY).await.unwrap();
        let present = f.facade.check_secret_configuration().await;
        assert!(present.configured);
        assert_eq!(present.service_account.as_deref(), Some(SA));
    }

    #[tokio::test]
    async fn usage_with_zero_quota_has_no_percentage() {
        let f = fixture_with(DriveAbout {
            storage_used: 10,
            storage_limit: 0,
            ..Default::default()
        });
        f.facade.set_secret(&admin(), KEY).await.unwrap();
        let usage = f.facade.usage().await.unwrap();
        assert_eq!(usage.total_quota, 0);
        assert_eq!(usage.percent_used(), None);
    }

    #[tokio::test]
    async fn usage_unconfigured_is_typed_error() {
        let f = fixture();
        assert_eq!(f.facade.usage().await.unwrap_err(), PortalError::NotConfigured);
    }

    #[tokio::test]
    async fn fix_is_audited_once() {
        let f = configured().await;
        f.sim.insert_drive("D1", "Acme").await;
        let first = f.facade.fix_permission(&admin(), "D1").await.unwrap();
        let second = f.facade.fix_permission(&admin(), "D1").await.unwrap();
        assert!(!first.already_exists);
        assert!(second.already_exists);
        assert_eq!(f.sim.permission_writes(), 1);

        let audit = f.facade.audit(10).await.unwrap();
        let fixes: Vec<_> = audit.iter().filter(|e| e.action == PERMISSION_FIXED).collect();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].drive_id.as_deref(), Some("D1"));
    }

    #[tokio::test]
    async fn check_permission_after_fix() {
        let f = configured().await;
        f.sim.insert_drive("D1", "Acme").await;
        f.facade.fix_permission(&admin(), "D1").await.unwrap();
        let check = f.facade.check_permission("D1").await.unwrap();
        assert!(check.has_service_account_permission);
        assert_eq!(check.service_account_role.as_deref(), Some(PermissionRole::Organizer.label()));
    }

    #[tokio::test]
    async fn backfill_grants_group_and_audits() {
        let f = configured().await;
        f.sim.insert_drive("D1", "Acme").await;
        f.mem
            .directory
            .add_client(ClientRecord {
                drive_id: Some("D1".into()),
                ..ClientRecord::new("c1", "Acme")
            })
            .await;
        let summary = f.facade.backfill_permissions(&admin()).await.unwrap();
        assert_eq!(summary.results[0].status, BackfillStatus::Granted);
        assert!(f.mem.audit.actions().await.contains(&PERMISSIONS_BACKFILLED.to_string()));
    }

    #[tokio::test]
    async fn bad_upload_is_rejected_and_not_audited() {
        let f = fixture();
        let err = f.facade.set_secret(&admin(), "garbage").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
        assert_eq!(f.mem.audit.len().await, 0);
    }

    #[tokio::test]
    async fn dispatch_requires_admin() {
        let f = configured().await;
        let err = f.facade.dispatch(&client_caller(), DriveAction::Ping).await.unwrap_err();
        assert!(matches!(err, PortalError::Forbidden(_)));
    }

    #[tokio::test]
    async fn get_secret_is_not_dispatchable() {
        let f = configured().await;
        let env = f.facade.handle(&admin(), DriveAction::GetSecret).await;
        assert_eq!(env.error.unwrap().kind, ErrorKind::Forbidden);
        assert_eq!(f.facade.get_secret().await.unwrap().client_email, SA);
    }

    #[tokio::test]
    async fn handle_wraps_results() {
        let f = fixture();
        let env = f
            .facade
            .handle(
                &admin(),
                DriveAction::SetSecret {
                    secret: SecretPayload(KEY.into()),
                },
            )
            .await;
        assert!(env.error.is_none());
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["data"]["serviceAccount"], SA);

        let env = f.facade.handle(&admin(), DriveAction::FixPermission { drive_id: "nope".into() }).await;
        assert_eq!(env.error.unwrap().kind, ErrorKind::NotFound);
    }
}
