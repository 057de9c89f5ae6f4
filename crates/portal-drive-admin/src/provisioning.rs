//! Shared-drive provisioning for clients that do not have one yet.
//!
//! Per client, in order: create the drive under an idempotency key, persist
//! it on the client record, grant the support group manager, then audit. A
//! failed group grant is reported but leaves the client provisioned; any
//! failure is confined to its own client's result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use portal_gdrive::DriveApi;

use crate::audit::{self, AuditLog, AuditLogEntry, DRIVE_CREATED};
use crate::backend::{CallerProfile, ClientRecord, ClientRepository};
use crate::error::PortalResult;
use crate::factory::DriveClientFactory;
use crate::reconcile::PermissionReconciler;
use crate::secrets::SecretAccessor;

/// Outcome for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResult {
    pub client_id: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_name: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the drive exists but the support group grant failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_error: Option<String>,
}

impl ProvisioningResult {
    fn failed(client: &ClientRecord, error: String) -> Self {
        Self {
            client_id: client.id.clone(),
            company_name: client.company_name.clone(),
            drive_id: None,
            drive_name: None,
            success: false,
            error: Some(error),
            permission_error: None,
        }
    }
}

/// Response of the shared-drive creation function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningSummary {
    pub success: bool,
    pub message: String,
    pub results: Vec<ProvisioningResult>,
}

impl ProvisioningSummary {
    pub fn from_results(results: Vec<ProvisioningResult>) -> Self {
        let message = if results.is_empty() {
            "All clients already have a shared drive".to_string()
        } else {
            let created = results.iter().filter(|r| r.success).count();
            let grants = results.iter().filter(|r| r.permission_error.is_some()).count();
            let mut message = format!("Created {created} of {} shared drives", results.len());
            if grants > 0 {
                message.push_str(&format!("; {grants} support group grant(s) need fixing"));
            }
            message
        };
        Self {
            success: true,
            message,
            results,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Drive idempotency key for one provisioning attempt of one client.
pub fn idempotency_key(client_id: &str, at: DateTime<Utc>) -> String {
    format!("client-{}-{}", client_id, at.timestamp_millis())
}

fn drive_name_for(client: &ClientRecord) -> String {
    let name = client.company_name.trim();
    if name.is_empty() {
        format!("Client {}", client.id)
    } else {
        name.to_string()
    }
}

/// The admin-triggered batch that gives every drive-less client a drive.
pub struct ProvisioningOperation {
    secrets: SecretAccessor,
    factory: Arc<dyn DriveClientFactory>,
    clients: Arc<dyn ClientRepository>,
    audit: Arc<dyn AuditLog>,
    group_email: String,
    concurrency: usize,
}

impl ProvisioningOperation {
    pub fn new(
        secrets: SecretAccessor,
        factory: Arc<dyn DriveClientFactory>,
        clients: Arc<dyn ClientRepository>,
        audit: Arc<dyn AuditLog>,
        group_email: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            secrets,
            factory,
            clients,
            audit,
            group_email: group_email.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Provision drives for all clients lacking one.
    ///
    /// The admin check runs before anything else is touched.
    #[instrument(skip_all, fields(caller = %caller.username))]
    pub async fn run(&self, caller: &CallerProfile) -> PortalResult<ProvisioningSummary> {
        caller.require_admin()?;

        let pending = self.clients.clients_without_drive().await?;
        if pending.is_empty() {
            return Ok(ProvisioningSummary::from_results(Vec::new()));
        }
        info!(count = pending.len(), "provisioning shared drives");

        let key = self.secrets.get_service_account_key().await?;
        let drive = self.factory.build(&key).await?;
        let reconciler =
            PermissionReconciler::new(drive.clone(), key.client_email.clone(), self.group_email.clone());

        let results: Vec<ProvisioningResult> = stream::iter(pending)
            .map(|client| self.provision_client(drive.as_ref(), &reconciler, caller, client))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let summary = ProvisioningSummary::from_results(results);
        info!(succeeded = summary.succeeded(), total = summary.total(), "provisioning finished");
        Ok(summary)
    }

    async fn provision_client(
        &self,
        drive: &dyn DriveApi,
        reconciler: &PermissionReconciler,
        caller: &CallerProfile,
        client: ClientRecord,
    ) -> ProvisioningResult {
        let name = drive_name_for(&client);
        let request_id = idempotency_key(&client.id, Utc::now());

        let created = match drive.create_drive(&name, &request_id).await {
            Ok(created) => created,
            Err(err) => {
                warn!(client_id = %client.id, error = %err, "drive creation failed");
                return ProvisioningResult::failed(&client, err.to_string());
            }
        };

        let mut result = ProvisioningResult {
            client_id: client.id.clone(),
            company_name: client.company_name.clone(),
            drive_id: Some(created.id.clone()),
            drive_name: Some(created.name.clone()),
            success: true,
            error: None,
            permission_error: None,
        };

        if let Err(err) = self
            .clients
            .assign_drive(&client.id, &created.id, &created.name)
            .await
        {
            warn!(client_id = %client.id, drive_id = %created.id, error = %err, "could not save drive on client");
            result.success = false;
            result.error = Some(format!("Drive {} was created but not saved: {err}", created.id));
        } else if let Err(err) = reconciler.grant_group(&created.id).await {
            warn!(client_id = %client.id, drive_id = %created.id, error = %err, "support group grant failed");
            result.permission_error = Some(err.to_string());
        }

        let mut details = format!(
            "Created shared drive \"{}\" for {} (Drive ID: {})",
            created.name, client.company_name, created.id
        );
        if let Some(err) = &result.error {
            details.push_str(&format!("; {err}"));
        }
        audit::record(
            self.audit.as_ref(),
            AuditLogEntry::new(DRIVE_CREATED, caller.username.as_str(), details).with_drive(created.id.as_str()),
        )
        .await;

        result
    }
}
