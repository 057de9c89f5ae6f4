//! Drive administration settings.

use serde::{Deserialize, Serialize};

use portal_gdrive::GDriveConfig;

/// Settings for the drive administration core.
///
/// The two principal emails are configuration, not secrets: they name who the
/// service account acts as and which group gets manager on every drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveAdminConfig {
    /// Google group granted manager on every provisioned drive.
    #[serde(default = "default_support_group_email")]
    pub support_group_email: String,

    /// Workspace admin the service account impersonates (`sub` claim).
    #[serde(default = "default_impersonated_admin_email")]
    pub impersonated_admin_email: String,

    /// Name of the service-account key in the secret store.
    #[serde(default = "default_secret_name")]
    pub secret_name: String,

    /// Clients provisioned at the same time.
    #[serde(default = "default_provisioning_concurrency")]
    pub provisioning_concurrency: usize,

    /// Drive API endpoints and request timeout.
    #[serde(default)]
    pub drive: GDriveConfig,
}

fn default_support_group_email() -> String {
    "drive-support@example.com".to_string()
}

fn default_impersonated_admin_email() -> String {
    "workspace-admin@example.com".to_string()
}

fn default_secret_name() -> String {
    "google_service_account_key".to_string()
}

fn default_provisioning_concurrency() -> usize {
    4
}

impl Default for DriveAdminConfig {
    fn default() -> Self {
        Self {
            support_group_email: default_support_group_email(),
            impersonated_admin_email: default_impersonated_admin_email(),
            secret_name: default_secret_name(),
            provisioning_concurrency: default_provisioning_concurrency(),
            drive: GDriveConfig::default(),
        }
    }
}

impl DriveAdminConfig {
    /// Concurrency clamped to at least one in-flight client.
    pub fn effective_concurrency(&self) -> usize {
        self.provisioning_concurrency.max(1)
    }
}
