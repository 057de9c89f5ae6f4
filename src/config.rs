//! Server configuration from `PORTAL_`-prefixed environment variables.

use std::path::PathBuf;

use serde::Deserialize;

use portal_drive_admin::DriveAdminConfig;
use portal_gdrive::GDriveConfig;

const ENV_PREFIX: &str = "PORTAL_";

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON file holding clients, profiles, audit entries and the key.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub support_group_email: Option<String>,

    #[serde(default)]
    pub impersonated_admin_email: Option<String>,

    #[serde(default = "default_provisioning_concurrency")]
    pub provisioning_concurrency: usize,

    /// Timeout for each Drive API request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_secret_name")]
    pub secret_name: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_store_path() -> PathBuf {
    PathBuf::from("portal-store.json")
}

fn default_provisioning_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_secret_name() -> String {
    "google_service_account_key".to_string()
}

impl PortalConfig {
    /// Read `.env` when present, then the process environment.
    pub fn load() -> Result<Self, envy::Error> {
        // A missing .env file is fine.
        _ = dotenvy::dotenv();
        envy::prefixed(ENV_PREFIX).from_env()
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the drive administration core.
    pub fn drive_admin(&self) -> DriveAdminConfig {
        let defaults = DriveAdminConfig::default();
        DriveAdminConfig {
            support_group_email: self
                .support_group_email
                .clone()
                .unwrap_or(defaults.support_group_email),
            impersonated_admin_email: self
                .impersonated_admin_email
                .clone()
                .unwrap_or(defaults.impersonated_admin_email),
            secret_name: self.secret_name.clone(),
            provisioning_concurrency: self.provisioning_concurrency,
            drive: GDriveConfig {
                timeout_seconds: self.request_timeout_secs,
                ..GDriveConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = PortalConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:8787");
        assert_eq!(config.store_path, PathBuf::from("portal-store.json"));
        assert!(!config.log_json);

        let core = config.drive_admin();
        assert_eq!(core.support_group_email, "drive-support@example.com");
        assert_eq!(core.secret_name, "google_service_account_key");
        assert_eq!(core.provisioning_concurrency, 4);
        assert_eq!(core.drive.timeout_seconds, 30);
    }

    #[test]
    fn overrides_from_prefixed_vars() {
        let config = PortalConfig::from_vars(vars(&[
            ("PORTAL_PORT", "9000"),
            ("PORTAL_SUPPORT_GROUP_EMAIL", "it@acme.test"),
            ("PORTAL_IMPERSONATED_ADMIN_EMAIL", "root@acme.test"),
            ("PORTAL_PROVISIONING_CONCURRENCY", "2"),
            ("PORTAL_REQUEST_TIMEOUT_SECS", "5"),
            ("PORTAL_LOG_JSON", "true"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.log_json);

        let core = config.drive_admin();
        assert_eq!(core.support_group_email, "it@acme.test");
        assert_eq!(core.impersonated_admin_email, "root@acme.test");
        assert_eq!(core.provisioning_concurrency, 2);
        assert_eq!(core.drive.timeout_seconds, 5);
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(PortalConfig::from_vars(vars(&[("PORTAL_PORT", "eighty")])).is_err());
    }
}
