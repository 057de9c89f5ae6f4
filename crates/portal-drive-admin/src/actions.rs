//! Wire types of the drive-management function.
//!
//! Requests are `{"action": "<name>", ...payload}` with camelCase fields;
//! responses are `{data?, error?}` envelopes.

use serde::{Deserialize, Serialize};

use crate::audit::AuditLogEntry;
use crate::error::{ErrorBody, PortalError, PortalResult};
use crate::reconcile::{BackfillSummary, FixOutcome, PermissionCheck};

pub const DEFAULT_AUDIT_LIMIT: usize = 50;
pub const MAX_AUDIT_LIMIT: usize = 500;

fn default_audit_limit() -> usize {
    DEFAULT_AUDIT_LIMIT
}

/// Uploaded key material. Never printed.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretPayload(pub String);

impl std::fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretPayload(<{} bytes>)", self.0.len())
    }
}

/// A drive-management request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DriveAction {
    Ping,
    Usage,
    Audit {
        #[serde(default = "default_audit_limit")]
        limit: usize,
    },
    SetSecret {
        secret: SecretPayload,
    },
    Revoke,
    CheckServiceAccountPermission {
        #[serde(rename = "driveId")]
        drive_id: String,
    },
    FixPermission {
        #[serde(rename = "driveId")]
        drive_id: String,
    },
    BackfillPermissions,
    CheckSecretConfiguration,
    GetSecret,
}

impl DriveAction {
    /// Wire name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Usage => "usage",
            Self::Audit { .. } => "audit",
            Self::SetSecret { .. } => "setSecret",
            Self::Revoke => "revoke",
            Self::CheckServiceAccountPermission { .. } => "checkServiceAccountPermission",
            Self::FixPermission { .. } => "fixPermission",
            Self::BackfillPermissions => "backfillPermissions",
            Self::CheckSecretConfiguration => "checkSecretConfiguration",
            Self::GetSecret => "getSecret",
        }
    }

    /// Actions that change stored state or drive ACLs.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::SetSecret { .. } | Self::Revoke | Self::FixPermission { .. } | Self::BackfillPermissions
        )
    }
}

// ── Response payloads ────────────────────────────────────────────────

/// Health of the stored credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// The workspace user the service account acts as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl PingResult {
    pub fn failed(err: &PortalError) -> Self {
        Self {
            success: false,
            service_account: None,
            acting_as: None,
            error: Some(ErrorBody::from(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub bytes_used: u64,
    /// 0 when the account has no fixed quota.
    pub total_quota: u64,
}

impl UsageReport {
    /// Share of the quota in use, in percent; `None` when there is no quota.
    pub fn percent_used(&self) -> Option<f64> {
        if self.total_quota == 0 {
            return None;
        }
        let pct = self.bytes_used as f64 / self.total_quota as f64 * 100.0;
        Some(pct.clamp(0.0, 100.0))
    }
}

/// Three-way secret status: configured, absent, or unknown (network).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretConfiguration {
    pub configured: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default)]
    pub is_network_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSecretResult {
    pub success: bool,
    pub service_account: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResult {
    pub success: bool,
}

/// `data` of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionData {
    Ping(PingResult),
    Usage(UsageReport),
    Audit(Vec<AuditLogEntry>),
    SetSecret(SetSecretResult),
    Revoke(RevokeResult),
    Permission(PermissionCheck),
    Fix(FixOutcome),
    Backfill(BackfillSummary),
    SecretConfiguration(SecretConfiguration),
}

/// `{data?, error?}` response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(err: &PortalError) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }

    pub fn from_result(result: PortalResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::err(&err),
        }
    }

    pub fn into_result(self) -> PortalResult<T> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(PortalError::from(error)),
            (Some(data), None) => Ok(data),
            (None, None) => Err(PortalError::Internal("response carried neither data nor error".into())),
        }
    }
}
