//! Append-only audit log of drive administration actions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::PortalResult;

// ── Action names ─────────────────────────────────────────────────────

pub const DRIVE_CREATED: &str = "drive_created";
pub const PERMISSION_FIXED: &str = "permission_fixed";
pub const PERMISSIONS_BACKFILLED: &str = "permissions_backfilled";
pub const SECRET_UPLOADED: &str = "secret_uploaded";
pub const SECRET_REVOKED: &str = "secret_revoked";

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub action: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    /// Drive the action concerned, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
}

impl AuditLogEntry {
    pub fn new(
        action: impl Into<String>,
        username: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            username: username.into(),
            timestamp: Utc::now(),
            details: details.into(),
            drive_id: None,
        }
    }

    pub fn with_drive(mut self, drive_id: impl Into<String>) -> Self {
        self.drive_id = Some(drive_id.into());
        self
    }

    /// The drive this entry refers to.
    ///
    /// Prefers the structured column. Entries written before it existed only
    /// mention the drive in `details`, so fall back to scanning that.
    pub fn referenced_drive_id(&self) -> Option<String> {
        if let Some(id) = self.drive_id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        drive_id_in_text(&self.details)
    }
}

/// Find a Drive id in free text.
///
/// Anything labelled `Drive ID: <id>` counts. After a bare `drive` only a
/// shared-drive shaped token (`0A` prefix) does, so names are never taken.
pub fn drive_id_in_text(text: &str) -> Option<String> {
    let re = Regex::new(
        r"\b(?i:drive\s+id):\s*([0-9A-Za-z_-]{6,})|\b(?i:drive)\s+(0A[0-9A-Za-z_-]{4,})(?:[^0-9A-Za-z_-]|$)",
    )
    .ok()?;
    re.captures(text)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> PortalResult<()>;

    /// Up to `limit` entries, most recent first.
    async fn recent(&self, limit: usize) -> PortalResult<Vec<AuditLogEntry>>;
}

/// Append `entry` and mirror it on the `portal.audit` tracing target.
///
/// A failed append is logged and swallowed: the action it describes has
/// already happened and must not be reported as failed.
pub async fn record(log: &dyn AuditLog, entry: AuditLogEntry) {
    info!(
        target: "portal.audit",
        action = %entry.action,
        username = %entry.username,
        drive_id = entry.drive_id.as_deref(),
        details = %entry.details,
        "audit event recorded"
    );
    let action = entry.action.clone();
    if let Err(err) = log.append(entry).await {
        warn!(target: "portal.audit", action = %action, error = %err, "failed to persist audit entry");
    }
}

/// In-process audit log.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn actions(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

/// Most recent first, at most `limit`.
pub fn newest_first(entries: &[AuditLogEntry], limit: usize) -> Vec<AuditLogEntry> {
    let mut out: Vec<AuditLogEntry> = entries.to_vec();
    // Stable sort keeps insertion order reversed for equal timestamps.
    out.reverse();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out.truncate(limit);
    out
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: AuditLogEntry) -> PortalResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> PortalResult<Vec<AuditLogEntry>> {
        Ok(newest_first(&self.entries.read().await, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn structured_drive_id_wins() {
        let entry = AuditLogEntry::new(DRIVE_CREATED, "alice", "Created drive 0AAAAfromtext")
            .with_drive("0AStructured");
        assert_eq!(entry.referenced_drive_id().as_deref(), Some("0AStructured"));
    }

    #[test]
    fn falls_back_to_details() {
        let entry = AuditLogEntry::new(
            DRIVE_CREATED,
            "alice",
            "Created shared drive \"Acme\" for Acme Corp (Drive ID: 0AHk3-x_9PVA)",
        );
        assert_eq!(entry.referenced_drive_id().as_deref(), Some("0AHk3-x_9PVA"));

        let entry = AuditLogEntry::new(PERMISSION_FIXED, "alice", "Granted manager on drive 0AXYZ123456");
        assert_eq!(entry.referenced_drive_id().as_deref(), Some("0AXYZ123456"));
    }

    #[test]
    fn no_drive_mentioned() {
        let entry = AuditLogEntry::new(SECRET_REVOKED, "alice", "Service account key revoked");
        assert_eq!(entry.referenced_drive_id(), None);
        assert_eq!(drive_id_in_text("drive ab"), None);
    }

    #[test]
    fn drive_names_are_not_ids() {
        assert_eq!(drive_id_in_text("Created shared drive Initech_Global for Initech"), None);
        assert_eq!(drive_id_in_text("Created shared drive 0A for Acme"), None);
        assert_eq!(
            drive_id_in_text("Created shared drive Initech_Global (Drive ID: 0AInitech01)").as_deref(),
            Some("0AInitech01")
        );
        assert_eq!(drive_id_in_text("drive id: 0AlowerCase1").as_deref(), Some("0AlowerCase1"));
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let log = MemoryAuditLog::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut e = AuditLogEntry::new("a", "alice", format!("entry {i}"));
            e.timestamp = base + Duration::seconds(i);
            log.append(e).await.unwrap();
        }
        let recent = log.recent(3).await.unwrap();
        let details: Vec<_> = recent.iter().map(|e| e.details.as_str()).collect();
        assert_eq!(details, vec!["entry 4", "entry 3", "entry 2"]);
        assert!(log.recent(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_timestamp_keeps_latest_append_first() {
        let log = MemoryAuditLog::new();
        let ts = Utc::now();
        for i in 0..3 {
            let mut e = AuditLogEntry::new("a", "alice", format!("entry {i}"));
            e.timestamp = ts;
            log.append(e).await.unwrap();
        }
        assert_eq!(log.recent(1).await.unwrap()[0].details, "entry 2");
    }

    #[tokio::test]
    async fn record_appends() {
        let log = MemoryAuditLog::new();
        record(log.as_ref(), AuditLogEntry::new(SECRET_UPLOADED, "alice", "uploaded")).await;
        assert_eq!(log.actions().await, vec![SECRET_UPLOADED]);
    }

    #[test]
    fn entry_wire_shape() {
        let entry = AuditLogEntry::new(DRIVE_CREATED, "alice", "x").with_drive("0A1");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["driveId"], "0A1");
        assert!(json.get("timestamp").is_some());
    }
}
