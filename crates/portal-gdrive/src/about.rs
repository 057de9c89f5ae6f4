//! The Drive `about` resource: who we are authenticated as, and quota.

use serde::Deserialize;

use crate::client::GDriveClient;
use crate::types::{DriveAbout, GDriveResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAbout {
    user: Option<RawUser>,
    storage_quota: Option<RawQuota>,
    can_create_drives: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    display_name: Option<String>,
    email_address: Option<String>,
}

/// Quota numbers arrive as decimal strings; `limit` is absent when unlimited.
#[derive(Deserialize)]
struct RawQuota {
    limit: Option<String>,
    usage: Option<String>,
}

fn parse_bytes(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

impl From<RawAbout> for DriveAbout {
    fn from(raw: RawAbout) -> Self {
        let (display_name, email) = raw
            .user
            .map(|u| (u.display_name, u.email_address))
            .unwrap_or((None, None));
        let (limit, usage) = raw
            .storage_quota
            .map(|q| (q.limit, q.usage))
            .unwrap_or((None, None));
        DriveAbout {
            user_display_name: display_name.unwrap_or_default(),
            user_email: email.unwrap_or_default(),
            storage_used: parse_bytes(usage.as_deref()),
            storage_limit: parse_bytes(limit.as_deref()),
            can_create_drives: raw.can_create_drives.unwrap_or(false),
        }
    }
}

/// Fetch account identity and storage quota.
pub async fn get_about(client: &GDriveClient) -> GDriveResult<DriveAbout> {
    let url = client.api_url("about");
    let query = [("fields", "user(displayName,emailAddress),storageQuota(limit,usage),canCreateDrives")];
    let raw: RawAbout = client.get_json_with_query(&url, &query).await?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_about() {
        let raw: RawAbout = serde_json::from_str(
            r#"{
                "user": {"displayName": "Workspace Admin", "emailAddress": "admin@example.com"},
                "storageQuota": {"limit": "16106127360", "usage": "524288"},
                "canCreateDrives": true
            }"#,
        )
        .unwrap();
        let about = DriveAbout::from(raw);
        assert_eq!(about.user_email, "admin@example.com");
        assert_eq!(about.storage_limit, 16_106_127_360);
        assert_eq!(about.storage_used, 524_288);
        assert!(about.can_create_drives);
    }

    #[test]
    fn unlimited_quota_is_zero_limit() {
        let raw: RawAbout =
            serde_json::from_str(r#"{"storageQuota": {"usage": "42"}}"#).unwrap();
        let about = DriveAbout::from(raw);
        assert_eq!(about.storage_limit, 0);
        assert_eq!(about.storage_used, 42);
        assert!(about.user_email.is_empty());
    }

    #[test]
    fn garbage_numbers_default_to_zero() {
        assert_eq!(parse_bytes(Some("n/a")), 0);
        assert_eq!(parse_bytes(None), 0);
        assert_eq!(parse_bytes(Some(" 7 ")), 7);
    }
}
