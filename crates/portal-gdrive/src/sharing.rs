//! Shared-drive permission (ACL) listing and granting.
//!
//! Every call passes `supportsAllDrives=true`: a shared drive is not a
//! user-owned file and the permissions endpoints refuse drive ids without it.

use crate::client::GDriveClient;
use crate::types::{
    CreatePermissionRequest, DrivePermission, GDriveError, GDriveResult, PermissionList,
};

const PERMISSION_FIELDS: &str = "id,type,role,emailAddress,domain,displayName,deleted";

/// Create a permission on a shared drive (or any file inside one).
pub async fn create_permission(
    client: &GDriveClient,
    file_id: &str,
    request: &CreatePermissionRequest,
) -> GDriveResult<DrivePermission> {
    if request.email_address.as_deref().map_or(true, |e| e.trim().is_empty()) {
        return Err(GDriveError::invalid("Permission email address is required"));
    }
    let url = client.api_url(&format!("files/{}/permissions", file_id));
    let mut query: Vec<(&str, String)> = vec![
        ("supportsAllDrives", "true".into()),
        ("fields", PERMISSION_FIELDS.into()),
    ];
    if let Some(send) = request.send_notification_email {
        query.push(("sendNotificationEmail", send.to_string()));
    }
    client.post_json_with_query(&url, &query, request).await
}

/// List one page of permissions on a shared drive.
pub async fn list_permissions(
    client: &GDriveClient,
    file_id: &str,
    page_size: Option<u32>,
    page_token: Option<&str>,
) -> GDriveResult<PermissionList> {
    let url = client.api_url(&format!("files/{}/permissions", file_id));
    let mut query: Vec<(&str, String)> = vec![
        ("supportsAllDrives", "true".into()),
        (
            "fields",
            format!("nextPageToken,permissions({})", PERMISSION_FIELDS),
        ),
    ];
    if let Some(ps) = page_size {
        query.push(("pageSize", ps.to_string()));
    }
    if let Some(pt) = page_token {
        query.push(("pageToken", pt.to_string()));
    }
    client.get_json_with_query(&url, &query).await
}

/// List all permissions on a shared drive (consuming all pages).
pub async fn list_all_permissions(
    client: &GDriveClient,
    file_id: &str,
) -> GDriveResult<Vec<DrivePermission>> {
    let mut all = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = list_permissions(client, file_id, Some(100), page_token.as_deref()).await?;
        all.extend(page.permissions);
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(all)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
