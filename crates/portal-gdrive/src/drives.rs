//! Google Shared Drives management.

use serde::Serialize;

use crate::client::GDriveClient;
use crate::types::{GDriveError, GDriveResult, SharedDrive};

const DRIVE_FIELDS: &str = "id,name,createdTime,hidden";

/// Create a shared drive.
///
/// `request_id` is the Drive idempotency key: repeating the call with the
/// same id returns the drive created by the first call instead of a new one.
pub async fn create_drive(
    client: &GDriveClient,
    name: &str,
    request_id: &str,
) -> GDriveResult<SharedDrive> {
    if name.trim().is_empty() {
        return Err(GDriveError::invalid("Drive name is required"));
    }
    if request_id.trim().is_empty() {
        return Err(GDriveError::invalid("requestId is required"));
    }

    #[derive(Serialize)]
    struct Body<'a> {
        name: &'a str,
    }

    let url = client.api_url("drives");
    let query = [("requestId", request_id), ("fields", DRIVE_FIELDS)];
    client
        .post_json_with_query(&url, &query, &Body { name })
        .await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
