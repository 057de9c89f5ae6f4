//! Core types for the portal's Google Drive surface.
//!
//! Resource types mirror the Drive API v3 JSON model (camelCase on the wire).
//! Only the shapes the portal touches are modelled: shared drives, drive
//! permissions, the `about` resource, and service-account token material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for Google Drive operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GDriveErrorKind {
    /// HTTP-level error with an unmapped status code.
    HttpError(u16),
    /// The token endpoint or the Drive API rejected our credentials.
    AuthenticationFailed,
    /// The service-account key could not be used to sign an assertion.
    InvalidCredential,
    /// Token has expired.
    TokenExpired,
    /// Insufficient scopes for operation.
    InsufficientScope,
    /// Drive, file or permission not found.
    NotFound,
    /// Caller lacks privilege on the resource.
    PermissionDenied,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Invalid request parameter.
    InvalidParameter,
    /// Network/connectivity error.
    NetworkError,
    /// Server error (5xx).
    ServerError,
    /// Generic / unmapped error.
    Other,
}

impl GDriveErrorKind {
    /// Whether a later, user-initiated retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimitExceeded | Self::ServerError
        )
    }
}

impl std::fmt::Display for GDriveErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpError(code) => write!(f, "HTTP {}", code),
            Self::AuthenticationFailed => write!(f, "AuthenticationFailed"),
            Self::InvalidCredential => write!(f, "InvalidCredential"),
            Self::TokenExpired => write!(f, "TokenExpired"),
            Self::InsufficientScope => write!(f, "InsufficientScope"),
            Self::NotFound => write!(f, "NotFound"),
            Self::PermissionDenied => write!(f, "PermissionDenied"),
            Self::RateLimitExceeded => write!(f, "RateLimitExceeded"),
            Self::InvalidParameter => write!(f, "InvalidParameter"),
            Self::NetworkError => write!(f, "NetworkError"),
            Self::ServerError => write!(f, "ServerError"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// A Google Drive error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GDriveError {
    pub kind: GDriveErrorKind,
    pub message: String,
}

impl std::fmt::Display for GDriveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for GDriveError {}

impl GDriveError {
    pub fn new(kind: GDriveErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create from an HTTP status code and the (possibly JSON) error body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            400 if body.contains("invalid_grant") || body.contains("unauthorized_client") => {
                GDriveErrorKind::AuthenticationFailed
            }
            400 => GDriveErrorKind::InvalidParameter,
            401 => GDriveErrorKind::AuthenticationFailed,
            403 if body.contains("insufficientPermissions")
                || body.contains("ACCESS_TOKEN_SCOPE_INSUFFICIENT") =>
            {
                GDriveErrorKind::InsufficientScope
            }
            403 if body.contains("userRateLimitExceeded") || body.contains("rateLimitExceeded") => {
                GDriveErrorKind::RateLimitExceeded
            }
            403 => GDriveErrorKind::PermissionDenied,
            404 => GDriveErrorKind::NotFound,
            429 => GDriveErrorKind::RateLimitExceeded,
            500..=599 => GDriveErrorKind::ServerError,
            _ => GDriveErrorKind::HttpError(status),
        };
        Self::new(kind, body.chars().take(500).collect::<String>())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::AuthenticationFailed, msg)
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::InvalidCredential, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::InvalidParameter, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::NetworkError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::NotFound, msg)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for GDriveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timed out: {e}"))
        } else if e.is_connect() || e.is_request() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::new(GDriveErrorKind::Other, format!("Response decode error: {e}"))
        } else {
            Self::network(e.to_string())
        }
    }
}

/// Convenience type alias.
pub type GDriveResult<T> = Result<T, GDriveError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OAuth2
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Google OAuth2 scopes for Drive.
pub mod scopes {
    /// Full access to all files and shared drives.
    pub const DRIVE: &str = "https://www.googleapis.com/auth/drive";
}

/// Bearer access token minted for a service account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    /// Bearer access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiry time.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scope: Option<String>,
}

impl Default for OAuthToken {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scope: None,
        }
    }
}

impl OAuthToken {
    /// Expired, or within 60 s of expiring.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() + chrono::Duration::seconds(60) >= exp,
            None => false,
        }
    }
}

/// Raw JSON response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Drive Account Info (about)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Account identity and storage quota from the About endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveAbout {
    /// Display name of the authenticated principal.
    pub user_display_name: String,
    /// Email of the authenticated principal.
    pub user_email: String,
    /// Storage used (bytes).
    pub storage_used: u64,
    /// Storage limit (bytes); 0 when the API reports no limit.
    pub storage_limit: u64,
    /// Whether the principal can create shared drives.
    pub can_create_drives: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Permissions (sharing)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Permission type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionType {
    User,
    Group,
    Domain,
    Anyone,
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Group => write!(f, "group"),
            Self::Domain => write!(f, "domain"),
            Self::Anyone => write!(f, "anyone"),
        }
    }
}

/// Permission role on a shared drive, ordered from weakest to strongest.
///
/// `Organizer` is what the Drive UI calls "Manager". Roles the API may add in
/// the future deserialize as `Unknown` and rank below every known role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionRole {
    Unknown,
    Reader,
    Commenter,
    Writer,
    FileOrganizer,
    Organizer,
    Owner,
}

impl PermissionRole {
    /// The role required for full administration of a shared drive.
    pub const MANAGER: PermissionRole = PermissionRole::Organizer;

    /// The role string the Drive API uses.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Reader => "reader",
            Self::Commenter => "commenter",
            Self::Writer => "writer",
            Self::FileOrganizer => "fileOrganizer",
            Self::Organizer => "organizer",
            Self::Owner => "owner",
        }
    }

    /// The name shown to portal users (`organizer` reads as `manager`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Organizer => "manager",
            other => other.as_api_str(),
        }
    }

    /// Whether this role is at least `required`.
    pub fn satisfies(&self, required: PermissionRole) -> bool {
        *self != Self::Unknown && *self >= required
    }

    /// Whether this role grants manager-level control.
    pub fn is_manager(&self) -> bool {
        self.satisfies(Self::MANAGER)
    }
}

impl From<String> for PermissionRole {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "reader" => Self::Reader,
            "commenter" => Self::Commenter,
            "writer" => Self::Writer,
            "fileOrganizer" => Self::FileOrganizer,
            "organizer" | "manager" => Self::Organizer,
            "owner" => Self::Owner,
            _ => Self::Unknown,
        }
    }
}

impl From<PermissionRole> for String {
    fn from(role: PermissionRole) -> Self {
        role.as_api_str().to_string()
    }
}

impl std::fmt::Display for PermissionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// Drive permission resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrivePermission {
    /// Permission ID.
    #[serde(default)]
    pub id: String,
    /// Permission type.
    #[serde(rename = "type")]
    pub permission_type: PermissionType,
    /// Role granted.
    pub role: PermissionRole,
    /// Email address (user or group).
    #[serde(default)]
    pub email_address: Option<String>,
    /// Domain (when type=domain).
    #[serde(default)]
    pub domain: Option<String>,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Whether the permission was deleted.
    #[serde(default)]
    pub deleted: bool,
}

impl DrivePermission {
    /// Case-insensitive match on the principal email.
    pub fn is_for(&self, email: &str) -> bool {
        self.email_address
            .as_deref()
            .map(|e| e.eq_ignore_ascii_case(email))
            .unwrap_or(false)
    }
}

impl Default for DrivePermission {
    fn default() -> Self {
        Self {
            id: String::new(),
            permission_type: PermissionType::User,
            role: PermissionRole::Reader,
            email_address: None,
            domain: None,
            display_name: None,
            deleted: false,
        }
    }
}

/// Request to create a permission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionRequest {
    /// Permission type: user, group, domain, anyone.
    #[serde(rename = "type")]
    pub permission_type: PermissionType,
    /// Role to grant.
    pub role: PermissionRole,
    /// Email address (required for user and group types).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    /// Whether to send a notification email. Not part of the body.
    #[serde(skip)]
    pub send_notification_email: Option<bool>,
}

impl CreatePermissionRequest {
    /// Grant `role` to a user or service-account principal.
    pub fn user(email: impl Into<String>, role: PermissionRole) -> Self {
        Self {
            permission_type: PermissionType::User,
            role,
            email_address: Some(email.into()),
            send_notification_email: Some(false),
        }
    }

    /// Grant `role` to a Google group.
    pub fn group(email: impl Into<String>, role: PermissionRole) -> Self {
        Self {
            permission_type: PermissionType::Group,
            role,
            email_address: Some(email.into()),
            send_notification_email: Some(false),
        }
    }
}

/// Permission list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionList {
    #[serde(default)]
    pub permissions: Vec<DrivePermission>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Shared Drives
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared drive metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedDrive {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hidden: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GDriveConfig {
    /// Base URL for Drive API v3 metadata endpoints.
    pub api_base: String,
    /// Fallback token endpoint when a key carries no `token_uri`.
    pub token_url: String,
    /// Request timeout (seconds).
    pub timeout_seconds: u64,
    /// Rate-limit delay between requests (ms).
    pub rate_limit_ms: u64,
}

impl Default for GDriveConfig {
    fn default() -> Self {
        Self {
            api_base: crate::client::API_BASE.to_string(),
            token_url: crate::client::TOKEN_URL.to_string(),
            timeout_seconds: 30,
            rate_limit_ms: 0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
