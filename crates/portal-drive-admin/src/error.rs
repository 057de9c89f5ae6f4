//! Error taxonomy for drive administration.
//!
//! `PortalError` is what every operation returns. At the function boundary
//! it becomes an [`ErrorBody`] whose `kind` the UI switches on and whose
//! `isNetworkError` flag separates transport trouble from everything else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use portal_gdrive::{GDriveError, GDriveErrorKind};

/// Secret store failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SecretError {
    /// Nothing stored under the name.
    #[error("secret '{0}' is not configured")]
    NotConfigured(String),

    /// The store could not be reached.
    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    /// Something is stored but it is not a usable service-account key.
    #[error("stored secret is malformed: {0}")]
    Malformed(String),

    /// The store was reached but failed to persist a change.
    #[error("secret store write failed: {0}")]
    Backend(String),
}

/// Discriminant serialized in error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotConfigured,
    Network,
    Auth,
    Unauthenticated,
    CredentialInvalid,
    NotFound,
    InsufficientPrivilege,
    Forbidden,
    InvalidRequest,
    Backend,
    Internal,
}

impl ErrorKind {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Kinds only reachable once a stored key was loaded and used.
    pub fn implies_key_present(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::CredentialInvalid | Self::InsufficientPrivilege | Self::NotFound
        )
    }
}

/// Errors surfaced by the drive administration core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PortalError {
    /// No service-account key is stored.
    #[error("Google service account key is not configured")]
    NotConfigured,

    /// Transport failure or a transient upstream condition.
    #[error("network error: {0}")]
    Network(String),

    /// The Drive API rejected the credential (expired, revoked, wrong scope).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The portal caller has no valid session.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The key cannot be parsed or cannot mint a token.
    #[error("service account credential is invalid: {0}")]
    CredentialInvalid(String),

    /// The referenced drive does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service account lacks privilege on the drive.
    #[error("insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    /// The caller is not allowed to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request payload is unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A backend collaborator (repository, audit log) failed.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PortalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::Network(_) => ErrorKind::Network,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::CredentialInvalid(_) => ErrorKind::CredentialInvalid,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InsufficientPrivilege(_) => ErrorKind::InsufficientPrivilege,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_network(&self) -> bool {
        self.kind().is_network()
    }

    /// Whether a user-initiated retry may succeed without other changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<GDriveError> for PortalError {
    fn from(e: GDriveError) -> Self {
        match e.kind {
            GDriveErrorKind::NetworkError
            | GDriveErrorKind::ServerError
            | GDriveErrorKind::RateLimitExceeded => Self::Network(e.message),
            GDriveErrorKind::AuthenticationFailed
            | GDriveErrorKind::TokenExpired
            | GDriveErrorKind::InsufficientScope => Self::Auth(e.message),
            GDriveErrorKind::InvalidCredential => Self::CredentialInvalid(e.message),
            GDriveErrorKind::NotFound => Self::NotFound(e.message),
            GDriveErrorKind::PermissionDenied => Self::InsufficientPrivilege(e.message),
            GDriveErrorKind::InvalidParameter => Self::InvalidRequest(e.message),
            GDriveErrorKind::HttpError(_) | GDriveErrorKind::Other => {
                Self::Backend(e.to_string())
            }
        }
    }
}

impl From<SecretError> for PortalError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::NotConfigured(_) => Self::NotConfigured,
            SecretError::Unavailable(msg) => Self::Network(msg),
            SecretError::Malformed(msg) => Self::CredentialInvalid(msg),
            SecretError::Backend(msg) => Self::Backend(msg),
        }
    }
}

/// Error half of the `{data?, error?}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub is_network_error: bool,
}

impl From<&PortalError> for ErrorBody {
    fn from(e: &PortalError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
            is_network_error: e.is_network(),
        }
    }
}

impl From<ErrorBody> for PortalError {
    fn from(body: ErrorBody) -> Self {
        let msg = body.message;
        match body.kind {
            ErrorKind::NotConfigured => Self::NotConfigured,
            ErrorKind::Network => Self::Network(msg),
            ErrorKind::Auth => Self::Auth(msg),
            ErrorKind::Unauthenticated => Self::Unauthenticated(msg),
            ErrorKind::CredentialInvalid => Self::CredentialInvalid(msg),
            ErrorKind::NotFound => Self::NotFound(msg),
            ErrorKind::InsufficientPrivilege => Self::InsufficientPrivilege(msg),
            ErrorKind::Forbidden => Self::Forbidden(msg),
            ErrorKind::InvalidRequest => Self::InvalidRequest(msg),
            ErrorKind::Backend => Self::Backend(msg),
            ErrorKind::Internal => Self::Internal(msg),
        }
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
