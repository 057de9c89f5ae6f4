//! Drive API client factory.
//!
//! Turns a service-account key into an authenticated [`DriveApi`] acting as
//! the configured workspace admin. A fresh client (and token) is built for
//! every operation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use portal_gdrive::auth::fetch_service_account_token;
use portal_gdrive::{scopes, DriveApi, GDriveClient, GDriveConfig, GDriveError, GDriveErrorKind, ServiceAccountKey};

use crate::error::{PortalError, PortalResult};

#[async_trait]
pub trait DriveClientFactory: Send + Sync {
    /// Build an authenticated client for `key`.
    ///
    /// Fails with `CredentialInvalid` when the key cannot sign or the token
    /// endpoint refuses it, and with `Network` when the endpoint is unreachable.
    async fn build(&self, key: &ServiceAccountKey) -> PortalResult<Arc<dyn DriveApi>>;
}

/// Token exchange failures that mean the key itself is unusable.
fn token_error(e: GDriveError) -> PortalError {
    match e.kind {
        GDriveErrorKind::InvalidCredential
        | GDriveErrorKind::AuthenticationFailed
        | GDriveErrorKind::InvalidParameter => PortalError::CredentialInvalid(e.message),
        _ => PortalError::from(e),
    }
}

/// Builds reqwest-backed clients with domain-wide delegation.
pub struct GoogleDriveClientFactory {
    config: GDriveConfig,
    impersonated_admin: String,
}

impl GoogleDriveClientFactory {
    pub fn new(config: GDriveConfig, impersonated_admin: impl Into<String>) -> Self {
        Self {
            config,
            impersonated_admin: impersonated_admin.into(),
        }
    }
}

#[async_trait]
impl DriveClientFactory for GoogleDriveClientFactory {
    async fn build(&self, key: &ServiceAccountKey) -> PortalResult<Arc<dyn DriveApi>> {
        let mut client = GDriveClient::new(self.config.clone())?;
        let token = fetch_service_account_token(
            &client,
            key,
            &[scopes::DRIVE],
            Some(&self.impersonated_admin),
        )
        .await
        .map_err(|e| {
            warn!(client_email = %key.client_email, error = %e, "token exchange failed");
            token_error(e)
        })?;
        debug!(
            client_email = %key.client_email,
            subject = %self.impersonated_admin,
            "drive client authenticated"
        );
        client.set_token(token);
        Ok(Arc::new(client))
    }
}

/// Hands out one pre-built client after validating the key.
///
/// Used with [`portal_gdrive::SimulatedDrive`] for tests and offline runs.
pub struct StaticDriveClientFactory {
    api: Arc<dyn DriveApi>,
}

impl StaticDriveClientFactory {
    pub fn new(api: Arc<dyn DriveApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DriveClientFactory for StaticDriveClientFactory {
    async fn build(&self, key: &ServiceAccountKey) -> PortalResult<Arc<dyn DriveApi>> {
        key.validate().map_err(token_error)?;
        Ok(self.api.clone())
    }
}
