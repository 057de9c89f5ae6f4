//! HTTP function boundary.
//!
//! Both functions authenticate the caller from `Authorization: Bearer`,
//! require an administrator, and answer with the `{data?, error?}` envelope.
//! Shared-drive creation answers a bare summary on success.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use portal_drive_admin::backend::ProfileDirectory;
use portal_drive_admin::hook::{CREATE_SHARED_DRIVES_PATH, DRIVE_MANAGEMENT_PATH};
use portal_drive_admin::{
    CallerProfile, DriveAction, DriveAdminFacade, Envelope, ErrorKind, PortalError,
};

#[derive(Clone)]
pub struct ApiService {
    facade: Arc<DriveAdminFacade>,
}

impl ApiService {
    pub fn new(facade: Arc<DriveAdminFacade>) -> Self {
        Self { facade }
    }

    pub async fn start_server(self: Arc<Self>, addr: &str) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "drive functions listening");
        axum::serve(listener, self.create_router()).await
    }

    pub fn create_router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route(DRIVE_MANAGEMENT_PATH, post(drive_management))
            .route(CREATE_SHARED_DRIVES_PATH, post(create_shared_drives))
            .with_state(self)
    }

    /// Resolve the bearer token to an administrator.
    async fn authorize(&self, headers: &HeaderMap) -> Result<CallerProfile, PortalError> {
        let token = bearer_token(headers)
            .ok_or_else(|| PortalError::Unauthenticated("missing bearer token".into()))?;
        let caller = self
            .facade
            .backend()
            .profiles
            .resolve(token)
            .await?
            .ok_or_else(|| PortalError::Unauthenticated("unknown or expired session".into()))?;
        caller.require_admin()?;
        Ok(caller)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// HTTP status carried with an error envelope.
pub fn status_for(err: &PortalError) -> StatusCode {
    match err.kind() {
        ErrorKind::Auth | ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden | ErrorKind::InsufficientPrivilege => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotConfigured => StatusCode::CONFLICT,
        ErrorKind::CredentialInvalid => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::Backend | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &PortalError) -> Response {
    (status_for(err), Json(Envelope::<()>::err(err))).into_response()
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "portal drive functions",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn drive_management(
    State(api): State<Arc<ApiService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = match api.authorize(&headers).await {
        Ok(caller) => caller,
        Err(err) => {
            warn!(error = %err, "drive-management call rejected");
            return error_response(&err);
        }
    };
    let action: DriveAction = match serde_json::from_slice(&body) {
        Ok(action) => action,
        Err(e) => return error_response(&PortalError::InvalidRequest(format!("invalid request: {e}"))),
    };
    let name = action.name();
    match api.facade.dispatch(&caller, action).await {
        Ok(data) => Json(Envelope::ok(data)).into_response(),
        Err(err) => {
            info!(action = name, kind = ?err.kind(), error = %err, "drive-management action failed");
            error_response(&err)
        }
    }
}

async fn create_shared_drives(State(api): State<Arc<ApiService>>, headers: HeaderMap) -> Response {
    let caller = match api.authorize(&headers).await {
        Ok(caller) => caller,
        Err(err) => {
            warn!(error = %err, "create-shared-drives call rejected");
            return error_response(&err);
        }
    };
    match api.facade.provision_drives(&caller).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => {
            warn!(kind = ?err.kind(), error = %err, "shared drive provisioning failed");
            error_response(&err)
        }
    }
}
