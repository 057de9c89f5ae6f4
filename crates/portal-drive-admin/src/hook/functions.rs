//! How the hook reaches the drive functions.
//!
//! `HttpDriveFunctions` calls the deployed function endpoints; a request that
//! never gets an answer (connect failure, timeout, gateway error) surfaces as
//! `PortalError::Network`. `LocalDriveFunctions` calls a facade in-process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::actions::{DriveAction, Envelope};
use crate::backend::CallerProfile;
use crate::error::{PortalError, PortalResult};
use crate::facade::DriveAdminFacade;
use crate::provisioning::ProvisioningSummary;

pub const DRIVE_MANAGEMENT_PATH: &str = "/functions/v1/drive-management";
pub const CREATE_SHARED_DRIVES_PATH: &str = "/functions/v1/create-shared-drives";

#[async_trait]
pub trait DriveFunctions: Send + Sync {
    /// Invoke one drive-management action; returns the envelope's `data`.
    async fn invoke(&self, action: &DriveAction) -> PortalResult<Value>;

    /// Invoke the shared-drive creation function.
    async fn create_shared_drives(&self) -> PortalResult<ProvisioningSummary>;
}

// ── HTTP ─────────────────────────────────────────────────────────────

pub struct HttpDriveFunctions {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpDriveFunctions {
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: impl Into<String>,
        timeout: Duration,
    ) -> PortalResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortalError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: &Value) -> PortalResult<(StatusCode, String)> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        Ok((status, text))
    }
}

/// Decode a function response, or explain why it cannot be decoded.
fn decode<T: DeserializeOwned>(status: StatusCode, text: &str) -> PortalResult<T> {
    serde_json::from_str(text).map_err(|e| {
        if is_gateway_failure(status) {
            PortalError::Network(format!("drive function unavailable (HTTP {status})"))
        } else {
            PortalError::Internal(format!("unexpected response (HTTP {status}): {e}"))
        }
    })
}

fn transport_error(e: reqwest::Error) -> PortalError {
    PortalError::Network(format!("drive function unreachable: {e}"))
}

fn is_gateway_failure(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
impl DriveFunctions for HttpDriveFunctions {
    async fn invoke(&self, action: &DriveAction) -> PortalResult<Value> {
        debug!(action = action.name(), "calling drive-management function");
        let body = serde_json::to_value(action).map_err(|e| PortalError::Internal(e.to_string()))?;
        let (status, text) = self.post(DRIVE_MANAGEMENT_PATH, &body).await?;
        decode::<Envelope<Value>>(status, &text)?.into_result()
    }

    /// Success is the bare summary; failures use the error envelope.
    async fn create_shared_drives(&self) -> PortalResult<ProvisioningSummary> {
        debug!("calling create-shared-drives function");
        let (status, text) = self.post(CREATE_SHARED_DRIVES_PATH, &Value::Object(Default::default())).await?;
        let value: Value = decode(status, &text)?;
        if value.get("error").is_some() {
            return Envelope::<ProvisioningSummary>::deserialize(value)
                .map_err(|e| PortalError::Internal(format!("unexpected error body: {e}")))?
                .into_result();
        }
        serde_json::from_value(value)
            .map_err(|e| PortalError::Internal(format!("unexpected provisioning response: {e}")))
    }
}

// ── In-process ───────────────────────────────────────────────────────

pub struct LocalDriveFunctions {
    facade: Arc<DriveAdminFacade>,
    caller: CallerProfile,
}

impl LocalDriveFunctions {
    pub fn new(facade: Arc<DriveAdminFacade>, caller: CallerProfile) -> Self {
        Self { facade, caller }
    }
}

#[async_trait]
impl DriveFunctions for LocalDriveFunctions {
    async fn invoke(&self, action: &DriveAction) -> PortalResult<Value> {
        let data = self.facade.dispatch(&self.caller, action.clone()).await?;
        serde_json::to_value(data).map_err(|e| PortalError::Internal(e.to_string()))
    }

    async fn create_shared_drives(&self) -> PortalResult<ProvisioningSummary> {
        self.facade.provision_drives(&self.caller).await
    }
}
