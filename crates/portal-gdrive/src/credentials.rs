//! Service-account key material.
//!
//! The JSON key file downloaded from the Google Cloud console. Only
//! `client_email` and `private_key` are needed to mint tokens (`token_uri`
//! falls back to the client's configured endpoint); the remaining fields are
//! carried so a stored key round-trips unchanged.

use serde::{Deserialize, Serialize};

use crate::types::{GDriveError, GDriveResult};

/// Parsed service account key JSON file.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub auth_provider_x509_cert_url: String,
    #[serde(default)]
    pub client_x509_cert_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universe_domain: Option<String>,
}

impl ServiceAccountKey {
    /// Parse a service account key from a JSON string.
    pub fn from_json(json: &str) -> GDriveResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| GDriveError::credential(format!("Invalid service account key JSON: {e}")))
    }

    /// Validate the key has the fields needed to mint a token.
    pub fn validate(&self) -> GDriveResult<()> {
        if self.r#type != "service_account" {
            return Err(GDriveError::credential(format!(
                "Expected type 'service_account', got '{}'",
                self.r#type
            )));
        }
        if self.private_key.trim().is_empty() {
            return Err(GDriveError::credential("private_key is empty"));
        }
        if self.client_email.trim().is_empty() {
            return Err(GDriveError::credential("client_email is empty"));
        }
        Ok(())
    }

    /// The private key with escaped line breaks normalised.
    pub(crate) fn private_key_pem(&self) -> String {
        self.private_key.replace("\\n", "\n")
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("type", &self.r#type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
