//! Service-account JWT authentication for the Drive API.
//!
//! Implements the two-legged service-account flow with domain-wide
//! delegation:
//!   1. Sign a JWT assertion with the key's RSA private key, naming the
//!      impersonated workspace user as `sub`.
//!   2. Exchange the assertion at the token endpoint for a bearer token.
//!
//! A key that cannot sign surfaces as `InvalidCredential`; a token endpoint
//! that rejects the assertion surfaces as `AuthenticationFailed`; transport
//! failures stay `NetworkError`.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::debug;
use serde::Serialize;

use crate::client::GDriveClient;
use crate::credentials::ServiceAccountKey;
use crate::types::{GDriveError, GDriveResult, OAuthToken, TokenResponse};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    /// Issuer: the service account email.
    iss: &'a str,
    /// Requested scopes (space-separated).
    scope: String,
    /// Audience: the token endpoint.
    aud: &'a str,
    exp: i64,
    iat: i64,
    /// Impersonated user for domain-wide delegation.
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

/// Token endpoint for a key, falling back to the client's configured URL.
fn token_endpoint<'a>(client: &'a GDriveClient, key: &'a ServiceAccountKey) -> &'a str {
    if key.token_uri.trim().is_empty() {
        &client.config().token_url
    } else {
        &key.token_uri
    }
}

/// Build and sign the JWT assertion for `key`.
pub fn sign_assertion(
    key: &ServiceAccountKey,
    audience: &str,
    scopes: &[&str],
    subject: Option<&str>,
) -> GDriveResult<String> {
    if scopes.is_empty() {
        return Err(GDriveError::invalid("At least one scope is required"));
    }
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        iss: &key.client_email,
        scope: scopes.join(" "),
        aud: audience,
        exp: now + ASSERTION_LIFETIME_SECS,
        iat: now,
        sub: subject,
    };

    let mut header = Header::new(Algorithm::RS256);
    if !key.private_key_id.is_empty() {
        header.kid = Some(key.private_key_id.clone());
    }

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key_pem().as_bytes())
        .map_err(|e| GDriveError::credential(format!("Failed to load private key: {e}")))?;

    encode(&header, &claims, &encoding_key)
        .map_err(|e| GDriveError::credential(format!("Failed to sign assertion: {e}")))
}

/// Exchange a signed assertion for a bearer token.
pub async fn fetch_service_account_token(
    client: &GDriveClient,
    key: &ServiceAccountKey,
    scopes: &[&str],
    subject: Option<&str>,
) -> GDriveResult<OAuthToken> {
    key.validate()?;
    let audience = token_endpoint(client, key);
    let assertion = sign_assertion(key, audience, scopes, subject)?;

    debug!("Exchanging service-account assertion for an access token");
    let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
    let resp: TokenResponse = client.post_form_unauthenticated(audience, &params).await?;
    Ok(token_from_response(resp))
}

/// Convert the raw token response to our token type.
fn token_from_response(resp: TokenResponse) -> OAuthToken {
    let expires_at = resp.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
    OAuthToken {
        access_token: resp.access_token,
        token_type: resp.token_type.unwrap_or_else(|| "Bearer".into()),
        expires_at,
        scope: resp.scope,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
