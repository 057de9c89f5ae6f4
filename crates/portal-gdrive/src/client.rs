//! HTTP client for the Google Drive API v3.
//!
//! Wraps `reqwest::Client` with bearer-token auth, optional request spacing,
//! and helpers for the HTTP verbs the portal uses. Requests are issued
//! exactly once: a failed call is surfaced to the caller and retried only
//! when a user asks for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{GDriveConfig, GDriveError, GDriveErrorKind, GDriveResult, OAuthToken};

/// Base URL for Drive API v3 metadata endpoints.
pub const API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google OAuth2 token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google Drive HTTP client with bearer auth and request spacing.
#[derive(Clone)]
pub struct GDriveClient {
    /// Inner reqwest client.
    inner: Client,
    /// Currently active access token.
    token: Option<OAuthToken>,
    /// Configuration.
    config: GDriveConfig,
    /// Nanosecond timestamp of the last request (for rate-limiting).
    last_request_ns: Arc<AtomicU64>,
}

impl GDriveClient {
    // ── Construction ─────────────────────────────────────────────

    /// Create a new client from config.
    pub fn new(config: GDriveConfig) -> GDriveResult<Self> {
        let inner = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GDriveError::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            token: None,
            config,
            last_request_ns: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create a client with default configuration.
    pub fn default_client() -> GDriveResult<Self> {
        Self::new(GDriveConfig::default())
    }

    // ── Token management ─────────────────────────────────────────

    /// Set the active access token.
    pub fn set_token(&mut self, token: OAuthToken) {
        self.token = Some(token);
    }

    pub fn config(&self) -> &GDriveConfig {
        &self.config
    }

    // ── Rate limiting ────────────────────────────────────────────

    fn now_ns() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }

    async fn rate_limit(&self) {
        if self.config.rate_limit_ms == 0 {
            return;
        }
        let now = Self::now_ns();
        let last = self.last_request_ns.load(Ordering::Relaxed);
        let min_gap = self.config.rate_limit_ms * 1_000_000; // ms → ns
        if last > 0 && now.saturating_sub(last) < min_gap {
            let wait = min_gap - now.saturating_sub(last);
            tokio::time::sleep(Duration::from_nanos(wait)).await;
        }
        self.last_request_ns.store(Self::now_ns(), Ordering::Relaxed);
    }

    // ── Request building helpers ─────────────────────────────────

    fn auth_headers(&self) -> GDriveResult<HeaderMap> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| GDriveError::auth("No access token set"))?;
        if token.is_expired() {
            return Err(GDriveError::new(
                GDriveErrorKind::TokenExpired,
                "Access token has expired",
            ));
        }
        let mut headers = HeaderMap::new();
        let val = format!("Bearer {}", token.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&val)
                .map_err(|e| GDriveError::auth(format!("Invalid auth header: {e}")))?,
        );
        Ok(headers)
    }

    fn build_request(&self, method: Method, url: &str) -> GDriveResult<RequestBuilder> {
        let headers = self.auth_headers()?;
        Ok(self.inner.request(method, url).headers(headers))
    }

    /// Send once; non-2xx responses become a mapped `GDriveError`.
    async fn execute(&self, request: RequestBuilder) -> GDriveResult<Response> {
        self.rate_limit().await;
        let request = request
            .build()
            .map_err(|e| GDriveError::invalid(format!("Failed to build request: {e}")))?;
        debug!("Drive API {} {}", request.method(), request.url().path());

        let resp = self.inner.execute(request).await.map_err(GDriveError::from)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = GDriveError::from_status(status.as_u16(), &body);
        warn!("Drive API call failed: {}", err.kind);
        Err(err)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> GDriveResult<T> {
        resp.json::<T>()
            .await
            .map_err(|e| GDriveError::new(GDriveErrorKind::Other, format!("JSON parse error: {e}")))
    }

    // ── Public HTTP verb helpers ──────────────────────────────────

    /// GET with query parameters, return JSON.
    pub async fn get_json_with_query<T, Q>(&self, url: &str, query: &Q) -> GDriveResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let req = self.build_request(Method::GET, url)?.query(query);
        let resp = self.execute(req).await?;
        Self::decode(resp).await
    }

    /// POST a JSON body with query parameters, return JSON.
    pub async fn post_json_with_query<B, Q, T>(&self, url: &str, query: &Q, body: &B) -> GDriveResult<T>
    where
        B: Serialize + ?Sized,
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body_bytes = serde_json::to_vec(body)
            .map_err(|e| GDriveError::invalid(format!("Body serialization: {e}")))?;
        let req = self
            .build_request(Method::POST, url)?
            .query(query)
            .header(CONTENT_TYPE, "application/json")
            .body(body_bytes);
        let resp = self.execute(req).await?;
        Self::decode(resp).await
    }

    /// POST a form to the token endpoint (un-authenticated).
    pub async fn post_form_unauthenticated<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> GDriveResult<T> {
        let req = self.inner.post(url).form(params);
        let resp = self.execute(req).await?;
        resp.json::<T>()
            .await
            .map_err(|e| GDriveError::auth(format!("Token response parse error: {e}")))
    }

    /// Build a full API URL: `{api_base}/{path}`.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn api_url_construction() {
        let client = GDriveClient::default_client().unwrap();
        assert_eq!(
            client.api_url("drives"),
            "https://www.googleapis.com/drive/v3/drives"
        );
        assert_eq!(
            client.api_url("/files/0AB/permissions"),
            "https://www.googleapis.com/drive/v3/files/0AB/permissions"
        );
    }

    #[test]
    fn api_url_with_custom_base() {
        let client = GDriveClient::new(GDriveConfig {
            api_base: "http://127.0.0.1:9000/drive/v3/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.api_url("about"), "http://127.0.0.1:9000/drive/v3/about");
    }

    #[test]
    fn auth_headers_no_token() {
        let client = GDriveClient::default_client().unwrap();
        let err = client.auth_headers().unwrap_err();
        assert_eq!(err.kind, GDriveErrorKind::AuthenticationFailed);
    }

    #[test]
    fn auth_headers_expired_token() {
        let mut client = GDriveClient::default_client().unwrap();
        client.set_token(OAuthToken {
            access_token: "ya29.expired".into(),
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        });
        let err = client.auth_headers().unwrap_err();
        assert_eq!(err.kind, GDriveErrorKind::TokenExpired);
    }

    #[test]
    fn auth_headers_valid_token() {
        let mut client = GDriveClient::default_client().unwrap();
        client.set_token(OAuthToken {
            access_token: "ya29.valid".into(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        });
        let headers = client.auth_headers().unwrap();
        let auth_val = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth_val, "Bearer ya29.valid");
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let mut client = GDriveClient::new(GDriveConfig {
            // Port 9 (discard) on localhost is almost never listening.
            api_base: "http://127.0.0.1:9/drive/v3".into(),
            timeout_seconds: 2,
            ..Default::default()
        })
        .unwrap();
        client.set_token(OAuthToken {
            access_token: "ya29.valid".into(),
            ..Default::default()
        });
        let url = client.api_url("about");
        let err = client
            .get_json_with_query::<serde_json::Value, _>(&url, &[("fields", "user")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, GDriveErrorKind::NetworkError);
    }
}
