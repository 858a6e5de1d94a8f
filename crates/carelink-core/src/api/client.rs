//! Authenticated HTTP client for the carelink REST API.
//!
//! Every request goes through the same pipeline:
//!
//! 1. `authorize`: default headers plus `Authorization: Bearer <token>` when
//!    the credential store holds an access token
//! 2. transport over the shared `reqwest::Client`
//! 3. `recover_from_unauthorized`: on the first 401 for a request, exchange
//!    the refresh token for a new access token and resend once
//!
//! A failed refresh clears the stored session and surfaces as
//! [`ApiError::SessionExpired`].

use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{ApiError, Result};
use super::refresh::{RefreshFailure, RefreshGate};
use super::request::{bearer_value, PendingRequest};
use crate::auth::Session;
use crate::models::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};

// ============================================================================
// Constants
// ============================================================================

/// Default request abort threshold in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const JSON: &str = "application/json";

/// Paths of the token endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".to_string(),
            refresh: "/api/auth/refresh-token".to_string(),
            logout: "/api/auth/logout".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub endpoints: AuthEndpoints,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            endpoints: AuthEndpoints::default(),
        }
    }
}

/// Shared API client. Build one per process (see
/// [`ClientProvider`](super::ClientProvider)) and hand out `Arc`s.
pub struct AuthenticatedClient {
    http: Client,
    base_url: String,
    endpoints: AuthEndpoints,
    session: Session,
    default_headers: RwLock<HeaderMap>,
    refresh_gate: RefreshGate,
}

impl AuthenticatedClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Session,
        options: ClientOptions,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ApiError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
        default_headers.insert(header::ACCEPT, HeaderValue::from_static(JSON));

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(
            base_url = %base_url,
            timeout_ms = options.timeout.as_millis() as u64,
            "Created API client"
        );

        Ok(Self {
            http,
            base_url,
            endpoints: options.endpoints,
            session,
            default_headers: RwLock::new(default_headers),
            refresh_gate: RefreshGate::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Snapshot of the headers attached to every request.
    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    // ===== Pipeline =====

    /// Send a request, refreshing the session and resending once on a 401.
    ///
    /// Returns the response for any 2xx status; every other status becomes
    /// an [`ApiError`].
    pub async fn send(&self, mut request: PendingRequest) -> Result<Response> {
        loop {
            let generation = self.refresh_gate.generation();
            let response = self.dispatch(&request).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Self::check_response(response).await;
            }
            let rejection = Self::check_response(response)
                .await
                .err()
                .unwrap_or_else(|| ApiError::Unauthorized(String::new()));

            if request.is_retried() {
                debug!(path = %request.path, "Resent request rejected again, giving up");
                return Err(rejection);
            }
            request.mark_retried();

            let token = match self.recover_from_unauthorized(generation).await {
                Ok(token) => token,
                Err(RefreshFailure::NoRefreshToken) => {
                    debug!("No refresh token stored, propagating 401");
                    return Err(rejection);
                }
                Err(failure) => return Err(failure.into_api_error()),
            };
            request.set_bearer(&token)?;
            debug!(
                method = %request.method,
                path = %request.path,
                "Resending request with refreshed token"
            );
        }
    }

    fn authorize(&self, request: &PendingRequest) -> Result<HeaderMap> {
        let mut headers = self.default_headers();
        headers.extend(request.headers.clone());

        match self.session.access_token()? {
            Some(token) => {
                headers.insert(header::AUTHORIZATION, bearer_value(&token)?);
            }
            None if !request.headers.contains_key(header::AUTHORIZATION) => {
                headers.remove(header::AUTHORIZATION);
            }
            None => {}
        }
        Ok(headers)
    }

    async fn dispatch(&self, request: &PendingRequest) -> Result<Response> {
        let headers = self.authorize(request)?;
        let url = self.url(&request.path);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            url = %url,
            retried = request.is_retried(),
            "Sending request"
        );
        Ok(builder.send().await?)
    }

    /// Obtain a fresh access token after a 401, sharing the work with any
    /// concurrent request that hit the same 401.
    async fn recover_from_unauthorized(
        &self,
        seen_generation: u64,
    ) -> std::result::Result<String, RefreshFailure> {
        self.refresh_gate
            .run(seen_generation, move || self.refresh_stored_session())
            .await
    }

    async fn refresh_stored_session(&self) -> std::result::Result<String, RefreshFailure> {
        let refresh_token = self
            .session
            .refresh_token()
            .map_err(|e| RefreshFailure::Store(e.to_string()))?
            .ok_or(RefreshFailure::NoRefreshToken)?;

        match self.exchange_refresh_token(&refresh_token).await {
            Ok(tokens) => {
                self.session
                    .store_tokens(&tokens.access_token, tokens.refresh_token.as_deref())
                    .map_err(|e| RefreshFailure::Store(e.to_string()))?;
                self.set_default_authorization(Some(&tokens.access_token))
                    .map_err(|e| RefreshFailure::Store(e.to_string()))?;
                info!(rotated = tokens.refresh_token.is_some(), "Access token refreshed");
                Ok(tokens.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing stored session");
                if let Err(clear_err) = self.clear_credentials() {
                    warn!(error = %clear_err, "Failed to clear stored session");
                }
                Err(RefreshFailure::Expired(e.to_string()))
            }
        }
    }

    /// Call the refresh endpoint directly, without a bearer header.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let response = self
            .http
            .post(self.url(&self.endpoints.refresh))
            .header(header::ACCEPT, JSON)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let tokens: RefreshResponse = response.json().await?;
        if tokens.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "refresh response carried an empty access token".to_string(),
            ));
        }
        Ok(tokens)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn set_default_authorization(&self, token: Option<&str>) -> Result<()> {
        let value = token.map(bearer_value).transpose()?;
        let mut headers = self
            .default_headers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match value {
            Some(value) => {
                headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                headers.remove(header::AUTHORIZATION);
            }
        }
        Ok(())
    }

    fn clear_credentials(&self) -> Result<()> {
        self.set_default_authorization(None)?;
        self.session.clear()?;
        Ok(())
    }

    // ===== Session Lifecycle =====

    /// Log in and persist the issued tokens and user record.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let response = self
            .http
            .post(self.url(&self.endpoints.login))
            .header(header::ACCEPT, JSON)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let login: LoginResponse = response.json().await?;

        self.session.store_login(&login)?;
        self.set_default_authorization(Some(&login.access_token))?;
        self.refresh_gate.install(login.access_token.clone());

        info!(user_id = login.user.id, role = %login.user.role, "Logged in");
        Ok(login)
    }

    /// Exchange the stored refresh token for a new access token now,
    /// without waiting for a 401.
    pub async fn refresh_session(&self) -> Result<()> {
        let generation = self.refresh_gate.generation();
        self.recover_from_unauthorized(generation)
            .await
            .map(|_| ())
            .map_err(RefreshFailure::into_api_error)
    }

    /// Invalidate the session on the server (best effort) and clear it locally.
    pub async fn logout(&self) -> Result<()> {
        if self.session.access_token()?.is_some() {
            let request = PendingRequest::post(self.endpoints.logout.clone());
            match self.send(request).await {
                Ok(_) => info!("Logged out"),
                Err(e) => {
                    warn!(error = %e, "Server logout failed, clearing local session anyway")
                }
            }
        }

        self.clear_credentials()?;
        self.refresh_gate.revoke("logged out");
        Ok(())
    }

    // ===== Typed Helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(PendingRequest::get(path)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(PendingRequest::post(path).json(body)?).await?;
        Ok(response.json().await?)
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(PendingRequest::put(path).json(body)?).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(PendingRequest::delete(path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, MemoryStore, StorageKeys};
    use std::sync::Arc;

    fn client_with_store() -> (Arc<MemoryStore>, AuthenticatedClient) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(store.clone(), StorageKeys::default());
        let client =
            AuthenticatedClient::new("http://localhost:5000/", session, ClientOptions::default())
                .unwrap();
        (store, client)
    }

    #[test]
    fn test_url_joining() {
        let (_, client) = client_with_store();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("/api/records"), "http://localhost:5000/api/records");
        assert_eq!(client.url("api/records"), "http://localhost:5000/api/records");
        assert_eq!(client.url("https://other.example/x"), "https://other.example/x");
    }

    #[test]
    fn test_default_headers() {
        let (_, client) = client_with_store();
        let headers = client.default_headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), JSON);
        assert_eq!(headers.get(header::ACCEPT).unwrap(), JSON);
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_authorize_attaches_stored_token() {
        let (store, client) = client_with_store();
        store.set("accessToken", "abc").unwrap();

        let headers = client.authorize(&PendingRequest::get("/api/records")).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn test_authorize_without_token_drops_stale_default() {
        let (_, client) = client_with_store();
        client.set_default_authorization(Some("stale")).unwrap();

        let headers = client.authorize(&PendingRequest::get("/api/records")).unwrap();
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_clear_credentials_resets_default_header() {
        let (store, client) = client_with_store();
        store.set("accessToken", "abc").unwrap();
        store.set("refreshToken", "r1").unwrap();
        client.set_default_authorization(Some("abc")).unwrap();

        client.clear_credentials().unwrap();

        assert!(client.default_headers().get(header::AUTHORIZATION).is_none());
        assert!(store.get("accessToken").unwrap().is_none());
        assert!(store.get("refreshToken").unwrap().is_none());
    }
}
