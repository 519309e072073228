//! Session client for the upstream finance API.
//!
//! Every call carries the stored session cookies plus the fixed headers the
//! web client sends. Cookies the upstream sets are merged back into the jar
//! and persisted after each response, whatever its status.
//!
//! An expired session (401) triggers one PIN login and one retry. A second
//! 401 is fatal: the attempt loop is bounded at two.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::{header, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
use super::ApiError;
use crate::auth::{CredentialStore, Pin, SessionCredentials};
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

/// PIN login endpoint
const AUTH_LOGIN: &str = "auth_login";

/// Session validity endpoint
const AUTH_CHECK: &str = "auth_check";

/// First attempt plus one retry after re-authentication.
const MAX_ATTEMPTS: u32 = 2;

const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.7";

/// Response of an upstream call, any status. Callers decide what a
/// non-success status means for them.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Parse the body, turning a non-success status into the matching `ApiError`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if !self.is_success() {
            return Err(ApiError::from_status(self.status, &self.body).into());
        }
        serde_json::from_str(&self.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response body: {}", e)).into()
        })
    }
}

impl From<TransportResponse> for ApiResponse {
    fn from(response: TransportResponse) -> Self {
        Self {
            status: response.status,
            body: response.body,
        }
    }
}

pub struct SessionClient<T: Transport = HttpTransport> {
    transport: T,
    store: Arc<CredentialStore>,
    credentials: Mutex<SessionCredentials>,
    pin: Pin,
    base_url: Url,
    origin: String,
    client_version: String,
    sign_token: Mutex<Option<String>>,
}

impl SessionClient<HttpTransport> {
    /// Build a client on the reqwest transport from configuration.
    pub fn from_config(
        config: &Config,
        store: Arc<CredentialStore>,
        credentials: SessionCredentials,
        pin: Pin,
    ) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Self::new(transport, store, credentials, pin, config)
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn new(
        transport: T,
        store: Arc<CredentialStore>,
        credentials: SessionCredentials,
        pin: Pin,
        config: &Config,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;
        let origin = base_url.origin().ascii_serialization();

        Ok(Self {
            transport,
            store,
            credentials: Mutex::new(credentials),
            pin,
            base_url,
            origin,
            client_version: config.client_version.clone(),
            sign_token: Mutex::new(None),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the current cookie jar.
    pub fn credentials(&self) -> SessionCredentials {
        self.credentials.lock().clone()
    }

    /// Swap in a fresh cookie jar obtained out-of-band and persist it.
    pub fn replace_credentials(&self, credentials: SessionCredentials) -> Result<()> {
        let mut current = self.credentials.lock();
        self.store.save_cookies(&credentials)?;
        *current = credentials;
        Ok(())
    }

    /// Token returned by the last successful login, if any.
    pub fn sign_token(&self) -> Option<String> {
        self.sign_token.lock().clone()
    }

    /// POST `body` to `endpoint`, re-authenticating once on an expired session.
    pub async fn call<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse> {
        self.call_with(endpoint, body, None).await
    }

    /// Like [`call`](Self::call), abandoned with `ApiError::Cancelled` once
    /// `cancel` reads `true`. A cancelled call is not retried.
    pub async fn call_cancellable<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        cancel: watch::Receiver<bool>,
    ) -> Result<ApiResponse> {
        self.call_with(endpoint, body, Some(cancel)).await
    }

    pub(crate) async fn call_with<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ApiResponse> {
        let body = serde_json::to_value(body)
            .with_context(|| format!("Failed to serialize request body for {}", endpoint))?;

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self.send(endpoint, &body, cancel.as_mut()).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response.into());
            }
            if attempt == MAX_ATTEMPTS {
                break;
            }

            warn!(endpoint = endpoint, "Session expired, re-authenticating with PIN");
            if !self.authenticate(&self.pin, cancel.as_mut()).await? {
                return Err(ApiError::AuthFailed("PIN login was rejected".to_string()).into());
            }
        }

        Err(ApiError::AuthFailed(format!(
            "{} still unauthorized after re-authentication",
            endpoint
        ))
        .into())
    }

    /// Submit the PIN. `Ok(false)` means the upstream refused it; the
    /// current session is left as it was.
    pub async fn login(&self, pin: &Pin) -> Result<bool> {
        self.authenticate(pin, None).await
    }

    /// Ask whether the current session is accepted.
    pub async fn auth_check(&self) -> Result<ApiResponse> {
        self.call(AUTH_CHECK, &json!({})).await
    }

    async fn authenticate(
        &self,
        pin: &Pin,
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<bool> {
        let body = json!({ "pincode": pin.expose() });
        let response = self.send(AUTH_LOGIN, &body, cancel).await?;

        if !response.status.is_success() {
            warn!(status = %response.status, "PIN login rejected");
            return Ok(false);
        }

        let (ok, token) = parse_login_result(&response.body)?;
        if !ok {
            warn!("PIN login returned failure");
            return Ok(false);
        }

        *self.sign_token.lock() = token;
        info!("Re-authenticated with PIN");
        Ok(true)
    }

    async fn send(
        &self,
        endpoint: &str,
        body: &Value,
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<TransportResponse> {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Invalid endpoint: {}", endpoint))?;
        let request = TransportRequest {
            url: url.to_string(),
            headers: self.headers()?,
            body: body.clone(),
        };

        let response = match cancel {
            Some(cancel) => {
                if *cancel.borrow() {
                    return Err(ApiError::Cancelled.into());
                }
                tokio::select! {
                    response = self.transport.post(request) => response?,
                    _ = cancelled(cancel) => {
                        debug!(endpoint = endpoint, "Call cancelled in flight");
                        return Err(ApiError::Cancelled.into());
                    }
                }
            }
            None => self.transport.post(request).await?,
        };

        debug!(endpoint = endpoint, status = %response.status, "Upstream call completed");
        self.absorb_cookies(&response.set_cookies)?;
        Ok(response)
    }

    fn headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT_LANGUAGE, header::HeaderValue::from_static(ACCEPT_LANGUAGE));
        headers.insert("ob-client-version", header::HeaderValue::from_str(&self.client_version)?);
        headers.insert(header::ORIGIN, header::HeaderValue::from_str(&self.origin)?);

        let cookie = self.credentials.lock().header_value();
        if !cookie.is_empty() {
            let value = header::HeaderValue::from_str(&cookie)
                .context("Session cookies are not a valid header")?;
            headers.insert(header::COOKIE, value);
        }
        Ok(headers)
    }

    /// Merge cookies set by the upstream and persist the jar.
    fn absorb_cookies(&self, set_cookies: &[(String, Option<String>)]) -> Result<()> {
        let mut credentials = self.credentials.lock();
        if credentials.merge(set_cookies.iter().cloned()) {
            debug!(updated = set_cookies.len(), "Upstream refreshed session cookies");
        }
        self.store.save_cookies(&credentials)
    }
}

/// Resolves once the flag reads `true`; never if the sender goes away.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Read the login result positionally: the first value is the success
/// flag, the last one the new session token.
fn parse_login_result(body: &str) -> Result<(bool, Option<String>)> {
    let fields: Map<String, Value> = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("Login response is not an object: {}", e)))?;

    let ok = fields.values().next().and_then(Value::as_bool).unwrap_or(false);
    let token = fields.values().last().and_then(Value::as_str).map(str::to_string);
    Ok((ok, token))
}
