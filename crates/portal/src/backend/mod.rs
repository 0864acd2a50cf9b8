//! Hosted backend client.
//!
//! The portal owns no persistence of its own. Authentication, table access
//! and blob storage are all delegated to a Supabase-style backend exposing:
//!
//! - `auth/v1/*` - password sign-in, token refresh, current user, sign-out
//! - `rest/v1/<table>` - `PostgREST` select/insert/update/delete/upsert
//! - `storage/v1/object/<bucket>/<path>` - blob upload and download
//!
//! [`BackendClient`] is constructed once at startup and shared through
//! `AppState`. Row-level permissions are evaluated by the backend against the
//! caller's access token, so every table or storage call goes through an
//! [`AuthedClient`] that carries the signed-in user's token.

pub mod auth;
pub mod rest;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::BackendConfig;

pub use auth::{AuthSession, Identity};
pub use rest::{Order, SelectQuery};

/// Transport-level timeout for a single backend HTTP call.
///
/// Collection fetches race their own, shorter, timeout on top of this.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed (connection, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },

    /// Credentials or access token were rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A row or object that was expected to exist does not.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// True when the backend rejected the caller's credentials or policies.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::Api { status: 401 | 403, .. }
        )
    }
}

/// Error body shapes returned by the auth, REST and storage APIs.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.message)
            .or(self.msg)
            .or(self.error)
    }
}

/// Shared backend client.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    documents_bucket: String,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("documents_bucket", &self.inner.documents_bucket)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a backend client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("franchise-portal/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                http,
                base_url: config.url.clone(),
                anon_key: config.anon_key.clone(),
                documents_bucket: config.documents_bucket.clone(),
            }),
        })
    }

    /// Bind the client to a signed-in user's access token.
    #[must_use]
    pub fn authed(&self, access_token: SecretString) -> AuthedClient {
        AuthedClient {
            client: self.clone(),
            access_token,
        }
    }

    /// Blob storage bucket that holds uploaded documents.
    #[must_use]
    pub fn documents_bucket(&self) -> &str {
        &self.inner.documents_bucket
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Default headers for a call made with `bearer` (or the anon key).
    pub(crate) fn headers(&self, bearer: Option<&SecretString>) -> Result<HeaderMap, BackendError> {
        let anon = self.inner.anon_key.expose_secret();
        let token = bearer.map_or(anon, |t| t.expose_secret());

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(anon)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        Ok(headers)
    }
}

/// Backend client bound to one user's access token.
#[derive(Clone)]
pub struct AuthedClient {
    client: BackendClient,
    access_token: SecretString,
}

impl std::fmt::Debug for AuthedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthedClient")
            .field("client", &self.client)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl AuthedClient {
    /// The underlying shared client.
    #[must_use]
    pub const fn backend(&self) -> &BackendClient {
        &self.client
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap, BackendError> {
        self.client.headers(Some(&self.access_token))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, BackendError> {
    HeaderValue::from_str(value).map_err(|e| BackendError::Api {
        status: 0,
        message: format!("invalid header value: {e}"),
    })
}

/// Turn a non-success response into a [`BackendError`].
///
/// Successful responses are passed through untouched.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(ApiErrorBody::into_message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                body
            }
        });

    tracing::debug!(status = status.as_u16(), %message, "backend call failed");

    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => BackendError::Unauthorized(message),
        reqwest::StatusCode::NOT_FOUND => BackendError::NotFound(message),
        _ => BackendError::Api {
            status: status.as_u16(),
            message,
        },
    })
}
