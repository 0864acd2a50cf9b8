//! Identity provider API (`auth/v1`).
//!
//! Password sign-in, refresh-token exchange, current-user lookup and
//! sign-out. The portal never sees passwords beyond forwarding them here.

use franchise_portal_core::{Email, IdentityId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{AuthedClient, BackendClient, BackendError, check_status};

/// Authenticated principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque provider-issued ID.
    pub id: IdentityId,
    /// Email address, when the identity has one.
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued by a successful sign-in or refresh.
#[derive(Clone)]
pub struct AuthSession {
    /// Short-lived bearer token for API calls.
    pub access_token: SecretString,
    /// Long-lived token exchanged for a new access token.
    pub refresh_token: SecretString,
    /// Unix timestamp (seconds) at which `access_token` expires.
    pub expires_at: i64,
    /// The signed-in identity.
    pub identity: Identity,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let now = chrono::Utc::now().timestamp();
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| now + self.expires_in.unwrap_or(3600));

        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            identity: self.user,
        }
    }
}

impl BackendClient {
    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` if the credentials are rejected.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .http()
            .post(url)
            .headers(self.headers(None)?)
            .json(&PasswordGrant {
                email: email.as_str(),
                password: password.expose_secret(),
            })
            .send()
            .await?;

        let token: TokenResponse = check_credentials(response).await?.json().await?;
        let session = token.into_session();
        tracing::info!(identity = %session.identity.id, "signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a fresh session.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` if the refresh token is no longer valid.
    #[instrument(skip_all)]
    pub async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .http()
            .post(url)
            .headers(self.headers(None)?)
            .json(&RefreshGrant {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await?;

        let token: TokenResponse = check_credentials(response).await?.json().await?;
        Ok(token.into_session())
    }

    /// Check that the identity provider is reachable.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the provider does not answer with success.
    pub async fn health(&self) -> Result<(), BackendError> {
        let url = self.endpoint(&["auth", "v1", "health"])?;
        let response = self
            .http()
            .get(url)
            .headers(self.headers(None)?)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

impl AuthedClient {
    /// Resolve the identity that owns this client's access token.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` if the token is expired or revoked.
    #[instrument(skip(self))]
    pub async fn get_user(&self) -> Result<Identity, BackendError> {
        let url = self.backend().endpoint(&["auth", "v1", "user"])?;
        let response = self
            .backend()
            .http()
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Revoke this client's session at the identity provider.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the provider call fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let url = self.backend().endpoint(&["auth", "v1", "logout"])?;
        let response = self
            .backend()
            .http()
            .post(url)
            .headers(self.headers()?)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

/// GoTrue answers bad credentials with 400 `invalid_grant`.
async fn check_credentials(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    match check_status(response).await {
        Err(BackendError::Api {
            status: 400,
            message,
        }) => Err(BackendError::Unauthorized(message)),
        other => other,
    }
}
