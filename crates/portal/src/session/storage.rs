//! Pluggable persistence for the signed-in session's tokens.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tower_sessions::Session;

use crate::backend::{AuthSession, Identity};

/// Fixed key the session tokens are stored under.
pub const AUTH_TOKEN_KEY: &str = "sb-auth-token";

/// Refresh the access token when it expires within this many seconds.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors from a [`TokenStorage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The HTTP session store failed.
    #[error("session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Key/value persistence for session tokens.
///
/// Values are opaque strings; [`StoredSession`] handles the encoding.
pub trait TokenStorage: Send + Sync {
    /// Read the value under `key`.
    fn get(&self, key: &str)
    -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Write `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Delete the value under `key`.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Process-local storage, used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStorage {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryTokenStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Storage backed by the visitor's HTTP session (tower-sessions).
#[derive(Debug, Clone)]
pub struct SessionTokenStorage {
    session: Session,
}

impl SessionTokenStorage {
    /// Wrap the current request's session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl TokenStorage for SessionTokenStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.session.get::<String>(key).await?)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.session.insert(key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.session.remove::<String>(key).await?;
        Ok(())
    }
}

/// Session tokens as persisted under [`AUTH_TOKEN_KEY`].
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredSession {
    access_token: String,
    refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires.
    pub expires_at: i64,
    /// Identity the tokens were issued to.
    pub identity: Identity,
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity)
            .finish()
    }
}

impl From<&AuthSession> for StoredSession {
    fn from(session: &AuthSession) -> Self {
        Self {
            access_token: session.access_token.expose_secret().to_string(),
            refresh_token: session.refresh_token.expose_secret().to_string(),
            expires_at: session.expires_at,
            identity: session.identity.clone(),
        }
    }
}

impl StoredSession {
    /// Access token for API calls.
    #[must_use]
    pub fn access_token(&self) -> SecretString {
        SecretString::from(self.access_token.clone())
    }

    /// Refresh token for renewing the access token.
    #[must_use]
    pub fn refresh_token(&self) -> SecretString {
        SecretString::from(self.refresh_token.clone())
    }

    /// True when the access token is expired or about to be.
    #[must_use]
    pub fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at - EXPIRY_MARGIN_SECS <= now
    }

    /// Encode for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a stored session.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
