//! Session and profile resolution.
//!
//! [`SessionAccessor`] turns whatever tokens are persisted in a
//! [`TokenStorage`] into the current [`Identity`], refreshing the access token
//! when it is about to expire. [`load_profile`] fetches the matching row of
//! the `profiles` table. Nothing is cached beyond one accessor's lifetime;
//! every request resolves from scratch.

pub mod storage;
pub mod watcher;

use chrono::{DateTime, Utc};
use franchise_portal_core::{Email, FranchiseId, IdentityId, Role};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::backend::{AuthedClient, BackendClient, BackendError, Identity, SelectQuery};

pub use storage::{
    AUTH_TOKEN_KEY, MemoryTokenStorage, SessionTokenStorage, StorageError, StoredSession,
    TokenStorage,
};
pub use watcher::{IdentityEvents, ProfileWatcher, SignedIn};

/// Table holding one profile per identity.
pub const PROFILES_TABLE: &str = "profiles";

/// Errors that can occur while resolving the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("stored session is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Application-level record for an identity.
///
/// Created out-of-band by administrators; the portal only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: IdentityId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub franchise_id: Option<FranchiseId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The signed-in user as seen by route handlers.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    /// `None` when the identity has no profile row yet.
    pub profile: Option<Profile>,
    client: AuthedClient,
}

impl CurrentUser {
    /// Assemble a current user from its parts.
    #[must_use]
    pub const fn new(identity: Identity, profile: Option<Profile>, client: AuthedClient) -> Self {
        Self {
            identity,
            profile,
            client,
        }
    }

    /// Role-derived visibility flag. Not a security boundary: the backend's
    /// row-level policies decide what a write may actually do.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(|p| p.role.is_admin())
    }

    /// Role from the profile, franchisee when there is no profile.
    #[must_use]
    pub fn role(&self) -> Role {
        self.profile.as_ref().map(|p| p.role).unwrap_or_default()
    }

    /// Full name when set, otherwise the email address.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.profile
            .as_ref()
            .and_then(|p| p.full_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.email())
    }

    /// Email from the profile, falling back to the identity's.
    #[must_use]
    pub fn email(&self) -> String {
        self.profile
            .as_ref()
            .and_then(|p| p.email.clone())
            .or_else(|| self.identity.email.clone())
            .unwrap_or_default()
    }

    /// Franchise assigned to the profile, if any.
    #[must_use]
    pub fn franchise_id(&self) -> Option<&FranchiseId> {
        self.profile.as_ref().and_then(|p| p.franchise_id.as_ref())
    }

    /// Backend client acting as this user.
    #[must_use]
    pub const fn client(&self) -> &AuthedClient {
        &self.client
    }
}

/// Fetch the profile row for `id`.
///
/// # Errors
///
/// Returns `BackendError` if the lookup fails. A missing row is `Ok(None)`.
#[instrument(skip(client), fields(identity = %id))]
pub async fn load_profile(
    client: &AuthedClient,
    id: &IdentityId,
) -> Result<Option<Profile>, BackendError> {
    let query = SelectQuery::table(PROFILES_TABLE)
        .eq("id", id.as_str())
        .limit(1);
    let rows: Vec<Profile> = client.select(&query).await?;
    Ok(rows.into_iter().next())
}

/// Resolves and mutates the session persisted in `S`.
pub struct SessionAccessor<S> {
    backend: BackendClient,
    storage: S,
    events: IdentityEvents,
}

impl<S: TokenStorage> SessionAccessor<S> {
    /// Create an accessor over `storage`.
    #[must_use]
    pub fn new(backend: BackendClient, storage: S) -> Self {
        Self {
            backend,
            storage,
            events: IdentityEvents::new(),
        }
    }

    /// Identity-change notifications published by this accessor.
    #[must_use]
    pub const fn events(&self) -> &IdentityEvents {
        &self.events
    }

    /// Sign in with a password and persist the resulting tokens.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backend` with `BackendError::Unauthorized` when
    /// the credentials are rejected.
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, SessionError> {
        let session = self.backend.sign_in_with_password(email, password).await?;
        self.persist(&StoredSession::from(&session)).await?;
        self.events.publish(Some(SignedIn::new(
            session.identity.clone(),
            session.access_token.clone(),
        )));
        Ok(session.identity)
    }

    /// Load the persisted session, refreshing the access token if needed.
    ///
    /// Returns `Ok(None)` when nobody is signed in. A session whose refresh
    /// token was rejected is removed from storage and treated as signed out.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if storage fails or the refresh call fails for a
    /// reason other than rejected credentials.
    pub async fn current_session(&self) -> Result<Option<StoredSession>, SessionError> {
        let Some(raw) = self.storage.get(AUTH_TOKEN_KEY).await? else {
            return Ok(None);
        };

        let stored = match StoredSession::decode(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable stored session");
                self.storage.remove(AUTH_TOKEN_KEY).await?;
                return Ok(None);
            }
        };

        if !stored.needs_refresh(chrono::Utc::now().timestamp()) {
            self.announce(&stored);
            return Ok(Some(stored));
        }

        match self.backend.refresh_session(&stored.refresh_token()).await {
            Ok(session) => {
                let refreshed = StoredSession::from(&session);
                self.persist(&refreshed).await?;
                tracing::debug!(identity = %refreshed.identity.id, "access token refreshed");
                self.announce(&refreshed);
                Ok(Some(refreshed))
            }
            Err(e) if e.is_permission_denied() => {
                tracing::info!(error = %e, "refresh token rejected, signing out");
                self.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the current identity, verifying the token with the provider.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if storage or the provider call fails.
    pub async fn current_identity(&self) -> Result<Option<(Identity, AuthedClient)>, SessionError> {
        let Some(stored) = self.current_session().await? else {
            return Ok(None);
        };

        let client = self.backend.authed(stored.access_token());
        match client.get_user().await {
            Ok(identity) => Ok(Some((identity, client))),
            Err(e) if e.is_permission_denied() => {
                tracing::info!(error = %e, "stored access token rejected, signing out");
                self.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the identity and its profile in one step.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if any lookup fails.
    pub async fn current_user(&self) -> Result<Option<CurrentUser>, SessionError> {
        let Some((identity, client)) = self.current_identity().await? else {
            return Ok(None);
        };
        let profile = load_profile(&client, &identity.id).await?;
        Ok(Some(CurrentUser::new(identity, profile, client)))
    }

    /// Sign out: revoke at the provider (best effort) and forget the tokens.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the tokens cannot be removed.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        if let Ok(Some(raw)) = self.storage.get(AUTH_TOKEN_KEY).await
            && let Ok(stored) = StoredSession::decode(&raw)
            && let Err(e) = self.backend.authed(stored.access_token()).sign_out().await
        {
            tracing::warn!(error = %e, "provider sign-out failed");
        }
        self.clear().await
    }

    async fn persist(&self, stored: &StoredSession) -> Result<(), SessionError> {
        self.storage.set(AUTH_TOKEN_KEY, stored.encode()?).await?;
        Ok(())
    }

    fn announce(&self, stored: &StoredSession) {
        self.events.publish(Some(SignedIn::new(
            stored.identity.clone(),
            stored.access_token(),
        )));
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.storage.remove(AUTH_TOKEN_KEY).await?;
        self.events.publish(None);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn user(profile: Option<Profile>) -> CurrentUser {
        let backend =
            BackendClient::new(&BackendConfig::new("https://demo.supabase.co", "anon").unwrap())
                .unwrap();
        CurrentUser::new(
            Identity {
                id: IdentityId::new("u-1"),
                email: Some("identity@franchise.example".to_string()),
            },
            profile,
            backend.authed(SecretString::from("t")),
        )
    }

    fn profile(role: Role, full_name: Option<&str>) -> Profile {
        Profile {
            id: IdentityId::new("u-1"),
            email: Some("profile@franchise.example".to_string()),
            full_name: full_name.map(String::from),
            role,
            franchise_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_is_admin_follows_profile_role() {
        assert!(user(Some(profile(Role::Admin, None))).is_admin());
        assert!(!user(Some(profile(Role::Franchisee, None))).is_admin());
        assert!(!user(None).is_admin());
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(
            user(Some(profile(Role::Franchisee, Some("Ana García")))).display_name(),
            "Ana García"
        );
        assert_eq!(
            user(Some(profile(Role::Franchisee, Some("  ")))).display_name(),
            "profile@franchise.example"
        );
        assert_eq!(user(None).display_name(), "identity@franchise.example");
    }

    #[test]
    fn test_profile_tolerates_missing_columns() {
        let profile: Profile = serde_json::from_str(r#"{"id":"u-1","role":"admin"}"#).unwrap();
        assert!(profile.role.is_admin());
        assert!(profile.franchise_id.is_none());
    }

    #[tokio::test]
    async fn test_no_stored_tokens_means_signed_out() {
        let backend =
            BackendClient::new(&BackendConfig::new("http://127.0.0.1:9", "anon").unwrap())
                .unwrap();
        let accessor = SessionAccessor::new(backend, MemoryTokenStorage::new());
        assert!(accessor.current_session().await.unwrap().is_none());
        assert_eq!(accessor.events().current(), None);
    }

    #[tokio::test]
    async fn test_unreadable_tokens_are_discarded() {
        let backend =
            BackendClient::new(&BackendConfig::new("http://127.0.0.1:9", "anon").unwrap())
                .unwrap();
        let storage = MemoryTokenStorage::new();
        storage
            .set(AUTH_TOKEN_KEY, "not json".to_string())
            .await
            .unwrap();

        let accessor = SessionAccessor::new(backend, storage.clone());
        assert!(accessor.current_session().await.unwrap().is_none());
        assert_eq!(storage.get(AUTH_TOKEN_KEY).await.unwrap(), None);
    }
}
