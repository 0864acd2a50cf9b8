//! Authentication extractors.
//!
//! [`RequireSession`] resolves the signed-in user (identity plus profile)
//! for a handler; [`RequireAdmin`] additionally requires the admin role.
//! Both verify the stored tokens with the identity provider, so a revoked
//! session is cleared and sent back to the login page.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::guard::LOGIN_PATH;
use crate::error::{AppError, set_sentry_user};
use crate::session::{CurrentUser, SessionAccessor, SessionTokenStorage};
use crate::state::AppState;

/// Session accessor over the current request's HTTP session.
#[must_use]
pub fn session_accessor(
    state: &AppState,
    session: Session,
) -> SessionAccessor<SessionTokenStorage> {
    SessionAccessor::new(state.backend().clone(), SessionTokenStorage::new(session))
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireSession(user): RequireSession) -> impl IntoResponse {
///     format!("Hello, {}!", user.display_name())
/// }
/// ```
pub struct RequireSession(pub CurrentUser);

/// Extractor that requires a signed-in admin.
///
/// Hides admin-only pages and forms. The backend's row-level policies still
/// decide whether a write is allowed.
pub struct RequireAdmin(pub CurrentUser);

/// Error returned when a request does not carry the required session.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (no session layer, or a non-HTML request).
    Unauthorized,
    /// Signed in, but not an admin.
    Forbidden,
    /// The session could not be resolved.
    Failed(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "This page is only available to administrators.",
            )
                .into_response(),
            Self::Failed(e) => e.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::Unauthorized)?;

        let state = AppState::from_ref(state);
        let user = session_accessor(&state, session)
            .current_user()
            .await
            .map_err(|e| AuthRejection::Failed(e.into()))?
            .ok_or(AuthRejection::RedirectToLogin)?;

        set_sentry_user(user.identity.id.as_str(), user.identity.email.as_deref());
        Ok(Self(user))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireSession(user) = RequireSession::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            tracing::warn!(
                identity = %user.identity.id,
                path = %parts.uri.path(),
                "non-admin denied admin page"
            );
            return Err(AuthRejection::Forbidden);
        }

        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_responses() {
        let response = AuthRejection::RedirectToLogin.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get("location").map(|v| v.as_bytes()), Some(&b"/login"[..]));

        assert_eq!(
            AuthRejection::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
