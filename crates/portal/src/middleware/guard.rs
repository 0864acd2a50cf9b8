//! Route guard.
//!
//! Runs before any handler. Visitors without stored tokens are sent to
//! `/login` from every protected area, and signed-in visitors are sent from
//! `/login` to `/dashboard`. The guard only checks that tokens are present;
//! the extractors in [`super::auth`] verify them with the identity provider.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::session::{AUTH_TOKEN_KEY, SessionTokenStorage, TokenStorage};

/// Path prefixes that require a signed-in user.
pub const PROTECTED_PREFIXES: &[&str] = &[
    "/dashboard",
    "/documents",
    "/news",
    "/reports",
    "/bookings",
    "/billing",
];

/// Sign-in page.
pub const LOGIN_PATH: &str = "/login";

/// Landing page after sign-in.
pub const HOME_PATH: &str = "/dashboard";

/// Where to send a request for `path`, or `None` to let it through.
#[must_use]
pub fn decide(path: &str, authenticated: bool) -> Option<&'static str> {
    if authenticated {
        return (path == LOGIN_PATH).then_some(HOME_PATH);
    }
    is_protected(path).then_some(LOGIN_PATH)
}

/// Whether `path` is, or is below, one of [`PROTECTED_PREFIXES`].
#[must_use]
pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Middleware applying [`decide`] to every request.
///
/// Must run inside the session layer.
pub async fn route_guard(session: Session, request: Request, next: Next) -> Response {
    let storage = SessionTokenStorage::new(session);
    let authenticated = match storage.get(AUTH_TOKEN_KEY).await {
        Ok(tokens) => tokens.is_some(),
        Err(e) => {
            tracing::warn!(error = %e, "session store unavailable, treating as signed out");
            false
        }
    };

    match decide(request.uri().path(), authenticated) {
        Some(target) => {
            tracing::debug!(path = %request.uri().path(), target, "route guard redirect");
            Redirect::to(target).into_response()
        }
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_protected_paths_redirect_to_login() {
        for path in [
            "/dashboard",
            "/documents",
            "/documents/7/download",
            "/news",
            "/reports",
            "/bookings/export",
            "/billing",
        ] {
            assert_eq!(decide(path, false), Some(LOGIN_PATH), "{path}");
        }
    }

    #[test]
    fn test_public_paths_pass() {
        for path in ["/login", "/health", "/", "/newsletter", "/static/app.css"] {
            assert_eq!(decide(path, false), None, "{path}");
        }
    }

    #[test]
    fn test_authenticated_login_redirects_home() {
        assert_eq!(decide("/login", true), Some(HOME_PATH));
        assert_eq!(decide("/dashboard", true), None);
        assert_eq!(decide("/billing/upload", true), None);
    }
}
