//! Authentication route handlers.
//!
//! Password sign-in and sign-out against the identity provider. Tokens are
//! kept in the visitor's HTTP session under the fixed auth key.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use franchise_portal_core::Email;
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::clear_sentry_user;
use crate::filters;
use crate::middleware::session_accessor;
use crate::session::SessionError;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Message for a `?error=` code.
fn error_message(code: &str) -> &'static str {
    match code {
        "credentials" => "Invalid email or password.",
        "email" => "Please enter a valid email address.",
        "session" => "Could not start your session. Please try again.",
        _ => "The sign-in service is unavailable. Please try again later.",
    }
}

/// Message for a `?success=` code.
fn success_message(code: &str) -> Option<&'static str> {
    match code {
        "signed_out" => Some("You have been signed out."),
        _ => None,
    }
}

// =============================================================================
// Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        error: query.error.as_deref().map(|c| error_message(c).to_string()),
        success: query
            .success
            .as_deref()
            .and_then(success_message)
            .map(String::from),
    }
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let Ok(email) = Email::parse(&form.email) else {
        return Redirect::to("/login?error=email").into_response();
    };
    let password = SecretString::from(form.password);

    // A fresh session ID on every sign-in
    if let Err(e) = session.cycle_id().await {
        tracing::error!(error = %e, "failed to cycle session id");
        return Redirect::to("/login?error=session").into_response();
    }

    match session_accessor(&state, session)
        .sign_in(&email, &password)
        .await
    {
        Ok(identity) => {
            tracing::info!(identity = %identity.id, "portal sign-in");
            Redirect::to("/dashboard").into_response()
        }
        Err(SessionError::Backend(e)) if e.is_permission_denied() => {
            tracing::warn!(email = %email, "login rejected");
            Redirect::to("/login?error=credentials").into_response()
        }
        Err(SessionError::Storage(e)) => {
            tracing::error!(error = %e, "failed to store session");
            Redirect::to("/login?error=session").into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "login failed");
            Redirect::to("/login?error=unavailable").into_response()
        }
    }
}

/// Sign out and drop everything kept in the session.
pub async fn logout(State(state): State<AppState>, session: Session) -> Response {
    if let Err(e) = session_accessor(&state, session.clone()).sign_out().await {
        tracing::warn!(error = %e, "sign-out did not complete");
    }
    if let Err(e) = session.flush().await {
        tracing::error!(error = %e, "failed to flush session");
    }
    clear_sentry_user();
    Redirect::to("/login?success=signed_out").into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(error_message("credentials"), "Invalid email or password.");
        assert!(error_message("anything-else").contains("unavailable"));
        assert_eq!(success_message("signed_out"), Some("You have been signed out."));
        assert_eq!(success_message("other"), None);
    }

    #[test]
    fn test_login_template_renders_messages() {
        let html = LoginTemplate {
            error: Some(error_message("credentials").to_string()),
            success: None,
        }
        .render()
        .unwrap();
        assert!(html.contains("Invalid email or password."));
        assert!(html.contains(r#"action="/login""#));
    }
}
