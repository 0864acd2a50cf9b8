//! Signing in from the command line.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` / `SUPABASE_ANON_KEY` - Backend project
//! - `PORTAL_EMAIL` / `PORTAL_PASSWORD` - Account to act as

use franchise_portal::backend::{BackendClient, BackendError};
use franchise_portal::config::{BackendConfig, ConfigError};
use franchise_portal::session::{CurrentUser, MemoryTokenStorage, SessionAccessor, SessionError};
use franchise_portal_core::Email;
use secrecy::SecretString;
use thiserror::Error;

/// Errors that can occur while signing in.
#[derive(Debug, Error)]
pub enum SignInError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Signed in, but the session could not be resolved afterwards.
    #[error("Signed in but no session is available")]
    NoSession,
}

/// Sign in with the `PORTAL_EMAIL` / `PORTAL_PASSWORD` account.
pub async fn sign_in() -> Result<CurrentUser, SignInError> {
    let config = BackendConfig::from_env()?;

    let email =
        std::env::var("PORTAL_EMAIL").map_err(|_| SignInError::MissingEnvVar("PORTAL_EMAIL"))?;
    let email = Email::parse(&email).map_err(|_| SignInError::InvalidEmail(email.clone()))?;
    let password = std::env::var("PORTAL_PASSWORD")
        .map(SecretString::from)
        .map_err(|_| SignInError::MissingEnvVar("PORTAL_PASSWORD"))?;

    let backend = BackendClient::new(&config)?;
    let accessor = SessionAccessor::new(backend, MemoryTokenStorage::new());

    tracing::info!("Signing in as {}", email);
    accessor.sign_in(&email, &password).await?;

    let user = accessor.current_user().await?.ok_or(SignInError::NoSession)?;
    tracing::info!("Signed in ({})", user.role());
    Ok(user)
}
