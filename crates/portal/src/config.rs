//! Portal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Base URL of the hosted backend (auth, REST and storage APIs)
//! - `SUPABASE_ANON_KEY` - Public API key sent with every backend request
//! - `PORTAL_BASE_URL` - Public URL for the portal
//!
//! ## Optional
//! - `PORTAL_HOST` - Bind address (default: 127.0.0.1)
//! - `PORTAL_PORT` - Listen port (default: 3000)
//! - `PORTAL_FETCH_TIMEOUT_SECS` - Per-attempt collection fetch timeout (default: 10, 1-60)
//! - `PORTAL_FETCH_MAX_RETRIES` - Retries after the first failed attempt (default: 3)
//! - `PORTAL_RETRY_TIMEOUTS` - Also retry attempts that timed out (default: false)
//! - `PORTAL_DOCUMENTS_BUCKET` - Blob storage bucket for documents (default: documents)
//! - `PORTAL_LOG_JSON` - Emit JSON logs instead of text
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Sentry traces sample rate (default: 0.1)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::fetch::RetryPolicy;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const MAX_FETCH_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FETCH_MAX_RETRIES: u32 = 3;
const MAX_FETCH_RETRIES: u32 = 10;
const DEFAULT_DOCUMENTS_BUCKET: &str = "documents";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Portal application configuration.
#[derive(Clone)]
pub struct PortalConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the portal
    pub base_url: String,
    /// Hosted backend configuration
    pub backend: BackendConfig,
    /// Collection fetch retry policy
    pub fetch: RetryPolicy,
    /// Emit JSON-formatted logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("backend", &self.backend)
            .field("fetch", &self.fetch)
            .field("log_json", &self.log_json)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish_non_exhaustive()
    }
}

/// Hosted backend configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Backend base URL (e.g., `https://xyz.supabase.co`)
    pub url: Url,
    /// Public (anon) API key
    pub anon_key: SecretString,
    /// Blob storage bucket holding uploaded documents
    pub documents_bucket: String,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("documents_bucket", &self.documents_bucket)
            .finish()
    }
}

impl BackendConfig {
    /// Build a backend configuration from explicit values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `url` does not parse.
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: parse_base_url("SUPABASE_URL", url)?,
            anon_key: SecretString::from(anon_key.into()),
            documents_bucket: DEFAULT_DOCUMENTS_BUCKET.to_string(),
        })
    }

    /// Load the backend configuration on its own.
    ///
    /// Used by the CLI, which needs the backend but none of the server settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let url = get_required_env("SUPABASE_URL")?;
        let mut config = Self::new(&url, get_required_env("SUPABASE_ANON_KEY")?)?;
        config.documents_bucket =
            get_env_or_default("PORTAL_DOCUMENTS_BUCKET", DEFAULT_DOCUMENTS_BUCKET);
        Ok(config)
    }
}

impl PortalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = BackendConfig::from_env()?;

        let host = get_env_or_default("PORTAL_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORTAL_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORTAL_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORTAL_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("PORTAL_BASE_URL")?;

        let fetch = fetch_policy_from_env()?;
        let log_json = get_optional_env("PORTAL_LOG_JSON").is_some_and(|v| parse_flag(&v));

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            fetch,
            log_json,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

fn fetch_policy_from_env() -> Result<RetryPolicy, ConfigError> {
    let timeout_secs = parse_bounded(
        "PORTAL_FETCH_TIMEOUT_SECS",
        &get_env_or_default(
            "PORTAL_FETCH_TIMEOUT_SECS",
            &DEFAULT_FETCH_TIMEOUT_SECS.to_string(),
        ),
        1,
        MAX_FETCH_TIMEOUT_SECS,
    )?;
    let max_retries = parse_bounded(
        "PORTAL_FETCH_MAX_RETRIES",
        &get_env_or_default(
            "PORTAL_FETCH_MAX_RETRIES",
            &DEFAULT_FETCH_MAX_RETRIES.to_string(),
        ),
        0,
        u64::from(MAX_FETCH_RETRIES),
    )?;
    let retry_timeouts = get_optional_env("PORTAL_RETRY_TIMEOUTS").is_some_and(|v| parse_flag(&v));

    Ok(RetryPolicy::default()
        .with_timeout(Duration::from_secs(timeout_secs))
        .with_max_retries(u32::try_from(max_retries).unwrap_or(DEFAULT_FETCH_MAX_RETRIES))
        .retry_timeouts(retry_timeouts))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_bounded(key: &str, value: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !(min..=max).contains(&parsed) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between {min} and {max} (got {parsed})"),
        ));
    }
    Ok(parsed)
}

fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    // Joining relative API paths needs a trailing slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_config() -> PortalConfig {
        PortalConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            backend: BackendConfig::new("https://demo.supabase.co", "anon-key-value").unwrap(),
            fetch: RetryPolicy::default(),
            log_json: false,
            sentry_dsn: Some("https://key@sentry.example/1".to_string()),
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = sample_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_is_secure_follows_base_url() {
        let mut config = sample_config();
        assert!(!config.is_secure());
        config.base_url = "https://portal.example".to_string();
        assert!(config.is_secure());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_output = format!("{:?}", sample_config());

        assert!(debug_output.contains("demo.supabase.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("anon-key-value"));
        assert!(!debug_output.contains("sentry.example"));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = BackendConfig::new("https://demo.supabase.co/base", "k").unwrap();
        assert_eq!(config.url.as_str(), "https://demo.supabase.co/base/");
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(matches!(
            BackendConfig::new("not a url", "k"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_parse_bounded() {
        assert_eq!(parse_bounded("X", "15", 1, 60).unwrap(), 15);
        assert!(parse_bounded("X", "0", 1, 60).is_err());
        assert!(parse_bounded("X", "61", 1, 60).is_err());
        assert!(parse_bounded("X", "ten", 1, 60).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
