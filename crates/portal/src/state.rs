//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{BackendClient, BackendError};
use crate::config::PortalConfig;
use crate::fetch::RetryPolicy;

/// Application state shared across all handlers.
///
/// Cheap to clone; the configuration and backend client live behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PortalConfig,
    backend: BackendClient,
}

impl AppState {
    /// Build the state, constructing the backend client once.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: PortalConfig) -> Result<Self, BackendError> {
        let backend = BackendClient::new(&config.backend)?;
        Ok(Self {
            inner: Arc::new(AppStateInner { config, backend }),
        })
    }

    /// Get a reference to the portal configuration.
    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Get a reference to the shared backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Retry policy for collection fetches.
    #[must_use]
    pub fn fetch_policy(&self) -> RetryPolicy {
        self.inner.config.fetch.clone()
    }
}
