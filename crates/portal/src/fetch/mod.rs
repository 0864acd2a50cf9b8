//! Resilient collection fetching.
//!
//! Every resource store loads its rows through [`fetch_with_retry`]: each
//! attempt is raced against a fixed timeout, failed attempts are retried with
//! exponential backoff, and the whole operation can be cancelled by a newer
//! request. [`Collection`] holds the resulting rows together with the loading
//! and error state shown to the user.

mod collection;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendError;

pub use collection::{Collection, CollectionSnapshot, LoadState};

/// Errors produced by a resilient fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An attempt did not finish within the policy timeout.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The backend call itself failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A newer request superseded this one, or its owner went away.
    #[error("request was cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short message suitable for showing to the user.
    ///
    /// Never includes backend error text, which may contain SQL or policy
    /// details.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "The server took too long to respond. Please try again.",
            Self::Backend(e) if e.is_permission_denied() => {
                "You do not have permission to view this information."
            }
            Self::Backend(_) => "Could not load data. Check your connection and try again.",
            Self::Cancelled => "The request was cancelled.",
        }
    }
}

/// Retry and timeout settings for collection fetches.
///
/// Defaults: 10 second timeout per attempt, 3 retries after the first
/// attempt, backoff of 1s, 2s, 4s, timeouts surfaced without retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time allowed for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
    /// Whether timed-out attempts are retried like any other failure.
    pub retry_timeouts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            retry_timeouts: false,
        }
    }
}

impl RetryPolicy {
    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay after the first failed attempt.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Choose whether timed-out attempts are retried.
    #[must_use]
    pub const fn retry_timeouts(mut self, retry: bool) -> Self {
        self.retry_timeouts = retry;
        self
    }

    /// Total number of attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (0-based): `base_delay * 2^attempt`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error {
            FetchError::Timeout(_) => self.retry_timeouts,
            FetchError::Backend(_) => true,
            FetchError::Cancelled => false,
        }
    }
}

/// Run `op` under `policy` until it succeeds, is exhausted, or is cancelled.
///
/// `op` is called once per attempt and must produce a fresh future each time.
///
/// # Errors
///
/// Returns the last attempt's error once retries are exhausted, the timeout
/// error immediately when the policy does not retry timeouts, or
/// `FetchError::Cancelled` as soon as `cancel` fires.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(policy.timeout, op()) => outcome,
        };

        let error = match outcome {
            Ok(Ok(rows)) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "fetch succeeded after retry");
                }
                return Ok(rows);
            }
            Ok(Err(e)) => FetchError::Backend(e),
            Err(_) => FetchError::Timeout(policy.timeout),
        };

        if !policy.should_retry(&error, attempt) {
            tracing::warn!(attempts = attempt + 1, error = %error, "fetch failed");
            return Err(error);
        }

        let delay = policy.backoff_delay(attempt);
        tracing::debug!(
            attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "fetch attempt failed, backing off"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
