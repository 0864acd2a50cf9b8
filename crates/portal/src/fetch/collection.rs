//! Collection state with superseding refreshes.

use std::future::Future;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{FetchError, RetryPolicy, fetch_with_retry};
use crate::backend::BackendError;

/// Where a collection is in its load lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// First load in flight; there is no data to show.
    Loading,
    /// A reload is in flight; the previous rows are still shown.
    Refreshing,
    /// The last load succeeded.
    Ready,
    /// The last load failed; rows are empty and an error is set.
    Failed,
}

impl LoadState {
    /// True while a fetch is in flight.
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading | Self::Refreshing)
    }
}

/// Point-in-time copy of a collection for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot<T> {
    pub items: Vec<T>,
    /// User-facing error from the last failed load.
    pub error: Option<String>,
    pub state: LoadState,
}

impl<T> CollectionSnapshot<T> {
    /// True while a fetch is in flight.
    #[must_use]
    pub const fn loading(&self) -> bool {
        self.state.is_loading()
    }
}

struct Inner<T> {
    items: Vec<T>,
    error: Option<String>,
    state: LoadState,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

/// Rows of one table plus their load state.
///
/// Calling [`refresh`](Self::refresh) while a previous refresh is still in
/// flight cancels the previous one. Every state write checks that it belongs
/// to the latest refresh, so a slow, stale response can never overwrite the
/// result of a newer one.
pub struct Collection<T> {
    policy: RetryPolicy,
    inner: Mutex<Inner<T>>,
}

impl<T> Collection<T> {
    /// Create an empty collection that loads under `policy`.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                items: Vec::new(),
                error: None,
                state: LoadState::Idle,
                generation: 0,
                in_flight: None,
            }),
        }
    }

    /// Replace the rows with the result of `op`, retried under the policy.
    ///
    /// On failure the rows are cleared and a user-facing error is stored.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or `FetchError::Cancelled` when this refresh
    /// was superseded (in which case no state was touched).
    pub async fn refresh<F, Fut>(&self, op: F) -> Result<(), FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<T>, BackendError>>,
    {
        let (generation, token) = {
            let mut inner = self.inner.lock().await;
            if let Some(previous) = inner.in_flight.take() {
                previous.cancel();
            }
            inner.generation += 1;
            inner.state = match inner.state {
                LoadState::Ready | LoadState::Refreshing => LoadState::Refreshing,
                _ if !inner.items.is_empty() => LoadState::Refreshing,
                _ => LoadState::Loading,
            };
            let token = CancellationToken::new();
            inner.in_flight = Some(token.clone());
            (inner.generation, token)
        };

        let result = fetch_with_retry(&self.policy, &token, op).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::debug!(generation, "discarding superseded fetch result");
            return Err(FetchError::Cancelled);
        }
        inner.in_flight = None;

        match result {
            Ok(items) => {
                inner.items = items;
                inner.error = None;
                inner.state = LoadState::Ready;
                Ok(())
            }
            Err(FetchError::Cancelled) => {
                inner.state = if inner.error.is_some() {
                    LoadState::Failed
                } else if inner.items.is_empty() {
                    LoadState::Idle
                } else {
                    LoadState::Ready
                };
                Err(FetchError::Cancelled)
            }
            Err(e) => {
                inner.items.clear();
                inner.error = Some(e.user_message().to_string());
                inner.state = LoadState::Failed;
                Err(e)
            }
        }
    }

    /// Cancel the in-flight refresh, if any.
    pub async fn cancel(&self) {
        if let Some(token) = self.inner.lock().await.in_flight.take() {
            token.cancel();
        }
    }

    /// Add a newly created row at the front.
    pub async fn prepend(&self, item: T) {
        self.inner.lock().await.items.insert(0, item);
    }

    /// Replace every row matching `is_target` with `item`.
    pub async fn replace_where<P>(&self, is_target: P, item: T)
    where
        P: Fn(&T) -> bool,
        T: Clone,
    {
        for row in &mut self.inner.lock().await.items {
            if is_target(row) {
                *row = item.clone();
            }
        }
    }

    /// Drop every row matching `is_target`.
    pub async fn remove_where<P>(&self, is_target: P)
    where
        P: Fn(&T) -> bool,
    {
        self.inner.lock().await.items.retain(|row| !is_target(row));
    }

    /// Number of rows currently held.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Whether no rows are currently held.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }

    /// Copy the current state out for rendering.
    pub async fn snapshot(&self) -> CollectionSnapshot<T>
    where
        T: Clone,
    {
        let inner = self.inner.lock().await;
        CollectionSnapshot {
            items: inner.items.clone(),
            error: inner.error.clone(),
            state: inner.state,
        }
    }
}

impl<T> Drop for Collection<T> {
    fn drop(&mut self) {
        if let Some(token) = self.inner.get_mut().in_flight.take() {
            token.cancel();
        }
    }
}
