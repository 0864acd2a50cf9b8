//! News announcements: list, publish, edit, delete.

use chrono::{DateTime, Utc};
use franchise_portal_core::NewsId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::backend::{AuthedClient, BackendError, Order, SelectQuery};
use crate::fetch::{Collection, CollectionSnapshot, FetchError, RetryPolicy};

/// Table holding news items.
pub const NEWS_TABLE: &str = "news";

/// A published announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: NewsId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Invalid news form input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NewsError {
    #[error("Title is required")]
    MissingTitle,
    #[error("Content is required")]
    MissingContent,
}

/// Title and body of a news item being created or edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsDraft {
    title: String,
    content: String,
}

impl NewsDraft {
    /// Validate form input. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `NewsError` if the title or content is blank.
    pub fn new(title: &str, content: &str) -> Result<Self, NewsError> {
        let title = title.trim();
        let content = content.trim();
        if title.is_empty() {
            return Err(NewsError::MissingTitle);
        }
        if content.is_empty() {
            return Err(NewsError::MissingContent);
        }
        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
        })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Serialize)]
struct NewsChanges<'a> {
    title: &'a str,
    content: &'a str,
    updated_at: DateTime<Utc>,
}

/// News feed for the signed-in user.
pub struct NewsStore {
    client: AuthedClient,
    items: Collection<NewsItem>,
}

impl NewsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(client: AuthedClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            items: Collection::new(policy),
        }
    }

    /// Reload the feed, newest first.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the snapshot then carries the user message.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let query = SelectQuery::table(NEWS_TABLE).order_by("created_at", Order::Desc);
        let client = &self.client;
        self.items.refresh(|| client.select::<NewsItem>(&query)).await
    }

    /// Current rows and load state.
    pub async fn snapshot(&self) -> CollectionSnapshot<NewsItem> {
        self.items.snapshot().await
    }

    /// Publish a new item and put it at the top of the feed.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the insert is rejected; the feed is untouched.
    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: &NewsDraft) -> Result<NewsItem, BackendError> {
        let created: NewsItem = self.client.insert(NEWS_TABLE, draft).await?;
        tracing::info!(news_id = %created.id, "news item published");
        self.items.prepend(created.clone()).await;
        Ok(created)
    }

    /// Replace the title and content of item `id`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the update is rejected; the feed is untouched.
    #[instrument(skip(self, draft))]
    pub async fn update(&self, id: NewsId, draft: &NewsDraft) -> Result<NewsItem, BackendError> {
        let changes = NewsChanges {
            title: draft.title(),
            content: draft.content(),
            updated_at: Utc::now(),
        };
        let updated: NewsItem = self
            .client
            .update_by_id(NEWS_TABLE, id.as_i64(), &changes)
            .await?;
        self.items
            .replace_where(|item| item.id == id, updated.clone())
            .await;
        Ok(updated)
    }

    /// Delete item `id`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the delete is rejected; the feed is untouched.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: NewsId) -> Result<(), BackendError> {
        self.client.delete_by_id(NEWS_TABLE, id.as_i64()).await?;
        tracing::info!(news_id = %id, "news item deleted");
        self.items.remove_where(|item| item.id == id).await;
        Ok(())
    }
}
