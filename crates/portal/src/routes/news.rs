//! News route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use franchise_portal_core::NewsId;
use serde::Deserialize;
use tracing::instrument;

use super::{LoadError, UserView};
use crate::backend::BackendError;
use crate::filters;
use crate::middleware::{RequireAdmin, RequireSession};
use crate::resources::{NewsDraft, NewsError, NewsItem, NewsStore};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Publish / edit form data.
#[derive(Debug, Deserialize)]
pub struct NewsForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Feed query: which item is being edited, and the last action's outcome.
#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub edit: Option<i64>,
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// One item of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsView {
    pub id: NewsId,
    pub title: String,
    pub content: String,
    pub published: String,
    pub edited: bool,
}

impl From<&NewsItem> for NewsView {
    fn from(item: &NewsItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            content: item.content.clone(),
            published: item
                .created_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            edited: matches!((item.created_at, item.updated_at), (Some(c), Some(u)) if u > c),
        }
    }
}

/// News page template.
#[derive(Template, WebTemplate)]
#[template(path = "news/index.html")]
pub struct NewsTemplate {
    pub user: UserView,
    pub current_path: String,
    pub items: Vec<NewsView>,
    pub load_error: Option<LoadError>,
    /// Item whose edit form is open.
    pub editing: Option<NewsView>,
    pub error: Option<String>,
    pub success: Option<String>,
}

fn error_message(code: &str) -> &'static str {
    match code {
        "title" => "Title is required.",
        "content" => "Content is required.",
        "permission" => "You do not have permission to change news.",
        "missing" => "That news item no longer exists.",
        _ => "The change could not be saved. Please try again.",
    }
}

fn success_message(code: &str) -> Option<&'static str> {
    match code {
        "created" => Some("News published."),
        "updated" => Some("News updated."),
        "deleted" => Some("News deleted."),
        _ => None,
    }
}

const fn draft_error_code(error: &NewsError) -> &'static str {
    match error {
        NewsError::MissingTitle => "title",
        NewsError::MissingContent => "content",
    }
}

fn backend_error_code(error: &BackendError) -> &'static str {
    if error.is_permission_denied() {
        tracing::warn!(error = %error, "news change denied");
        "permission"
    } else if matches!(error, BackendError::NotFound(_)) {
        "missing"
    } else {
        tracing::error!(error = %error, "news change failed");
        "failed"
    }
}

fn back_to_feed(result: Result<&'static str, &'static str>) -> Redirect {
    match result {
        Ok(code) => Redirect::to(&format!("/news?success={code}")),
        Err(code) => Redirect::to(&format!("/news?error={code}")),
    }
}

// =============================================================================
// Routes
// =============================================================================

/// News feed, newest first.
#[instrument(skip_all, fields(identity = %user.identity.id))]
pub async fn index(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
    Query(query): Query<NewsQuery>,
) -> impl IntoResponse {
    let store = NewsStore::new(user.client().clone(), state.fetch_policy());
    if let Err(e) = store.refresh().await {
        tracing::debug!(error = %e, "news unavailable");
    }
    let snapshot = store.snapshot().await;
    let items: Vec<NewsView> = snapshot.items.iter().map(NewsView::from).collect();

    let editing = query
        .edit
        .filter(|_| user.is_admin())
        .and_then(|id| items.iter().find(|item| item.id.as_i64() == id).cloned());

    NewsTemplate {
        user: UserView::from(&user),
        current_path: "/news".to_string(),
        load_error: LoadError::from_snapshot(&snapshot, "/news"),
        items,
        editing,
        error: query.error.as_deref().map(|c| error_message(c).to_string()),
        success: query
            .success
            .as_deref()
            .and_then(success_message)
            .map(String::from),
    }
}

/// Publish a news item.
#[instrument(skip_all, fields(identity = %user.identity.id))]
pub async fn create(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<NewsForm>,
) -> Redirect {
    let draft = match NewsDraft::new(&form.title, &form.content) {
        Ok(draft) => draft,
        Err(e) => return back_to_feed(Err(draft_error_code(&e))),
    };

    let store = NewsStore::new(user.client().clone(), state.fetch_policy());
    back_to_feed(
        store
            .create(&draft)
            .await
            .map(|_| "created")
            .map_err(|e| backend_error_code(&e)),
    )
}

/// Edit a news item.
#[instrument(skip_all, fields(identity = %user.identity.id, news_id = id))]
pub async fn update(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<NewsForm>,
) -> Redirect {
    let draft = match NewsDraft::new(&form.title, &form.content) {
        Ok(draft) => draft,
        Err(e) => {
            let code = draft_error_code(&e);
            return Redirect::to(&format!("/news?edit={id}&error={code}"));
        }
    };

    let store = NewsStore::new(user.client().clone(), state.fetch_policy());
    back_to_feed(
        store
            .update(NewsId::new(id), &draft)
            .await
            .map(|_| "updated")
            .map_err(|e| backend_error_code(&e)),
    )
}

/// Delete a news item.
#[instrument(skip_all, fields(identity = %user.identity.id, news_id = id))]
pub async fn delete(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Redirect {
    let store = NewsStore::new(user.client().clone(), state.fetch_policy());
    back_to_feed(
        store
            .delete(NewsId::new(id))
            .await
            .map(|()| "deleted")
            .map_err(|e| backend_error_code(&e)),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn user(is_admin: bool) -> UserView {
        UserView {
            name: "Ana".to_string(),
            email: "ana@franchise.example".to_string(),
            role: String::new(),
            is_admin,
        }
    }

    fn template(items: Vec<NewsView>, is_admin: bool) -> NewsTemplate {
        NewsTemplate {
            user: user(is_admin),
            current_path: "/news".to_string(),
            items,
            load_error: None,
            editing: None,
            error: None,
            success: None,
        }
    }

    #[test]
    fn test_empty_feed_shows_placeholder() {
        let html = template(Vec::new(), false).render().unwrap();
        assert!(html.contains("No news published"));
    }

    #[test]
    fn test_admin_sees_editor_controls() {
        let item = NewsItem {
            id: NewsId::new(3),
            title: "New opening hours".to_string(),
            content: "From Monday we open at 8.".to_string(),
            created_by: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap()),
        };
        let view = NewsView::from(&item);
        assert!(view.edited);

        let html = template(vec![view.clone()], true).render().unwrap();
        assert!(html.contains("New opening hours"));
        assert!(html.contains("/news/3/delete"));
        assert!(html.contains("/news?edit=3"));

        let html = template(vec![view], false).render().unwrap();
        assert!(!html.contains("/news/3/delete"));
    }

    #[test]
    fn test_messages() {
        assert_eq!(error_message("title"), "Title is required.");
        assert_eq!(success_message("deleted"), Some("News deleted."));
        assert_eq!(draft_error_code(&NewsError::MissingContent), "content");
        assert_eq!(
            backend_error_code(&BackendError::Api {
                status: 403,
                message: "rls".to_string()
            }),
            "permission"
        );
    }
}
