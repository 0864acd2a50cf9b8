//! Dashboard route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::UserView;
use crate::backend::SelectQuery;
use crate::fetch::{CollectionSnapshot, fetch_with_retry};
use crate::filters;
use crate::middleware::RequireSession;
use crate::resources::{DocumentStore, MetricsStore, NewsStore};
use crate::session::{CurrentUser, PROFILES_TABLE};
use crate::state::AppState;
use crate::tabular::Row;

/// Shown for a franchise id that is not set.
const NOT_ASSIGNED: &str = "Not assigned";

/// Shown in a card whose count could not be loaded.
const UNAVAILABLE: &str = "-";

/// One stats card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatCard {
    pub title: &'static str,
    pub value: String,
    pub description: &'static str,
    pub href: &'static str,
}

/// One line of the recent activity list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityView {
    pub label: &'static str,
    pub detail: String,
    pub date: String,
}

/// Franchise info card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FranchiseView {
    pub franchise_id: String,
    pub role: String,
    pub email: String,
}

impl From<&CurrentUser> for FranchiseView {
    fn from(user: &CurrentUser) -> Self {
        Self {
            franchise_id: user
                .franchise_id()
                .map_or_else(|| NOT_ASSIGNED.to_string(), ToString::to_string),
            role: user.role().label().to_string(),
            email: user.email(),
        }
    }
}

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub user: UserView,
    pub current_path: String,
    pub franchise: FranchiseView,
    pub stats: Vec<StatCard>,
    pub activity: Vec<ActivityView>,
}

fn count<T>(snapshot: &CollectionSnapshot<T>) -> String {
    if snapshot.error.is_some() {
        UNAVAILABLE.to_string()
    } else {
        snapshot.items.len().to_string()
    }
}

/// Dashboard page handler.
#[instrument(skip_all, fields(identity = %user.identity.id))]
pub async fn dashboard(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let client = user.client().clone();
    let policy = state.fetch_policy();

    let documents = DocumentStore::new(client.clone(), policy.clone());
    let news = NewsStore::new(client.clone(), policy.clone());
    let metrics = MetricsStore::new(client.clone(), policy.clone());

    let franchisees = async {
        if !user.is_admin() {
            return None;
        }
        let query = SelectQuery::table(PROFILES_TABLE)
            .columns("id")
            .eq("role", "franchisee");
        let result = fetch_with_retry(&policy, &CancellationToken::new(), || {
            client.select::<Row>(&query)
        })
        .await;
        Some(result.map_or_else(
            |e| {
                tracing::warn!(error = %e, "failed to count franchisees");
                UNAVAILABLE.to_string()
            },
            |rows| rows.len().to_string(),
        ))
    };

    // Failures are kept in each store's snapshot
    let (_, _, _, franchisees) = tokio::join!(
        documents.refresh(),
        news.refresh(),
        metrics.refresh(),
        franchisees
    );

    let documents = documents.snapshot().await;
    let news = news.snapshot().await;
    let metrics = metrics.snapshot().await;

    let mut stats = vec![
        StatCard {
            title: "Documents",
            value: count(&documents),
            description: "Files available",
            href: "/documents",
        },
        StatCard {
            title: "News",
            value: count(&news),
            description: "Published announcements",
            href: "/news",
        },
        StatCard {
            title: "Reports",
            value: count(&metrics),
            description: "Months of metrics",
            href: "/reports",
        },
    ];
    if let Some(value) = franchisees {
        stats.push(StatCard {
            title: "Franchisees",
            value,
            description: "Franchisee accounts",
            href: "/dashboard",
        });
    }

    let mut activity = Vec::new();
    if let Some(doc) = documents.items.first() {
        activity.push(ActivityView {
            label: "New document uploaded",
            detail: doc.name.clone(),
            date: doc
                .created_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        });
    }
    if let Some(item) = news.items.first() {
        activity.push(ActivityView {
            label: "News published",
            detail: item.title.clone(),
            date: item
                .created_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        });
    }

    DashboardTemplate {
        user: UserView::from(&user),
        current_path: "/dashboard".to_string(),
        franchise: FranchiseView::from(&user),
        stats,
        activity,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user_view(is_admin: bool) -> UserView {
        UserView {
            name: "Ana Torres".to_string(),
            email: "ana@franchise.example".to_string(),
            role: if is_admin { "Administrator" } else { "Franchisee" }.to_string(),
            is_admin,
        }
    }

    #[test]
    fn test_count_marks_failed_loads() {
        let failed: CollectionSnapshot<u8> = CollectionSnapshot {
            items: Vec::new(),
            error: Some("boom".to_string()),
            state: crate::fetch::LoadState::Failed,
        };
        assert_eq!(count(&failed), UNAVAILABLE);

        let ready = CollectionSnapshot {
            items: vec![1_u8, 2],
            error: None,
            state: crate::fetch::LoadState::Ready,
        };
        assert_eq!(count(&ready), "2");
    }

    #[test]
    fn test_dashboard_renders_greeting_and_cards() {
        let html = DashboardTemplate {
            user: user_view(false),
            current_path: "/dashboard".to_string(),
            franchise: FranchiseView {
                franchise_id: NOT_ASSIGNED.to_string(),
                role: "Franchisee".to_string(),
                email: "ana@franchise.example".to_string(),
            },
            stats: vec![StatCard {
                title: "Documents",
                value: "3".to_string(),
                description: "Files available",
                href: "/documents",
            }],
            activity: Vec::new(),
        }
        .render()
        .unwrap();

        assert!(html.contains("Welcome to the portal, <strong>Ana Torres</strong>"));
        assert!(html.contains("Not assigned"));
        assert!(html.contains("Documents"));
        assert!(!html.contains("Franchisees"));
    }
}
