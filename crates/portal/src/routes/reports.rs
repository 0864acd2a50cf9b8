//! Reports route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use rust_decimal::prelude::ToPrimitive;
use tracing::instrument;

use super::{LoadError, UserView};
use crate::filters;
use crate::middleware::RequireSession;
use crate::reports::{MetricsReport, SeriesPoint};
use crate::resources::MetricsStore;
use crate::state::AppState;

/// Reports page template.
#[derive(Template, WebTemplate)]
#[template(path = "reports/index.html")]
pub struct ReportsTemplate {
    pub user: UserView,
    pub current_path: String,
    pub report: MetricsReport,
    pub load_error: Option<LoadError>,
    /// Revenue, customers and orders per month, oldest first.
    pub chart_json: String,
}

/// Chart data for the report, oldest month first.
#[allow(clippy::cast_precision_loss)]
fn chart_series(report: &MetricsReport) -> Vec<SeriesPoint> {
    report
        .rows
        .iter()
        .rev()
        .map(|row| SeriesPoint {
            label: row.month.clone(),
            values: vec![
                row.revenue.to_f64().unwrap_or(0.0),
                row.customers as f64,
                row.orders as f64,
            ],
        })
        .collect()
}

/// Monthly metrics for the signed-in user's franchise(s).
#[instrument(skip_all, fields(identity = %user.identity.id))]
pub async fn reports(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let store = MetricsStore::new(user.client().clone(), state.fetch_policy());
    if let Err(e) = store.refresh().await {
        tracing::debug!(error = %e, "metrics unavailable");
    }
    let snapshot = store.snapshot().await;
    let report = MetricsReport::build(&snapshot.items);

    ReportsTemplate {
        user: UserView::from(&user),
        current_path: "/reports".to_string(),
        chart_json: serde_json::to_string(&chart_series(&report)).unwrap_or_default(),
        load_error: LoadError::from_snapshot(&snapshot, "/reports"),
        report,
    }
}
