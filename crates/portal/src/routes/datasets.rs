//! Imported dataset route handlers (`/bookings` and `/billing`).
//!
//! Both datasets share one set of handlers; the router for each is built by
//! [`routes`] with the dataset attached as a request extension.
//!
//! Uploading is a two-step flow: the parsed CSV is kept in the HTTP session
//! under [`PENDING_IMPORT_KEY`] while the preview is shown, and is only
//! upserted once the admin confirms.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_sessions::Session;
use tracing::instrument;
use url::form_urlencoded;

use super::{LoadError, MAX_UPLOAD_BYTES, UserView, read_upload};
use crate::datasets::{Dataset, DatasetStore};
use crate::error::AppError;
use crate::fetch::fetch_with_retry;
use crate::filters;
use crate::middleware::{RequireAdmin, RequireSession};
use crate::reports::bookings::age_group_query;
use crate::reports::{BillingChart, BookingsChart, SeriesPoint, unique_branch_count};
use crate::session::{CurrentUser, SessionError, StorageError};
use crate::state::AppState;
use crate::tabular::{
    ImportPreview, ImportSummary, ParsedCsv, Row, TablePage, export_file_name, prepare,
};

/// Session key holding an upload waiting for confirmation.
pub const PENDING_IMPORT_KEY: &str = "pending_import";

/// Separator between names in the `compare` query parameter.
const COMPARE_SEPARATOR: char = '|';

/// Build the router for one dataset.
pub fn routes(dataset: Dataset) -> Router<AppState> {
    Router::new()
        .route("/", get(show))
        .route("/export", get(export))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/upload/cancel", post(cancel_upload))
        .route("/import", post(import))
        .layer(Extension(dataset))
}

// =============================================================================
// Query Types
// =============================================================================

/// Table, chart and import-outcome parameters.
#[derive(Debug, Default, Deserialize)]
pub struct DatasetQuery {
    /// Search text.
    pub q: Option<String>,
    /// 1-based page; anything unparseable is page 1.
    pub page: Option<String>,
    /// Series to chart, separated by `|`.
    pub compare: Option<String>,
    /// Rows upserted by the last import.
    pub imported: Option<usize>,
    /// Rows rejected by the last import.
    pub failed: Option<usize>,
}

impl DatasetQuery {
    fn search(&self) -> &str {
        self.q.as_deref().map_or("", str::trim)
    }

    fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }

    fn compare(&self) -> Vec<String> {
        self.compare
            .as_deref()
            .unwrap_or_default()
            .split(COMPARE_SEPARATOR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    }

    fn summary(&self) -> Option<ImportSummary> {
        self.imported.map(|succeeded| ImportSummary {
            succeeded,
            failed: self.failed.unwrap_or(0),
        })
    }
}

/// An upload waiting for confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingImport {
    /// Slug of the dataset the file was uploaded to.
    pub dataset: String,
    pub file_name: String,
    pub csv: ParsedCsv,
}

// =============================================================================
// Templates
// =============================================================================

/// A numbered pagination link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub number: usize,
    pub url: String,
    pub current: bool,
}

/// A series that can be toggled in or out of the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartOption {
    pub name: String,
    pub selected: bool,
    /// Same page with this option toggled.
    pub url: String,
}

/// One plotted chart: x-axis points with one value per selected series.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub title: &'static str,
    pub points: Vec<SeriesPoint>,
    /// `points` as JSON, for client-side drawing.
    pub json: String,
}

impl ChartSeries {
    fn new(title: &'static str, points: Vec<SeriesPoint>) -> Self {
        let json = serde_json::to_string(&points).unwrap_or_default();
        Self {
            title,
            points,
            json,
        }
    }
}

/// One label/value pair of a summary card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Figure {
    pub label: &'static str,
    pub value: String,
}

/// Summary card for one selected series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartCard {
    pub heading: String,
    pub figures: Vec<Figure>,
}

/// Chart section of a dataset page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartView {
    pub heading: &'static str,
    pub options: Vec<ChartOption>,
    /// Selected series names, in plotting order.
    pub selected: Vec<String>,
    pub series: Vec<ChartSeries>,
    pub cards: Vec<ChartCard>,
    pub error: Option<String>,
}

impl ChartView {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Dataset page template.
#[derive(Template, WebTemplate)]
#[template(path = "datasets/index.html")]
pub struct DatasetTemplate {
    pub user: UserView,
    pub current_path: String,
    pub title: &'static str,
    pub slug: &'static str,
    pub search: String,
    pub table: TablePage,
    pub page_links: Vec<PageLink>,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
    pub export_url: String,
    /// Distinct branches, bookings only.
    pub branch_count: Option<usize>,
    pub chart: ChartView,
    pub load_error: Option<LoadError>,
    pub preview: Option<ImportPreview>,
    pub preview_file: String,
    pub upload_error: Option<String>,
    pub import_message: Option<String>,
}

// =============================================================================
// URL Helpers
// =============================================================================

fn page_url(dataset: Dataset, search: &str, page: usize, compare: &[String]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if !search.is_empty() {
        query.append_pair("q", search);
    }
    if page > 1 {
        query.append_pair("page", &page.to_string());
    }
    if !compare.is_empty() {
        query.append_pair("compare", &compare.join(&COMPARE_SEPARATOR.to_string()));
    }
    let query = query.finish();
    if query.is_empty() {
        format!("/{}", dataset.slug())
    } else {
        format!("/{}?{query}", dataset.slug())
    }
}

fn export_url(dataset: Dataset, search: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if !search.is_empty() {
        query.append_pair("q", search);
    }
    let query = query.finish();
    if query.is_empty() {
        format!("/{}/export", dataset.slug())
    } else {
        format!("/{}/export?{query}", dataset.slug())
    }
}

fn chart_options(
    available: &[String],
    selected: &[String],
    max: usize,
    url_for: impl Fn(&[String]) -> String,
) -> Vec<ChartOption> {
    available
        .iter()
        .map(|name| {
            let is_selected = selected.contains(name);
            let toggled: Vec<String> = if is_selected {
                selected.iter().filter(|s| *s != name).cloned().collect()
            } else {
                selected
                    .iter()
                    .cloned()
                    .chain(std::iter::once(name.clone()))
                    .skip(selected.len().saturating_sub(max - 1))
                    .collect()
            };
            ChartOption {
                name: name.clone(),
                selected: is_selected,
                url: url_for(&toggled),
            }
        })
        .collect()
}

// =============================================================================
// Charts
// =============================================================================

fn billing_chart(
    rows: &[Row],
    requested: &[String],
    url_for: impl Fn(&[String]) -> String,
) -> ChartView {
    let chart = BillingChart::from_rows(rows);
    if chart.is_empty() {
        return ChartView {
            heading: "Billing per storage",
            ..ChartView::default()
        };
    }

    let selected = chart.select(requested);
    let cards = selected
        .iter()
        .map(|storage| {
            let totals = chart.totals(storage);
            ChartCard {
                heading: totals.storage.clone(),
                figures: vec![
                    Figure {
                        label: "Bookings",
                        value: format!("{:.0}", totals.bookings),
                    },
                    Figure {
                        label: "Vehicles",
                        value: format!("{:.0}", totals.vehicles),
                    },
                    Figure {
                        label: "Billing",
                        value: format!("{:.2}", totals.billing),
                    },
                    Figure {
                        label: "Billing per vehicle",
                        value: format!("{:.2}", totals.billing_per_vehicle),
                    },
                    Figure {
                        label: "Months",
                        value: totals.periods.to_string(),
                    },
                ],
            }
        })
        .collect();

    ChartView {
        heading: "Billing per storage",
        options: chart_options(
            &chart.storages(),
            &selected,
            crate::reports::billing::MAX_COMPARED_STORAGES,
            url_for,
        ),
        series: vec![
            ChartSeries::new("Billing per vehicle", chart.billing_series(&selected)),
            ChartSeries::new("Bookings", chart.bookings_series(&selected)),
        ],
        selected,
        cards,
        error: None,
    }
}

async fn bookings_chart(
    user: &CurrentUser,
    state: &AppState,
    requested: &[String],
    url_for: impl Fn(&[String]) -> String,
) -> ChartView {
    let heading = "Bookings by age group";
    let query = age_group_query();
    let client = user.client();
    let rows = match fetch_with_retry(&state.fetch_policy(), &CancellationToken::new(), || {
        client.select::<Row>(&query)
    })
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "age-group view unavailable");
            return ChartView {
                heading,
                error: Some(e.user_message().to_string()),
                ..ChartView::default()
            };
        }
    };

    let chart = BookingsChart::from_rows(&rows);
    if chart.is_empty() {
        return ChartView {
            heading,
            ..ChartView::default()
        };
    }

    let selected = chart.select(requested);
    let cards = selected
        .iter()
        .map(|branch| ChartCard {
            heading: branch.clone(),
            figures: vec![Figure {
                label: "Bookings",
                value: format!("{:.0}", chart.branch_total(branch)),
            }],
        })
        .collect();

    ChartView {
        heading,
        options: chart_options(
            &chart.branches(),
            &selected,
            crate::reports::bookings::MAX_COMPARED_BRANCHES,
            url_for,
        ),
        series: vec![ChartSeries::new("Bookings", chart.series(&selected))],
        selected,
        cards,
        error: None,
    }
}

// =============================================================================
// Page Assembly
// =============================================================================

fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::Session(SessionError::Storage(StorageError::from(e)))
}

async fn pending_import(
    session: &Session,
    dataset: Dataset,
) -> Result<Option<PendingImport>, AppError> {
    let pending: Option<PendingImport> = session
        .get(PENDING_IMPORT_KEY)
        .await
        .map_err(session_error)?;
    Ok(pending.filter(|p| p.dataset == dataset.slug()))
}

async fn render_page(
    state: &AppState,
    user: &CurrentUser,
    session: &Session,
    dataset: Dataset,
    query: &DatasetQuery,
    upload_error: Option<String>,
) -> Result<DatasetTemplate, AppError> {
    let search = query.search().to_string();
    let requested = query.compare();

    let store = DatasetStore::new(user.client().clone(), dataset, state.fetch_policy());
    if let Err(e) = store.refresh().await {
        tracing::debug!(error = %e, "dataset unavailable");
    }
    let snapshot = store.snapshot().await;

    let search_for_urls = search.clone();
    let chart_url = move |compare: &[String]| page_url(dataset, &search_for_urls, 1, compare);
    let (chart, branch_count) = match dataset {
        Dataset::Bookings => (
            bookings_chart(user, state, &requested, chart_url).await,
            Some(unique_branch_count(&snapshot.items)),
        ),
        Dataset::Billing => (billing_chart(&snapshot.items, &requested, chart_url), None),
    };

    let retry_url = page_url(dataset, &search, query.page(), &requested);
    let load_error = LoadError::from_snapshot(&snapshot, &retry_url);
    let table = Dataset::table_view(snapshot.items).page(&search, query.page());

    let link = |page: usize| page_url(dataset, &search, page, &chart.selected);
    let page_links = table
        .page_numbers
        .iter()
        .map(|&number| PageLink {
            number,
            url: link(number),
            current: number == table.page,
        })
        .collect();
    let previous_url = table.has_previous().then(|| link(table.previous_page()));
    let next_url = table.has_next().then(|| link(table.next_page()));

    let pending = if user.is_admin() {
        pending_import(session, dataset).await?
    } else {
        None
    };

    Ok(DatasetTemplate {
        user: UserView::from(user),
        current_path: format!("/{}", dataset.slug()),
        title: dataset.title(),
        slug: dataset.slug(),
        export_url: export_url(dataset, &search),
        search,
        page_links,
        previous_url,
        next_url,
        table,
        branch_count,
        chart,
        load_error,
        preview: pending.as_ref().map(|p| ImportPreview::new(&p.csv)),
        preview_file: pending.map(|p| p.file_name).unwrap_or_default(),
        upload_error,
        import_message: query.summary().map(|s| s.message()),
    })
}

// =============================================================================
// Routes
// =============================================================================

/// Dataset table with search, pagination, charts and the upload form.
#[instrument(skip_all, fields(dataset = %dataset, identity = %user.identity.id))]
pub async fn show(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
    Extension(dataset): Extension<Dataset>,
    session: Session,
    Query(query): Query<DatasetQuery>,
) -> Result<DatasetTemplate, AppError> {
    render_page(&state, &user, &session, dataset, &query, None).await
}

/// Download the filtered table as CSV.
#[instrument(skip_all, fields(dataset = %dataset, identity = %user.identity.id))]
pub async fn export(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
    Extension(dataset): Extension<Dataset>,
    Query(query): Query<DatasetQuery>,
) -> Result<Response, AppError> {
    let store = DatasetStore::new(user.client().clone(), dataset, state.fetch_policy());
    store.refresh().await?;
    let csv = Dataset::table_view(store.snapshot().await.items).to_csv(query.search());

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(Utc::now().date_naive())
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(format!("invalid export header: {e}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

/// Parse an uploaded CSV and keep it for the preview.
#[instrument(skip_all, fields(dataset = %dataset, identity = %user.identity.id))]
pub async fn upload(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Extension(dataset): Extension<Dataset>,
    session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let file = read_upload(multipart).await?;
    let (file_name, bytes) = file.map_or_else(
        || (String::new(), Vec::new()),
        |f| (f.file_name, f.bytes),
    );

    match prepare(&file_name, &bytes) {
        Ok(csv) => {
            tracing::info!(file_name = %file_name, rows = csv.rows.len(), "csv ready for preview");
            let pending = PendingImport {
                dataset: dataset.slug().to_string(),
                file_name,
                csv,
            };
            session
                .insert(PENDING_IMPORT_KEY, pending)
                .await
                .map_err(session_error)?;
            Ok(Redirect::to(&format!("/{}", dataset.slug())).into_response())
        }
        Err(e) => {
            tracing::info!(file_name = %file_name, error = %e, "csv rejected");
            let page = render_page(
                &state,
                &user,
                &session,
                dataset,
                &DatasetQuery::default(),
                Some(e.to_string()),
            )
            .await?;
            Ok(page.into_response())
        }
    }
}

/// Drop the pending upload.
#[instrument(skip_all, fields(dataset = %dataset))]
pub async fn cancel_upload(
    RequireAdmin(_user): RequireAdmin,
    Extension(dataset): Extension<Dataset>,
    session: Session,
) -> Result<Redirect, AppError> {
    session
        .remove::<PendingImport>(PENDING_IMPORT_KEY)
        .await
        .map_err(session_error)?;
    Ok(Redirect::to(&format!("/{}", dataset.slug())))
}

/// Upsert the pending upload row by row and report the outcome.
#[instrument(skip_all, fields(dataset = %dataset, identity = %user.identity.id))]
pub async fn import(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Extension(dataset): Extension<Dataset>,
    session: Session,
) -> Result<Redirect, AppError> {
    let Some(pending) = pending_import(&session, dataset).await? else {
        return Ok(Redirect::to(&format!("/{}", dataset.slug())));
    };
    session
        .remove::<PendingImport>(PENDING_IMPORT_KEY)
        .await
        .map_err(session_error)?;

    let store = DatasetStore::new(user.client().clone(), dataset, state.fetch_policy());
    let summary = store.import(&pending.csv.rows).await;
    tracing::info!(
        file_name = %pending.file_name,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "csv imported"
    );

    Ok(Redirect::to(&format!(
        "/{}?imported={}&failed={}",
        dataset.slug(),
        summary.succeeded,
        summary.failed
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tabular::parse;

    fn rows(values: &[serde_json::Value]) -> Vec<Row> {
        values
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn admin() -> UserView {
        UserView {
            name: "Admin".to_string(),
            email: "admin@franchise.example".to_string(),
            role: "Administrator".to_string(),
            is_admin: true,
        }
    }

    fn template(dataset: Dataset, data: Vec<Row>, query: &str) -> DatasetTemplate {
        let table = Dataset::table_view(data).page(query, 1);
        DatasetTemplate {
            user: admin(),
            current_path: format!("/{}", dataset.slug()),
            title: dataset.title(),
            slug: dataset.slug(),
            search: query.to_string(),
            page_links: Vec::new(),
            previous_url: None,
            next_url: None,
            export_url: export_url(dataset, query),
            table,
            branch_count: None,
            chart: ChartView::default(),
            load_error: None,
            preview: None,
            preview_file: String::new(),
            upload_error: None,
            import_message: None,
        }
    }

    #[test]
    fn test_query_parsing_is_lenient() {
        let query = DatasetQuery {
            q: Some("  bilbao ".to_string()),
            page: Some("x".to_string()),
            compare: Some("BILBAO| |GIRONA".to_string()),
            imported: Some(3),
            failed: None,
        };
        assert_eq!(query.search(), "bilbao");
        assert_eq!(query.page(), 1);
        assert_eq!(query.compare(), vec!["BILBAO", "GIRONA"]);
        assert_eq!(query.summary().unwrap().message(), "Imported 3 rows successfully.");
    }

    #[test]
    fn test_urls_keep_search_and_selection() {
        assert_eq!(page_url(Dataset::Billing, "", 1, &[]), "/billing");
        assert_eq!(
            page_url(Dataset::Bookings, "san fer", 2, &["A".to_string(), "B".to_string()]),
            "/bookings?q=san+fer&page=2&compare=A%7CB"
        );
        assert_eq!(export_url(Dataset::Bookings, ""), "/bookings/export");
        assert_eq!(export_url(Dataset::Billing, "2024"), "/billing/export?q=2024");
    }

    #[test]
    fn test_chart_options_toggle_within_limit() {
        let available: Vec<String> = ["A", "B", "C"].iter().map(|s| (*s).to_string()).collect();
        let selected = vec!["A".to_string(), "B".to_string()];
        let options = chart_options(&available, &selected, 2, |names| names.join(","));

        assert!(options[0].selected);
        assert_eq!(options[0].url, "B");
        // Adding a third series drops the oldest to stay within the limit.
        assert!(!options[2].selected);
        assert_eq!(options[2].url, "B,C");
    }

    #[test]
    fn test_billing_chart_cards() {
        let chart = billing_chart(
            &rows(&[
                json!({"Rental Storage ID": 10, "Año": 2024, "Mes": 1, "Total Cost": 400, "Número de reservas": 4, "Número de vehículos": 2}),
            ]),
            &[],
            |_| String::new(),
        );
        assert_eq!(chart.selected, vec!["BILBAO"]);
        assert_eq!(chart.cards[0].figures[2].value, "400.00");
        assert_eq!(chart.cards[0].figures[3].value, "200.00");
        assert_eq!(chart.series.len(), 2);
    }

    #[test]
    fn test_table_renders_summary_and_hides_timestamps() {
        let html = template(
            Dataset::Bookings,
            rows(&[
                json!({"id": 1, "NOMBRE SUCURSAL": "BILBAO", "created_at": "2024-01-01T00:00:00Z"}),
                json!({"id": 2, "NOMBRE SUCURSAL": "GIRONA", "created_at": "2024-01-01T00:00:00Z"}),
            ]),
            "bilbao",
        )
        .render()
        .unwrap();

        assert!(html.contains("1 of 2 records"));
        assert!(html.contains("NOMBRE SUCURSAL"));
        assert!(!html.contains("created at"));
        assert!(html.contains("/bookings/export?q=bilbao"));
    }

    #[test]
    fn test_preview_renders_first_rows() {
        let csv = parse("id,name\n1,Ana\n2,Luis\n3,Marta\n4,Pablo\n5,Rosa\n6,Sara\n").unwrap();
        let mut page = template(Dataset::Billing, Vec::new(), "");
        page.preview = Some(ImportPreview::new(&csv));
        page.preview_file = "reservas.csv".to_string();
        let html = page.render().unwrap();

        assert!(html.contains("reservas.csv"));
        assert!(html.contains("Rosa"));
        assert!(!html.contains("Sara"));
        assert!(html.contains("6 rows"));
        assert!(html.contains(r#"action="/billing/import""#));
    }

    #[test]
    fn test_empty_dataset_placeholder() {
        let html = template(Dataset::Billing, Vec::new(), "").render().unwrap();
        assert!(html.contains("No data available"));
    }
}
