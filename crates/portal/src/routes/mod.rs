//! HTTP route handlers for the portal.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                           - Redirect to the dashboard
//! GET  /health                     - Liveness probe
//! GET  /health/ready               - Readiness probe (identity provider reachable)
//!
//! # Auth
//! GET  /login                      - Login page
//! POST /login                      - Password sign-in
//! POST /logout                     - Sign out
//!
//! # Dashboard
//! GET  /dashboard                  - Overview cards and franchise info
//!
//! # Documents
//! GET  /documents                  - Document list (upload form for admins)
//! POST /documents                  - Upload a document (admin)
//! GET  /documents/{id}/download    - Download a document
//!
//! # News
//! GET  /news                       - News feed (editor for admins)
//! POST /news                       - Publish (admin)
//! POST /news/{id}                  - Edit (admin)
//! POST /news/{id}/delete           - Delete (admin)
//!
//! # Reports
//! GET  /reports                    - Monthly metrics
//!
//! # Datasets (/bookings and /billing)
//! GET  /{dataset}                  - Table, search, pagination and charts
//! GET  /{dataset}/export           - CSV of the filtered table
//! POST /{dataset}/upload           - Parse a CSV and show a preview (admin)
//! POST /{dataset}/import           - Upsert the previewed CSV (admin)
//! POST /{dataset}/upload/cancel    - Discard the preview (admin)
//! ```

pub mod auth;
pub mod dashboard;
pub mod datasets;
pub mod documents;
pub mod health;
pub mod news;
pub mod reports;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart},
    response::Redirect,
    routing::{get, post},
};

use crate::datasets::Dataset;
use crate::error::AppError;
use crate::fetch::CollectionSnapshot;
use crate::resources::Upload;
use crate::session::CurrentUser;
use crate::state::AppState;

/// Largest accepted upload body (documents and CSV files).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Multipart field carrying an uploaded file.
const FILE_FIELD: &str = "file";

/// Signed-in user as shown in the page chrome.
#[derive(Debug, Clone)]
pub struct UserView {
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_admin: bool,
}

impl From<&CurrentUser> for UserView {
    fn from(user: &CurrentUser) -> Self {
        Self {
            name: user.display_name(),
            email: user.email(),
            role: user.role().label().to_string(),
            is_admin: user.is_admin(),
        }
    }
}

/// A failed load, rendered with a retry link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub message: String,
    /// Re-requests the same page.
    pub retry_url: String,
}

impl LoadError {
    /// Error notice for `snapshot`, if its last load failed.
    #[must_use]
    pub fn from_snapshot<T>(snapshot: &CollectionSnapshot<T>, retry_url: &str) -> Option<Self> {
        snapshot.error.as_ref().map(|message| Self {
            message: message.clone(),
            retry_url: retry_url.to_string(),
        })
    }
}

/// Read the first file field of an upload form.
///
/// Returns `None` when no file was chosen.
pub(crate) async fn read_upload(mut multipart: Multipart) -> Result<Option<Upload>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().trim().to_string();
        let content_type = field.content_type().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if file_name.is_empty() {
            return Ok(None);
        }
        return Ok(Some(Upload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

/// Build the portal router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/dashboard", get(dashboard::dashboard))
        .nest("/documents", document_routes())
        .nest("/news", news_routes())
        .route("/reports", get(reports::reports))
        .nest("/bookings", datasets::routes(Dataset::Bookings))
        .nest("/billing", datasets::routes(Dataset::Billing))
}

fn document_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(documents::index)
                .post(documents::upload)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/{id}/download", get(documents::download))
}

fn news_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(news::index).post(news::create))
        .route("/{id}", post(news::update))
        .route("/{id}/delete", post(news::delete))
}
