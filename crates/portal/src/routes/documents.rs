//! Document route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
};
use franchise_portal_core::DocumentId;
use serde::Deserialize;
use tracing::instrument;

use super::{LoadError, UserView, read_upload};
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAdmin, RequireSession};
use crate::resources::{Document, DocumentStore};
use crate::state::AppState;

// =============================================================================
// Query Types
// =============================================================================

/// Outcome of the last upload, passed back through the redirect.
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub uploaded: Option<String>,
    pub error: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Row of the documents table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentView {
    pub id: DocumentId,
    pub name: String,
    pub size: String,
    pub mime_type: String,
    pub uploaded_by: String,
    pub created_at: String,
}

impl From<&Document> for DocumentView {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name.clone(),
            size: doc.size_label(),
            mime_type: doc.mime_type.clone(),
            uploaded_by: doc.uploader().to_string(),
            created_at: doc
                .created_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }
}

/// Documents page template.
#[derive(Template, WebTemplate)]
#[template(path = "documents/index.html")]
pub struct DocumentsTemplate {
    pub user: UserView,
    pub current_path: String,
    pub documents: Vec<DocumentView>,
    pub load_error: Option<LoadError>,
    pub upload_success: Option<String>,
    pub upload_error: Option<String>,
}

fn upload_error_message(code: &str) -> &'static str {
    match code {
        "missing_file" => "Please choose a file to upload.",
        "permission" => "You do not have permission to upload documents.",
        _ => "The upload failed. Please try again.",
    }
}

// =============================================================================
// Routes
// =============================================================================

/// Document list, newest first.
#[instrument(skip_all, fields(identity = %user.identity.id))]
pub async fn index(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
) -> impl IntoResponse {
    let store = DocumentStore::new(user.client().clone(), state.fetch_policy());
    if let Err(e) = store.refresh().await {
        tracing::debug!(error = %e, "documents unavailable");
    }
    let snapshot = store.snapshot().await;

    DocumentsTemplate {
        user: UserView::from(&user),
        current_path: "/documents".to_string(),
        documents: snapshot.items.iter().map(DocumentView::from).collect(),
        load_error: LoadError::from_snapshot(&snapshot, "/documents"),
        upload_success: query.uploaded,
        upload_error: query
            .error
            .as_deref()
            .map(|c| upload_error_message(c).to_string()),
    }
}

/// Upload a document to blob storage and record it.
#[instrument(skip_all, fields(identity = %user.identity.id))]
pub async fn upload(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Some(file) = read_upload(multipart).await? else {
        return Ok(Redirect::to("/documents?error=missing_file").into_response());
    };

    let store = DocumentStore::new(user.client().clone(), state.fetch_policy());
    match store.upload(file, user.franchise_id()).await {
        Ok(document) => {
            let target = format!(
                "/documents?uploaded={}",
                url::form_urlencoded::byte_serialize(document.name.as_bytes()).collect::<String>()
            );
            Ok(Redirect::to(&target).into_response())
        }
        Err(e) if e.is_permission_denied() => {
            tracing::warn!(error = %e, "document upload denied");
            Ok(Redirect::to("/documents?error=permission").into_response())
        }
        Err(e) => {
            tracing::error!(error = %e, "document upload failed");
            Ok(Redirect::to("/documents?error=upload").into_response())
        }
    }
}

/// Stream a stored document back as an attachment.
#[instrument(skip_all, fields(identity = %user.identity.id, document_id = id))]
pub async fn download(
    RequireSession(user): RequireSession,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let store = DocumentStore::new(user.client().clone(), state.fetch_policy());
    let (document, bytes) = store.download(DocumentId::new(id)).await?;

    let content_type = HeaderValue::from_str(&document.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&document.name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `attachment; filename="..."` with characters unsafe in a header replaced.
fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
