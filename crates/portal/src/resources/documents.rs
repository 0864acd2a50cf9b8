//! Shared documents: upload to blob storage, list, download.

use chrono::{DateTime, Utc};
use franchise_portal_core::{DocumentId, FranchiseId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::null_as_default;
use crate::backend::{AuthedClient, BackendError, Order, SelectQuery};
use crate::fetch::{Collection, CollectionSnapshot, FetchError, RetryPolicy};

/// Table holding document metadata.
pub const DOCUMENTS_TABLE: &str = "documents";

/// Shown when a document row has no uploader.
const UNKNOWN_UPLOADER: &str = "unknown";

/// Used when the browser sent no content type.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Metadata row for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: DocumentId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_path: String,
    /// Size in bytes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_size: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mime_type: String,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub franchise_id: Option<FranchiseId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Size in kilobytes with one decimal, e.g. `2.0 KB`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_label(&self) -> String {
        format!("{:.1} KB", self.file_size as f64 / 1024.0)
    }

    /// Uploader id, or `unknown` when the row has none.
    #[must_use]
    pub fn uploader(&self) -> &str {
        self.uploaded_by
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(UNKNOWN_UPLOADER)
    }
}

/// A file received from an upload form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct NewDocument<'a> {
    name: &'a str,
    file_path: &'a str,
    file_size: i64,
    mime_type: &'a str,
    franchise_id: Option<&'a FranchiseId>,
}

/// Name a blob is stored under: `<unix-millis>-<original name>`.
#[must_use]
pub fn storage_name(now: DateTime<Utc>, file_name: &str) -> String {
    format!("{}-{file_name}", now.timestamp_millis())
}

/// Documents visible to the signed-in user.
pub struct DocumentStore {
    client: AuthedClient,
    documents: Collection<Document>,
}

impl DocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(client: AuthedClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            documents: Collection::new(policy),
        }
    }

    /// Reload the list, newest first.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the snapshot then carries the user message.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let query = SelectQuery::table(DOCUMENTS_TABLE).order_by("created_at", Order::Desc);
        let client = &self.client;
        self.documents
            .refresh(|| client.select::<Document>(&query))
            .await
    }

    /// Current rows and load state.
    pub async fn snapshot(&self) -> CollectionSnapshot<Document> {
        self.documents.snapshot().await
    }

    /// Store `file` in the documents bucket and record it.
    ///
    /// On success the new row is added at the front of the list.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if either the blob upload or the row insert is
    /// rejected; the list is left untouched.
    #[instrument(skip(self, file), fields(file_name = %file.file_name, size = file.bytes.len()))]
    pub async fn upload(
        &self,
        file: Upload,
        franchise_id: Option<&FranchiseId>,
    ) -> Result<Document, BackendError> {
        let bucket = self.client.backend().documents_bucket();
        let mime_type = file
            .content_type
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_MIME)
            .to_string();
        let file_size = i64::try_from(file.bytes.len()).unwrap_or(i64::MAX);
        let object_name = storage_name(Utc::now(), &file.file_name);

        let stored_path = self
            .client
            .upload_object(bucket, &object_name, &mime_type, file.bytes)
            .await?;

        let row = NewDocument {
            name: &file.file_name,
            file_path: &stored_path,
            file_size,
            mime_type: &mime_type,
            franchise_id,
        };
        let mut document: Document = self.client.insert(DOCUMENTS_TABLE, &row).await?;
        if document.uploaded_by.as_deref().is_none_or(str::is_empty) {
            document.uploaded_by = Some(UNKNOWN_UPLOADER.to_string());
        }

        tracing::info!(document_id = %document.id, path = %document.file_path, "document uploaded");
        self.documents.prepend(document.clone()).await;
        Ok(document)
    }

    /// Fetch the row for `id` and the stored file's bytes.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the row is not visible or the blob
    /// is missing.
    #[instrument(skip(self))]
    pub async fn download(&self, id: DocumentId) -> Result<(Document, Vec<u8>), BackendError> {
        let query = SelectQuery::table(DOCUMENTS_TABLE)
            .eq("id", id.as_i64())
            .limit(1);
        let document = self
            .client
            .select::<Document>(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("document {id}")))?;

        let bytes = self
            .client
            .download_object(self.client.backend().documents_bucket(), &document.file_path)
            .await?;
        Ok((document, bytes))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn document(size: i64, uploaded_by: Option<&str>) -> Document {
        Document {
            id: DocumentId::new(1),
            name: "Manual.pdf".to_string(),
            file_path: "1700000000000-Manual.pdf".to_string(),
            file_size: size,
            mime_type: "application/pdf".to_string(),
            uploaded_by: uploaded_by.map(String::from),
            franchise_id: None,
            created_at: None,
        }
    }

    #[test]
    fn test_size_label_one_decimal_kb() {
        assert_eq!(document(2048, None).size_label(), "2.0 KB");
        assert_eq!(document(1536, None).size_label(), "1.5 KB");
        assert_eq!(document(0, None).size_label(), "0.0 KB");
    }

    #[test]
    fn test_uploader_fallback() {
        assert_eq!(document(0, None).uploader(), "unknown");
        assert_eq!(document(0, Some("")).uploader(), "unknown");
        assert_eq!(document(0, Some("u-1")).uploader(), "u-1");
    }

    #[test]
    fn test_storage_name_prefixes_millis() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            storage_name(now, "Manual.pdf"),
            "1700000000123-Manual.pdf"
        );
    }

    #[test]
    fn test_decode_tolerates_nulls() {
        let row: Document = serde_json::from_str(
            r#"{"id":3,"name":"a.txt","file_path":null,"file_size":null,"mime_type":null,"uploaded_by":null}"#,
        )
        .unwrap();
        assert_eq!(row.file_size, 0);
        assert_eq!(row.uploader(), "unknown");
    }
}
