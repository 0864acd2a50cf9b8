//! Blob storage API (`storage/v1/object`).

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::instrument;

use super::{AuthedClient, BackendError, check_status};

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key", default)]
    key: Option<String>,
}

impl AuthedClient {
    /// Upload `bytes` to `bucket/path`.
    ///
    /// Returns the object path inside the bucket, which is what document rows
    /// store as `file_path`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the upload is rejected (for example when an
    /// object already exists at `path`).
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError> {
        let url = self
            .backend()
            .endpoint(&["storage", "v1", "object", bucket, path])?;

        let response = self
            .backend()
            .http()
            .post(url)
            .headers(self.headers()?)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let uploaded: UploadResponse = check_status(response).await?.json().await?;

        // The API answers with `<bucket>/<path>`; callers want `<path>`.
        let stored = uploaded
            .key
            .as_deref()
            .and_then(|key| key.strip_prefix(bucket))
            .and_then(|key| key.strip_prefix('/'))
            .unwrap_or(path)
            .to_string();
        Ok(stored)
    }

    /// Download the object at `bucket/path`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the object does not exist.
    #[instrument(skip(self))]
    pub async fn download_object(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let url = self
            .backend()
            .endpoint(&["storage", "v1", "object", bucket, path])?;

        let response = self
            .backend()
            .http()
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?;

        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
