//! Previewing and bulk-upserting parsed CSV rows.

use std::future::Future;

use franchise_portal_core::{CellValue, truncate_chars};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use super::Row;
use super::csv::{CsvError, ParsedCsv, check_file_name, parse_bytes};
use crate::backend::{AuthedClient, BackendError};

/// Rows shown in the upload preview.
pub const PREVIEW_ROWS: usize = 5;

/// Characters shown per preview cell before truncation.
pub const PREVIEW_TRUNCATE_AT: usize = 50;

/// Why an upload cannot be imported. Nothing is written in these cases.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error(transparent)]
    Csv(#[from] CsvError),

    #[error("The file contains a header but no data rows")]
    NoRows,

    #[error("Please choose a file to upload")]
    MissingFile,
}

/// Validate an uploaded file and parse it.
///
/// # Errors
///
/// Returns `ImportError` if the name is not `.csv`, the content is not valid
/// CSV, or there are no data rows.
pub fn prepare(file_name: &str, bytes: &[u8]) -> Result<ParsedCsv, ImportError> {
    if file_name.trim().is_empty() {
        return Err(ImportError::MissingFile);
    }
    check_file_name(file_name)?;
    let parsed = parse_bytes(bytes)?;
    if parsed.rows.is_empty() {
        return Err(ImportError::NoRows);
    }
    Ok(parsed)
}

/// First rows of an upload, shown before it is imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPreview {
    pub headers: Vec<String>,
    /// Cell text, cut at [`PREVIEW_TRUNCATE_AT`] characters.
    pub rows: Vec<Vec<String>>,
    /// Rows in the whole file.
    pub total_rows: usize,
}

impl ImportPreview {
    #[must_use]
    pub fn new(parsed: &ParsedCsv) -> Self {
        let rows = parsed
            .rows
            .iter()
            .take(PREVIEW_ROWS)
            .map(|row| {
                parsed
                    .headers
                    .iter()
                    .map(|h| {
                        truncate_chars(
                            &CellValue::from(row.get(h)).export_text(),
                            PREVIEW_TRUNCATE_AT,
                        )
                    })
                    .collect()
            })
            .collect();

        Self {
            headers: parsed.headers.clone(),
            rows,
            total_rows: parsed.rows.len(),
        }
    }
}

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl ImportSummary {
    /// Rows attempted.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Message shown after the import.
    #[must_use]
    pub fn message(&self) -> String {
        if self.failed == 0 {
            format!("Imported {} rows successfully.", self.succeeded)
        } else {
            format!(
                "Imported {} of {} rows; {} failed.",
                self.succeeded,
                self.attempted(),
                self.failed
            )
        }
    }
}

/// Destination for upserted rows.
pub trait RowSink: Sync {
    /// Insert `row` into `table`, merging with the row sharing `conflict_key`.
    fn upsert_row(
        &self,
        table: &str,
        conflict_key: &str,
        row: &Row,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl RowSink for AuthedClient {
    async fn upsert_row(
        &self,
        table: &str,
        conflict_key: &str,
        row: &Row,
    ) -> Result<(), BackendError> {
        self.upsert(table, conflict_key, row).await
    }
}

/// Upsert `rows` one at a time.
///
/// A failed row is logged and counted; the batch carries on. Rows are written
/// as given: last write wins and no column validation is done.
#[instrument(skip(sink, rows), fields(rows = rows.len()))]
pub async fn upsert_rows<S: RowSink>(
    sink: &S,
    table: &str,
    conflict_key: &str,
    rows: &[Row],
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for (index, row) in rows.iter().enumerate() {
        match sink.upsert_row(table, conflict_key, row).await {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                tracing::warn!(row = index + 1, error = %e, "row upsert failed");
                summary.failed += 1;
            }
        }
    }
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "import finished"
    );
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::tabular::csv::parse;

    /// Records upserts and rejects rows whose `id` is listed in `reject`.
    struct RecordingSink {
        reject: Vec<&'static str>,
        written: Mutex<Vec<(String, String, Row)>>,
    }

    impl RecordingSink {
        fn new(reject: Vec<&'static str>) -> Self {
            Self {
                reject,
                written: Mutex::new(Vec::new()),
            }
        }
    }

    impl RowSink for RecordingSink {
        async fn upsert_row(
            &self,
            table: &str,
            conflict_key: &str,
            row: &Row,
        ) -> Result<(), BackendError> {
            let id = row.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            if self.reject.contains(&id) {
                return Err(BackendError::Api {
                    status: 400,
                    message: "invalid input syntax".to_string(),
                });
            }
            self.written.lock().unwrap().push((
                table.to_string(),
                conflict_key.to_string(),
                row.clone(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_preview_limits_rows_and_cell_length() {
        let mut text = String::from("id,notes\n");
        for i in 0..8 {
            text.push_str(&format!("{i},{}\n", "n".repeat(60)));
        }
        let parsed = parse(&text).unwrap();
        let preview = ImportPreview::new(&parsed);

        assert_eq!(preview.rows.len(), PREVIEW_ROWS);
        assert_eq!(preview.total_rows, 8);
        assert_eq!(preview.rows[0][1], format!("{}...", "n".repeat(50)));
    }

    #[test]
    fn test_preview_of_small_file() {
        let parsed = parse("id,name\n1,Alice\n2,Bob").unwrap();
        let preview = ImportPreview::new(&parsed);
        assert_eq!(preview.headers, vec!["id", "name"]);
        assert_eq!(preview.rows, vec![vec!["1", "Alice"], vec!["2", "Bob"]]);
    }

    #[test]
    fn test_prepare_rejections() {
        assert_eq!(prepare("", b"id\n1"), Err(ImportError::MissingFile));
        assert!(matches!(
            prepare("data.txt", b"id\n1"),
            Err(ImportError::Csv(CsvError::NotCsv(_)))
        ));
        assert_eq!(
            prepare("data.csv", b""),
            Err(ImportError::Csv(CsvError::Empty))
        );
        assert_eq!(prepare("data.csv", b"id,name\n"), Err(ImportError::NoRows));
        assert!(prepare("data.csv", b"id,name\n1,Alice").is_ok());
    }

    #[tokio::test]
    async fn test_failed_rows_are_counted_and_batch_continues() {
        let parsed = parse("id,name\n1,Alice\n2,Bob\n3,Carol").unwrap();
        let sink = RecordingSink::new(vec!["2"]);

        let summary = upsert_rows(&sink, "reservasimportadas", "id", &parsed.rows).await;

        assert_eq!(
            summary,
            ImportSummary {
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(summary.message(), "Imported 2 of 3 rows; 1 failed.");

        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, "reservasimportadas");
        assert_eq!(written[0].1, "id");
        assert_eq!(written[1].2["name"], "Carol");
    }

    #[test]
    fn test_summary_message_all_succeeded() {
        let summary = ImportSummary {
            succeeded: 4,
            failed: 0,
        };
        assert_eq!(summary.message(), "Imported 4 rows successfully.");
    }
}
