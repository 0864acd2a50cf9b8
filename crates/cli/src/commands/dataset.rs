//! Dataset import and export commands.
//!
//! # Usage
//!
//! ```bash
//! # Preview a file without writing anything
//! fp-cli import --dataset billing resumen.csv --dry-run
//!
//! # Upsert it
//! fp-cli import --dataset billing resumen.csv
//!
//! # Export every bookings row
//! fp-cli export --dataset bookings
//! ```

use std::path::{Path, PathBuf};

use franchise_portal::datasets::{Dataset, DatasetStore};
use franchise_portal::fetch::{FetchError, RetryPolicy};
use franchise_portal::tabular::{ImportError, ImportPreview, export_file_name, prepare};
use thiserror::Error;

use super::session::{SignInError, sign_in};

/// Errors that can occur during dataset commands.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not an importable CSV.
    #[error("Invalid CSV: {0}")]
    Invalid(#[from] ImportError),

    #[error(transparent)]
    SignIn(#[from] SignInError),

    /// The dataset could not be loaded.
    #[error("Could not load dataset: {0}")]
    Fetch(#[from] FetchError),

    /// Some rows were rejected by the backend.
    #[error("{failed} of {attempted} rows failed to import")]
    PartialImport { failed: usize, attempted: usize },
}

/// Validate `file` and upsert its rows into `dataset`.
pub async fn import(dataset: Dataset, file: &Path, dry_run: bool) -> Result<(), DatasetError> {
    let bytes = std::fs::read(file).map_err(|source| DatasetError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parsed = prepare(&file_name, &bytes)?;
    let preview = ImportPreview::new(&parsed);
    tracing::info!(
        "{}: {} rows, columns: {}",
        file_name,
        preview.total_rows,
        preview.headers.join(", ")
    );
    for row in &preview.rows {
        tracing::info!("  {}", row.join(" | "));
    }

    if dry_run {
        tracing::info!("Dry run, nothing written");
        return Ok(());
    }

    let user = sign_in().await?;
    let store = DatasetStore::new(user.client().clone(), dataset, RetryPolicy::default());

    tracing::info!("Importing into {} ({})", dataset.title(), dataset.table());
    let summary = store.import(&parsed.rows).await;
    tracing::info!("{}", summary.message());

    if summary.failed > 0 {
        return Err(DatasetError::PartialImport {
            failed: summary.failed,
            attempted: summary.attempted(),
        });
    }
    Ok(())
}

/// Write the rows of `dataset` matching `query` to `output` as CSV.
pub async fn export(
    dataset: Dataset,
    query: &str,
    output: Option<PathBuf>,
) -> Result<(), DatasetError> {
    let user = sign_in().await?;
    let store = DatasetStore::new(user.client().clone(), dataset, RetryPolicy::default());
    store.refresh().await?;

    let table = Dataset::table_view(store.snapshot().await.items);
    let csv = table.to_csv(query.trim());

    let path = output
        .unwrap_or_else(|| PathBuf::from(export_file_name(chrono::Local::now().date_naive())));
    std::fs::write(&path, csv).map_err(|source| DatasetError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::info!(
        "Exported {} of {} rows to {}",
        table.filter(query.trim()).count(),
        table.total(),
        path.display()
    );
    Ok(())
}
