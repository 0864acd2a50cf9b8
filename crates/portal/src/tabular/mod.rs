//! Dynamically-shaped tables imported from CSV.
//!
//! Imported datasets have no schema known to the portal: a row is whatever
//! columns the CSV header named. [`csv`] reads uploads, [`table`] searches,
//! paginates and exports rows, and [`import`] previews and upserts them.

pub mod csv;
pub mod import;
pub mod table;

pub use csv::{CsvError, ParsedCsv, check_file_name, parse, parse_bytes};
pub use import::{
    ImportError, ImportPreview, ImportSummary, PREVIEW_ROWS, RowSink, prepare, upsert_rows,
};
pub use table::{DataTable, PAGE_SIZE, PAGE_WINDOW, TableColumn, TablePage, export_file_name};

/// One dynamically-shaped row, keys in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;
