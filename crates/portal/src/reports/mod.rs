//! Derived report data: metric summaries and chart series.
//!
//! Nothing here talks to the backend. Each builder takes rows that a store
//! already loaded and produces view-ready numbers; drawing the charts is left
//! to the browser.

pub mod billing;
pub mod bookings;
pub mod metrics;

pub use billing::{BillingChart, BillingPoint, StorageTotals, storage_name};
pub use bookings::{AgeGroupPoint, BookingsChart, unique_branch_count};
pub use metrics::{MetricsReport, MonthlyRow};

use franchise_portal_core::CellValue;

use crate::tabular::Row;

/// One x-axis position of a multi-series chart.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SeriesPoint {
    /// X-axis label.
    pub label: String,
    /// One value per selected series, in selection order. Missing is `0`.
    pub values: Vec<f64>,
}

/// Numeric value of `key`, with anything missing or unparseable as `0`.
pub(crate) fn number(row: &Row, key: &str) -> f64 {
    CellValue::from(row.get(key)).as_f64().unwrap_or(0.0)
}

/// Integer value of `key`, with anything missing or unparseable as `0`.
pub(crate) fn integer(row: &Row, key: &str) -> i64 {
    CellValue::from(row.get(key)).as_i64().unwrap_or(0)
}

/// First non-blank text among `keys`.
pub(crate) fn first_text(row: &Row, keys: &[&str]) -> Option<String> {
    keys.iter()
        .map(|key| CellValue::from(row.get(*key)))
        .find(|cell| !cell.is_blank())
        .map(|cell| cell.export_text().trim().to_string())
}

/// Keep the requested series that exist, or default to the first `max`.
pub(crate) fn select_series(available: &[String], requested: &[String], max: usize) -> Vec<String> {
    let mut chosen: Vec<String> = Vec::new();
    for name in requested {
        if available.contains(name) && !chosen.contains(name) && chosen.len() < max {
            chosen.push(name.clone());
        }
    }
    if chosen.is_empty() {
        chosen = available.iter().take(max).cloned().collect();
    }
    chosen
}
