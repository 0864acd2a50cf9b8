//! Monthly billing per rental storage.

use std::collections::BTreeSet;

use super::metrics::month_name;
use super::{SeriesPoint, first_text, integer, number, select_series};
use crate::tabular::Row;

/// Storages compared in one chart.
pub const MAX_COMPARED_STORAGES: usize = 6;

/// Known rental storages by id. Id 0 is the all-storages total.
const STORAGE_NAMES: &[(i64, &str)] = &[
    (0, "TOTAL"),
    (3, "MADRID - SAN FERNANDO DE HENARES"),
    (6, "MADRID SUR - TOLEDO"),
    (8, "MADRID - SUR"),
    (10, "BILBAO"),
    (13, "ALCALÁ DE HENARES"),
    (15, "BARCELONA"),
    (17, "MADRID POZUELO"),
    (20, "ALMERIA"),
    (23, "MADRID - LAS ROZAS"),
    (24, "LUGO - SARRIA"),
    (27, "VILLARREAL"),
    (30, "LOZOYA SIERRA NORTE"),
    (32, "MURCIA"),
    (34, "IBIZA"),
    (36, "VALENCIA"),
    (39, "VALENCIA"),
    (42, "SEGOVIA"),
    (43, "GIRONA"),
    (45, "BADALONA"),
    (48, "ZAMORA"),
];

/// Display name of storage `id`, falling back to the row's own name.
#[must_use]
pub fn storage_name(id: i64, fallback: Option<&str>) -> Option<String> {
    STORAGE_NAMES
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, name)| (*name).to_string())
        .or_else(|| {
            fallback
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
        })
}

/// One storage's figures for one month.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingPoint {
    pub storage_id: i64,
    pub storage: String,
    pub year: i64,
    pub month: i64,
    pub item_cost: f64,
    pub extras_cost: f64,
    pub total_cost: f64,
    pub bookings: f64,
    pub vehicles: f64,
    pub billing_per_vehicle: f64,
}

impl BillingPoint {
    /// Read a summary row. Rows with no storage name, a non-positive year or a
    /// month outside 1-12 are rejected.
    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        let storage_id = integer(row, "Rental Storage ID");
        let fallback = first_text(row, &["Rental Storage Nombre"]);
        let storage = storage_name(storage_id, fallback.as_deref())?;
        let year = integer(row, "Año");
        let month = integer(row, "Mes");
        if year <= 0 || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self {
            storage_id,
            storage,
            year,
            month,
            item_cost: number(row, "Total Item Cost"),
            extras_cost: number(row, "Total Extras Cost"),
            total_cost: number(row, "Total Cost"),
            bookings: number(row, "Número de reservas"),
            vehicles: number(row, "Número de vehículos"),
            billing_per_vehicle: number(row, "Facturación por vehículo"),
        })
    }
}

/// Summary cards for one storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageTotals {
    pub storage: String,
    pub bookings: f64,
    pub vehicles: f64,
    pub billing: f64,
    /// `billing / vehicles`, zero without vehicles.
    pub billing_per_vehicle: f64,
    /// Months with data.
    pub periods: usize,
}

/// Chart data comparing storages month by month.
#[derive(Debug, Clone, Default)]
pub struct BillingChart {
    points: Vec<BillingPoint>,
}

impl BillingChart {
    /// Build from raw summary rows, dropping invalid ones.
    #[must_use]
    pub fn from_rows(rows: &[Row]) -> Self {
        Self {
            points: rows.iter().filter_map(BillingPoint::from_row).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distinct storage names, sorted.
    #[must_use]
    pub fn storages(&self) -> Vec<String> {
        self.points
            .iter()
            .map(|p| p.storage.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Storages to plot: the requested ones that exist (at most
    /// [`MAX_COMPARED_STORAGES`]), or the first ones alphabetically.
    #[must_use]
    pub fn select(&self, requested: &[String]) -> Vec<String> {
        select_series(&self.storages(), requested, MAX_COMPARED_STORAGES)
    }

    /// Billing per vehicle, one point per month, oldest first.
    #[must_use]
    pub fn billing_series(&self, storages: &[String]) -> Vec<SeriesPoint> {
        self.series(storages, |p| p.billing_per_vehicle)
    }

    /// Number of bookings, one point per month, oldest first.
    #[must_use]
    pub fn bookings_series(&self, storages: &[String]) -> Vec<SeriesPoint> {
        self.series(storages, |p| p.bookings)
    }

    /// Totals for `storage` across every month.
    #[must_use]
    pub fn totals(&self, storage: &str) -> StorageTotals {
        let rows: Vec<&BillingPoint> = self
            .points
            .iter()
            .filter(|p| p.storage == storage)
            .collect();
        let bookings = rows.iter().map(|p| p.bookings).sum();
        let vehicles: f64 = rows.iter().map(|p| p.vehicles).sum();
        let billing: f64 = rows.iter().map(|p| p.total_cost).sum();
        StorageTotals {
            storage: storage.to_string(),
            bookings,
            vehicles,
            billing,
            billing_per_vehicle: if vehicles > 0.0 { billing / vehicles } else { 0.0 },
            periods: rows.len(),
        }
    }

    fn series<F>(&self, storages: &[String], value: F) -> Vec<SeriesPoint>
    where
        F: Fn(&BillingPoint) -> f64,
    {
        let periods: BTreeSet<(i64, i64)> = self
            .points
            .iter()
            .filter(|p| storages.contains(&p.storage))
            .map(|p| (p.year, p.month))
            .collect();

        periods
            .into_iter()
            .map(|(year, month)| SeriesPoint {
                label: format!(
                    "{} {year}",
                    u32::try_from(month).map_or("", month_name)
                ),
                values: storages
                    .iter()
                    .map(|storage| {
                        self.points
                            .iter()
                            .find(|p| &p.storage == storage && p.year == year && p.month == month)
                            .map_or(0.0, &value)
                    })
                    .collect(),
            })
            .collect()
    }
}
