//! Bookings by branch and customer age group.

use std::collections::BTreeSet;

use franchise_portal_core::CellValue;

use super::{SeriesPoint, first_text, integer, number, select_series};
use crate::backend::{Order, SelectQuery};
use crate::tabular::Row;

/// View aggregating bookings per branch and age group.
pub const AGE_GROUP_VIEW: &str = "reservas_por_sucursal_edad";

/// Column holding the branch name in the imported bookings table.
pub const BRANCH_COLUMN: &str = "NOMBRE SUCURSAL";

/// Branches compared in one chart.
pub const MAX_COMPARED_BRANCHES: usize = 3;

/// Age-group start that marks placeholder rows in the view.
const PLACEHOLDER_AGE_START: i64 = 2025;

/// Query for the age-group view, youngest group first.
#[must_use]
pub fn age_group_query() -> SelectQuery {
    SelectQuery::table(AGE_GROUP_VIEW).order_by("grupo_edad_inicio", Order::Asc)
}

/// One row of the age-group view.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeGroupPoint {
    pub branch: String,
    pub age_start: i64,
    pub age_end: i64,
    pub bookings: f64,
    pub sales: f64,
    pub average_ticket: f64,
}

impl AgeGroupPoint {
    /// Read a view row. Rows without a branch, with non-positive age bounds,
    /// or with the placeholder start age are rejected.
    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        let branch = first_text(row, &["sucursal", BRANCH_COLUMN, "nombre_sucursal"])?;
        let age_start = integer(row, "grupo_edad_inicio");
        let age_end = integer(row, "grupo_edad_fin");
        if age_start <= 0 || age_end <= 0 || age_start == PLACEHOLDER_AGE_START {
            return None;
        }
        Some(Self {
            branch,
            age_start,
            age_end,
            bookings: number(row, "total_reservas"),
            sales: number(row, "ventas_totales"),
            average_ticket: number(row, "ticket_medio"),
        })
    }

    /// `start-end`, the x-axis label.
    #[must_use]
    pub fn age_group(&self) -> String {
        format!("{}-{}", self.age_start, self.age_end)
    }
}

/// Chart data comparing branches across age groups.
#[derive(Debug, Clone, Default)]
pub struct BookingsChart {
    points: Vec<AgeGroupPoint>,
}

impl BookingsChart {
    /// Build from raw view rows, dropping invalid ones.
    #[must_use]
    pub fn from_rows(rows: &[Row]) -> Self {
        Self {
            points: rows.iter().filter_map(AgeGroupPoint::from_row).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Valid rows in the chart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Distinct branch names, sorted.
    #[must_use]
    pub fn branches(&self) -> Vec<String> {
        self.points
            .iter()
            .map(|p| p.branch.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Branches to plot: the requested ones that exist (at most
    /// [`MAX_COMPARED_BRANCHES`]), or the first ones alphabetically.
    #[must_use]
    pub fn select(&self, requested: &[String]) -> Vec<String> {
        select_series(&self.branches(), requested, MAX_COMPARED_BRANCHES)
    }

    /// Bookings per age group for each of `branches`.
    #[must_use]
    pub fn series(&self, branches: &[String]) -> Vec<SeriesPoint> {
        let groups: BTreeSet<(i64, i64)> = self
            .points
            .iter()
            .filter(|p| branches.contains(&p.branch))
            .map(|p| (p.age_start, p.age_end))
            .collect();

        groups
            .into_iter()
            .map(|(start, end)| SeriesPoint {
                label: format!("{start}-{end}"),
                values: branches
                    .iter()
                    .map(|branch| {
                        self.points
                            .iter()
                            .find(|p| {
                                &p.branch == branch && p.age_start == start && p.age_end == end
                            })
                            .map_or(0.0, |p| p.bookings)
                    })
                    .collect(),
            })
            .collect()
    }

    /// Total bookings of `branch` across all age groups.
    #[must_use]
    pub fn branch_total(&self, branch: &str) -> f64 {
        self.points
            .iter()
            .filter(|p| p.branch == branch)
            .map(|p| p.bookings)
            .sum()
    }
}

/// Distinct non-blank branch names in the imported bookings table.
#[must_use]
pub fn unique_branch_count(rows: &[Row]) -> usize {
    rows.iter()
        .map(|row| CellValue::from(row.get(BRANCH_COLUMN)))
        .filter(|cell| !cell.is_blank())
        .map(|cell| cell.export_text())
        .collect::<BTreeSet<_>>()
        .len()
}
