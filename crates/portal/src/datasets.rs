//! Imported datasets: bookings and the monthly billing summary.
//!
//! Both are dynamically-shaped tables filled from CSV uploads. A
//! [`DatasetStore`] loads one of them through the resilient fetch and writes
//! uploads back with a per-row upsert.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::instrument;

use crate::backend::{AuthedClient, Order, SelectQuery};
use crate::fetch::{Collection, CollectionSnapshot, FetchError, RetryPolicy};
use crate::reports::bookings::BRANCH_COLUMN;
use crate::tabular::{DataTable, ImportSummary, Row, upsert_rows};

/// Columns never shown in a dataset table.
pub const HIDDEN_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Unique key used to merge uploaded rows into existing ones.
pub const CONFLICT_KEY: &str = "id";

/// Most rows loaded for the bookings table.
const BOOKINGS_LIMIT: usize = 10_000;

/// A dataset name that is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown dataset: {0} (expected bookings or billing)")]
pub struct UnknownDataset(String);

/// An imported dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Individual bookings, table `reservasimportadas`.
    Bookings,
    /// Monthly billing per storage, table `resumen_mensual_reservas`.
    Billing,
}

impl Dataset {
    pub const ALL: [Self; 2] = [Self::Bookings, Self::Billing];

    /// URL segment and CLI name.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Bookings => "bookings",
            Self::Billing => "billing",
        }
    }

    /// Backend table.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Bookings => "reservasimportadas",
            Self::Billing => "resumen_mensual_reservas",
        }
    }

    /// Page heading.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Bookings => "Bookings",
            Self::Billing => "Billing",
        }
    }

    /// Query used to load the table.
    #[must_use]
    pub fn query(self) -> SelectQuery {
        match self {
            Self::Bookings => SelectQuery::table(self.table())
                .order_by(BRANCH_COLUMN, Order::Desc)
                .limit(BOOKINGS_LIMIT),
            Self::Billing => SelectQuery::table(self.table())
                .order_by("Año", Order::Desc)
                .order_by("Mes", Order::Desc),
        }
    }

    /// Table view of loaded rows with bookkeeping columns hidden.
    #[must_use]
    pub fn table_view(rows: Vec<Row>) -> DataTable {
        DataTable::new(rows).hide_columns(HIDDEN_COLUMNS)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Dataset {
    type Err = UnknownDataset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.slug().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownDataset(s.to_string()))
    }
}

/// Rows of one dataset visible to the signed-in user.
pub struct DatasetStore {
    client: AuthedClient,
    dataset: Dataset,
    rows: Collection<Row>,
}

impl DatasetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(client: AuthedClient, dataset: Dataset, policy: RetryPolicy) -> Self {
        Self {
            client,
            dataset,
            rows: Collection::new(policy),
        }
    }

    #[must_use]
    pub const fn dataset(&self) -> Dataset {
        self.dataset
    }

    /// Reload the dataset.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the snapshot then carries the user message.
    #[instrument(skip(self), fields(dataset = %self.dataset))]
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let query = self.dataset.query();
        let client = &self.client;
        self.rows.refresh(|| client.select::<Row>(&query)).await
    }

    /// Current rows and load state.
    pub async fn snapshot(&self) -> CollectionSnapshot<Row> {
        self.rows.snapshot().await
    }

    /// Upsert `rows` into the dataset table, keyed on [`CONFLICT_KEY`].
    #[instrument(skip(self, rows), fields(dataset = %self.dataset, rows = rows.len()))]
    pub async fn import(&self, rows: &[Row]) -> ImportSummary {
        upsert_rows(&self.client, self.dataset.table(), CONFLICT_KEY, rows).await
    }
}
