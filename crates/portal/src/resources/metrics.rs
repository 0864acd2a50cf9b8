//! Monthly franchise metrics (read-only).

use chrono::{DateTime, Utc};
use franchise_portal_core::MetricId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::null_as_default;
use crate::backend::{AuthedClient, Order, SelectQuery};
use crate::fetch::{Collection, CollectionSnapshot, FetchError, RetryPolicy};

/// Table holding monthly metrics.
pub const METRICS_TABLE: &str = "metrics";

/// One franchise's figures for one month.
///
/// Null columns decode to zero or the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub franchise_id: String,
    /// First day of the month, `YYYY-MM-DD`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub month: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub revenue: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customers: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub orders: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Metrics visible to the signed-in user.
pub struct MetricsStore {
    client: AuthedClient,
    metrics: Collection<Metric>,
}

impl MetricsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(client: AuthedClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            metrics: Collection::new(policy),
        }
    }

    /// Reload, most recent month first.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the snapshot then carries the user message.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let query = SelectQuery::table(METRICS_TABLE).order_by("month", Order::Desc);
        let client = &self.client;
        self.metrics
            .refresh(|| client.select::<Metric>(&query))
            .await
    }

    /// Current rows and load state.
    pub async fn snapshot(&self) -> CollectionSnapshot<Metric> {
        self.metrics.snapshot().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_null_columns_become_defaults() {
        let metric: Metric = serde_json::from_str(
            r#"{"id":1,"franchise_id":null,"month":null,"revenue":null,"customers":null,"orders":null,"created_at":null}"#,
        )
        .unwrap();
        assert_eq!(metric.month, "");
        assert_eq!(metric.revenue, Decimal::ZERO);
        assert_eq!(metric.orders, 0);
    }

    #[test]
    fn test_decodes_numeric_revenue() {
        let metric: Metric = serde_json::from_str(
            r#"{"id":2,"franchise_id":"F-01","month":"2024-03-01","revenue":1520.5,"customers":40,"orders":52}"#,
        )
        .unwrap();
        assert_eq!(metric.revenue, Decimal::new(15205, 1));
        assert_eq!(metric.customers, 40);
    }
}
