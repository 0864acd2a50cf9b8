//! Resource stores.
//!
//! Each store wraps one backend table: it loads the table through the
//! resilient [`Collection`](crate::fetch::Collection) and exposes the write
//! operations the portal supports for it. Writes hit the backend first and
//! only touch the local rows once the backend accepted them.
//!
//! Stores are built per request from the signed-in user's client, so every
//! call runs under that user's row-level policies.

pub mod documents;
pub mod metrics;
pub mod news;

pub use documents::{DOCUMENTS_TABLE, Document, DocumentStore, Upload};
pub use metrics::{METRICS_TABLE, Metric, MetricsStore};
pub use news::{NEWS_TABLE, NewsDraft, NewsError, NewsItem, NewsStore};

use serde::{Deserialize, Deserializer};

/// Deserialize a nullable column, mapping `null` to the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
