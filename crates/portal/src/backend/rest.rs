//! Relational store API (`rest/v1`, `PostgREST` dialect).

use serde::{Serialize, de::DeserializeOwned};
use tracing::instrument;
use url::Url;

use super::{AuthedClient, BackendError, check_status};

/// Sort direction for an ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A `select` against one table or view.
///
/// ```rust,ignore
/// let query = SelectQuery::table("news").order_by("created_at", Order::Desc);
/// let rows: Vec<NewsItem> = client.select(&query).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    table: String,
    columns: String,
    order: Vec<(String, Order)>,
    filters: Vec<(String, String)>,
    limit: Option<usize>,
}

impl SelectQuery {
    /// Select every column of `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            order: Vec::new(),
            filters: Vec::new(),
            limit: None,
        }
    }

    /// Restrict the returned columns (comma-separated).
    #[must_use]
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Append an ordering key. Earlier keys take precedence.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    /// Keep only rows where `column` equals `value`.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push((column.into(), value.to_string()));
        self
    }

    /// Return at most `limit` rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Target table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn apply(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("select", &self.columns);
        for (column, value) in &self.filters {
            pairs.append_pair(&quote_ident(column), &format!("eq.{value}"));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, dir)| format!("{}.{}", quote_ident(column), dir.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            pairs.append_pair("order", &order);
        }
        if let Some(limit) = self.limit {
            pairs.append_pair("limit", &limit.to_string());
        }
    }
}

/// Column names with spaces or non-ASCII letters must be double-quoted.
fn quote_ident(column: &str) -> String {
    if column
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        column.to_string()
    } else {
        format!("\"{}\"", column.replace('"', "\"\""))
    }
}

impl AuthedClient {
    fn table_url(&self, table: &str) -> Result<Url, BackendError> {
        self.backend().endpoint(&["rest", "v1", table])
    }

    /// Run a select and decode every returned row.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure, a non-success status, or
    /// rows that do not decode as `T`.
    #[instrument(skip(self), fields(table = %query.table))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &SelectQuery,
    ) -> Result<Vec<T>, BackendError> {
        let mut url = self.table_url(&query.table)?;
        query.apply(&mut url);

        let response = self
            .backend()
            .http()
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?;

        let body = check_status(response).await?.bytes().await?;
        let rows: Vec<T> = serde_json::from_slice(&body)?;
        tracing::debug!(rows = rows.len(), "select complete");
        Ok(rows)
    }

    /// Insert one row and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the insert is rejected.
    #[instrument(skip(self, row))]
    pub async fn insert<B, T>(&self, table: &str, row: &B) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .backend()
            .http()
            .post(self.table_url(table)?)
            .headers(self.headers()?)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        first_row(check_status(response).await?, table).await
    }

    /// Update the row with primary key `id` and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if no row matched (or policies hid it).
    #[instrument(skip(self, changes))]
    pub async fn update_by_id<B, T>(
        &self,
        table: &str,
        id: i64,
        changes: &B,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));

        let response = self
            .backend()
            .http()
            .patch(url)
            .headers(self.headers()?)
            .header("Prefer", "return=representation")
            .json(changes)
            .send()
            .await?;

        first_row(check_status(response).await?, table).await
    }

    /// Delete the row with primary key `id`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the delete is rejected.
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, table: &str, id: i64) -> Result<(), BackendError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));

        let response = self
            .backend()
            .http()
            .delete(url)
            .headers(self.headers()?)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Insert `row`, or merge it into the existing row sharing `on_conflict`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the write is rejected.
    #[instrument(skip(self, row))]
    pub async fn upsert<B>(
        &self,
        table: &str,
        on_conflict: &str,
        row: &B,
    ) -> Result<(), BackendError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);

        let response = self
            .backend()
            .http()
            .post(url)
            .headers(self.headers()?)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

async fn first_row<T: DeserializeOwned>(
    response: reqwest::Response,
    table: &str,
) -> Result<T, BackendError> {
    let body = response.bytes().await?;
    let rows: Vec<T> = serde_json::from_slice(&body)?;
    rows.into_iter()
        .next()
        .ok_or_else(|| BackendError::NotFound(format!("no row returned from {table}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query_of(query: &SelectQuery) -> Vec<(String, String)> {
        let mut url = Url::parse("https://demo.supabase.co/rest/v1/t").unwrap();
        query.apply(&mut url);
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_select_defaults_to_all_columns() {
        let pairs = query_of(&SelectQuery::table("news"));
        assert_eq!(pairs, vec![("select".to_string(), "*".to_string())]);
    }

    #[test]
    fn test_order_filter_and_limit() {
        let query = SelectQuery::table("profiles")
            .eq("id", "u-1")
            .order_by("created_at", Order::Desc)
            .limit(1);
        let pairs = query_of(&query);
        assert!(pairs.contains(&("id".to_string(), "eq.u-1".to_string())));
        assert!(pairs.contains(&("order".to_string(), "created_at.desc".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "1".to_string())));
    }

    #[test]
    fn test_multiple_order_keys_keep_precedence() {
        let query = SelectQuery::table("resumen_mensual_reservas")
            .order_by("Año", Order::Desc)
            .order_by("Mes", Order::Desc);
        let pairs = query_of(&query);
        assert!(pairs.contains(&("order".to_string(), "\"Año\".desc,Mes.desc".to_string())));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("created_at"), "created_at");
        assert_eq!(quote_ident("NOMBRE SUCURSAL"), "\"NOMBRE SUCURSAL\"");
    }
}
