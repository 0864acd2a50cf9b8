//! Search, pagination and export over dynamic rows.

use chrono::NaiveDate;
use franchise_portal_core::CellValue;

use super::Row;
use super::csv::escape_field;

/// Rows per page.
pub const PAGE_SIZE: usize = 10;

/// Maximum page numbers shown at once.
pub const PAGE_WINDOW: usize = 5;

/// A column of a [`DataTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    /// Key in the row map.
    pub key: String,
    /// Header text: the key with underscores shown as spaces.
    pub label: String,
}

impl TableColumn {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            label: key.replace('_', " "),
        }
    }
}

/// A dynamically-shaped table.
///
/// Columns are the keys of the first row, in order; keys that only appear in
/// later rows are not shown. Rows are kept as loaded.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: Vec<TableColumn>,
    rows: Vec<Row>,
}

impl DataTable {
    /// Build a table from loaded rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|first| first.keys().map(|k| TableColumn::new(k)).collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    /// Drop `hidden` keys from the visible columns. Rows still keep them.
    #[must_use]
    pub fn hide_columns(mut self, hidden: &[&str]) -> Self {
        self.columns.retain(|c| !hidden.contains(&c.key.as_str()));
        self
    }

    #[must_use]
    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Number of rows before filtering.
    #[must_use]
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    /// Rows with any cell containing `query`, ignoring case.
    ///
    /// Every cell of the row is searched, including hidden columns. An empty
    /// query matches every row.
    pub fn filter<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a Row> + 'a {
        let needle = query.trim().to_lowercase();
        self.rows.iter().filter(move |row| {
            needle.is_empty()
                || row.values().any(|value| {
                    CellValue::from(value)
                        .search_text()
                        .to_lowercase()
                        .contains(&needle)
                })
        })
    }

    /// One page of the rows matching `query`. Pages are 1-based; out-of-range
    /// pages are clamped.
    #[must_use]
    pub fn page(&self, query: &str, page: usize) -> TablePage {
        let matching: Vec<&Row> = self.filter(query).collect();
        let filtered = matching.len();
        let total_pages = filtered.div_ceil(PAGE_SIZE).max(1);
        let page = page.clamp(1, total_pages);
        let start = (page - 1) * PAGE_SIZE;

        let rows = matching
            .into_iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| CellValue::from(row.get(&c.key)).display_text())
                    .collect()
            })
            .collect::<Vec<Vec<String>>>();

        TablePage {
            columns: self.columns.clone(),
            first_index: if rows.is_empty() { 0 } else { start + 1 },
            last_index: start + rows.len(),
            rows,
            page,
            total_pages,
            filtered,
            total: self.total(),
            page_numbers: page_window(page, total_pages),
        }
    }

    /// Export the rows matching `query` as CSV.
    ///
    /// One header line of visible column keys, then one line per row. Null
    /// cells are written as empty fields. Returns an empty string when nothing
    /// matches.
    #[must_use]
    pub fn to_csv(&self, query: &str) -> String {
        let mut rows = self.filter(query).peekable();
        if rows.peek().is_none() {
            return String::new();
        }

        let header = self
            .columns
            .iter()
            .map(|c| escape_field(&c.key))
            .collect::<Vec<_>>()
            .join(",");

        let mut out = header;
        for row in rows {
            out.push('\n');
            let line = self
                .columns
                .iter()
                .map(|c| escape_field(&CellValue::from(row.get(&c.key)).export_text()))
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&line);
        }
        out
    }
}

/// Up to [`PAGE_WINDOW`] consecutive page numbers around `page`.
fn page_window(page: usize, total_pages: usize) -> Vec<usize> {
    let span = PAGE_WINDOW.min(total_pages);
    let half = PAGE_WINDOW / 2;
    let start = if total_pages <= PAGE_WINDOW || page <= half + 1 {
        1
    } else if page + half >= total_pages {
        total_pages + 1 - span
    } else {
        page - half
    };
    (start..start + span).collect()
}

/// Download name for an export made on `today`: `datos_YYYY-MM-DD.csv`.
#[must_use]
pub fn export_file_name(today: NaiveDate) -> String {
    format!("datos_{}.csv", today.format("%Y-%m-%d"))
}

/// A rendered page of a [`DataTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePage {
    pub columns: Vec<TableColumn>,
    /// Display text of each visible cell.
    pub rows: Vec<Vec<String>>,
    /// Current page, 1-based.
    pub page: usize,
    pub total_pages: usize,
    /// Rows matching the search.
    pub filtered: usize,
    /// Rows before searching.
    pub total: usize,
    /// 1-based position of the first row shown (0 when empty).
    pub first_index: usize,
    /// 1-based position of the last row shown.
    pub last_index: usize,
    pub page_numbers: Vec<usize>,
}

impl TablePage {
    /// `"N of M records"`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} of {} records", self.filtered, self.total)
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    #[must_use]
    pub const fn previous_page(&self) -> usize {
        self.page.saturating_sub(1)
    }

    #[must_use]
    pub const fn next_page(&self) -> usize {
        self.page + 1
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tabular::csv::parse;

    fn rows(values: &[serde_json::Value]) -> Vec<Row> {
        values
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn numbered(n: usize) -> DataTable {
        let values: Vec<_> = (1..=n)
            .map(|i| json!({"id": i, "branch": format!("Branch {i}")}))
            .collect();
        DataTable::new(rows(&values))
    }

    #[test]
    fn test_columns_come_from_first_row() {
        let table = DataTable::new(rows(&[
            json!({"id": 1, "name": "Alice"}),
            json!({"id": 2, "name": "Bob", "extra": true}),
        ]));
        let keys: Vec<_> = table.columns().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn test_hidden_columns() {
        let table = DataTable::new(rows(&[json!({
            "id": 1,
            "branch_name": "Bilbao",
            "created_at": "2024-01-01T00:00:00Z"
        })]))
        .hide_columns(&["created_at", "updated_at"]);
        let labels: Vec<_> = table.columns().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["id", "branch name"]);
    }

    #[test]
    fn test_search_is_case_insensitive_over_all_cells() {
        let table = DataTable::new(rows(&[
            json!({"id": 1, "city": "Madrid"}),
            json!({"id": 2, "city": "Bilbao"}),
            json!({"id": 3, "city": null}),
        ]));
        assert_eq!(table.filter("MAD").count(), 1);
        assert_eq!(table.filter("2").count(), 1);
        assert_eq!(table.filter("").count(), 3);
        assert_eq!(table.filter("null").count(), 0);
    }

    #[test]
    fn test_filtered_count_summary() {
        let table = numbered(25);
        let page = table.page("Branch 1", 1);
        // Branch 1 and Branch 10..=19
        assert_eq!(page.summary(), "11 of 25 records");
    }

    #[test]
    fn test_pagination_and_clamping() {
        let table = numbered(25);
        let page = table.page("", 3);
        assert_eq!(page.rows.len(), 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!((page.first_index, page.last_index), (21, 25));
        assert!(!page.has_next());

        let clamped = table.page("", 99);
        assert_eq!(clamped.page, 3);
        let clamped = table.page("", 0);
        assert_eq!(clamped.page, 1);
        assert!(!clamped.has_previous());
    }

    #[test]
    fn test_empty_table_has_one_page() {
        let page = DataTable::new(Vec::new()).page("", 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.first_index, 0);
        assert!(page.rows.is_empty());
        assert_eq!(page.summary(), "0 of 0 records");
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 3), vec![1, 2, 3]);
        assert_eq!(page_window(1, 10), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_window(3, 10), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_window(6, 10), vec![4, 5, 6, 7, 8]);
        assert_eq!(page_window(9, 10), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_window(10, 10), vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_display_formatting() {
        let long = "x".repeat(120);
        let table = DataTable::new(rows(&[json!({
            "active": true,
            "created": "2024-03-05T10:00:00Z",
            "notes": long,
            "empty": null
        })]));
        let page = table.page("", 1);
        assert_eq!(page.rows[0][0], "Yes");
        assert_eq!(page.rows[0][1], "05/03/2024");
        assert_eq!(page.rows[0][2].chars().count(), 103);
        assert_eq!(page.rows[0][3], "");
    }

    #[test]
    fn test_export_filtered_rows() {
        let table = DataTable::new(rows(&[
            json!({"id": 1, "name": "Smith, J", "vip": false, "note": null}),
            json!({"id": 2, "name": "Said \"hi\"", "vip": true, "note": "ok"}),
            json!({"id": 3, "name": "Other", "vip": true, "note": "ok"}),
        ]));
        assert_eq!(
            table.to_csv("s"),
            "id,name,vip,note\n1,\"Smith, J\",false,\n2,\"Said \"\"hi\"\"\",true,ok"
        );
        assert_eq!(table.to_csv("nothing matches"), "");
    }

    #[test]
    fn test_export_reparses_to_filtered_rows() {
        let original = rows(&[
            json!({"id": "1", "name": "Smith, J", "city": "Bilbao"}),
            json!({"id": "2", "name": "Said \"hi\"", "city": ""}),
            json!({"id": "3", "name": "Bob", "city": "Madrid"}),
        ]);
        let table = DataTable::new(original.clone());

        let all = parse(&table.to_csv("")).unwrap();
        assert_eq!(all.headers, vec!["id", "name", "city"]);
        assert_eq!(all.rows, original);

        let subset = parse(&table.to_csv("s")).unwrap();
        assert_eq!(subset.rows, original[..2].to_vec());
    }

    #[test]
    fn test_export_reparses_null_as_empty() {
        let table = DataTable::new(rows(&[json!({"id": "1", "note": null})]));
        let parsed = parse(&table.to_csv("")).unwrap();
        assert_eq!(parsed.rows, rows(&[json!({"id": "1", "note": ""})]));
    }

    #[test]
    fn test_export_file_name() {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(export_file_name(day), "datos_2024-07-01.csv");
    }
}
