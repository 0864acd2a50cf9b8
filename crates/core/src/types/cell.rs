//! Cell values of dynamically-shaped tabular rows.
//!
//! Imported datasets have no fixed schema: each row is an ordered map of
//! column name to a JSON scalar. [`CellValue`] is the typed view of one such
//! scalar, with the stringification rules used for searching, exporting and
//! displaying.

use core::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum characters shown for a text cell before it is truncated.
pub const DISPLAY_TRUNCATE_AT: usize = 100;

/// One cell of a tabular row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Missing or SQL NULL.
    #[default]
    Null,
    /// Boolean column.
    Bool(bool),
    /// Numeric column, kept in JSON form so integers print without a decimal point.
    Number(serde_json::Number),
    /// Anything else. Nested JSON is flattened to its text form.
    Text(String),
}

impl CellValue {
    /// Text used for case-insensitive search. Null is the empty string.
    #[must_use]
    pub fn search_text(&self) -> String {
        self.to_string()
    }

    /// Text written to an exported CSV field, before quoting.
    #[must_use]
    pub fn export_text(&self) -> String {
        self.to_string()
    }

    /// Text shown in a table cell.
    ///
    /// Booleans render as `Yes`/`No`, ISO-8601 timestamps as `dd/mm/yyyy`,
    /// and text longer than [`DISPLAY_TRUNCATE_AT`] characters is cut with an
    /// ellipsis.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "Yes".to_string(),
            Self::Bool(false) => "No".to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => {
                if let Some(date) = parse_iso_timestamp(s) {
                    return date;
                }
                truncate_chars(s, DISPLAY_TRUNCATE_AT)
            }
        }
    }

    /// True for null and for empty text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Numeric coercion: numbers as-is, text parsed as a float, anything
    /// else (including unparseable text) is `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Integer coercion: floats are truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Converts back to JSON for writing to the backend.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) => Value::Number(n),
            Self::Text(s) => Value::String(s),
        }
    }
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
        }
    }
}

impl From<Option<&Value>> for CellValue {
    fn from(value: Option<&Value>) -> Self {
        value.map_or(Self::Null, Self::from)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Cuts `s` to at most `max` characters, appending `...` when anything was cut.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", s.get(..idx).unwrap_or(s)),
        None => s.to_string(),
    }
}

/// Recognises `YYYY-MM-DDTHH:MM:SS...` and returns it as `dd/mm/yyyy`.
fn parse_iso_timestamp(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    if bytes.len() < 19 || bytes.get(10) != Some(&b'T') {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.format("%d/%m/%Y").to_string());
    }
    let head = s.get(..19)?;
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.format("%d/%m/%Y").to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_stringifies_empty() {
        let cell = CellValue::from(&Value::Null);
        assert_eq!(cell.search_text(), "");
        assert_eq!(cell.export_text(), "");
        assert_eq!(cell.display_text(), "");
        assert!(cell.is_blank());
    }

    #[test]
    fn test_numbers_keep_integer_form() {
        let cell = CellValue::from(&json!(42));
        assert_eq!(cell.export_text(), "42");
        let cell = CellValue::from(&json!(12.5));
        assert_eq!(cell.export_text(), "12.5");
    }

    #[test]
    fn test_booleans_display_yes_no() {
        assert_eq!(CellValue::Bool(true).display_text(), "Yes");
        assert_eq!(CellValue::Bool(false).display_text(), "No");
        assert_eq!(CellValue::Bool(true).export_text(), "true");
    }

    #[test]
    fn test_timestamps_display_as_dates() {
        let cell = CellValue::from("2024-03-05T10:20:30.123+00:00");
        assert_eq!(cell.display_text(), "05/03/2024");
        let cell = CellValue::from("2024-03-05T10:20:30");
        assert_eq!(cell.display_text(), "05/03/2024");
        // A plain date is left alone.
        let cell = CellValue::from("2024-03-05");
        assert_eq!(cell.display_text(), "2024-03-05");
    }

    #[test]
    fn test_long_text_truncated() {
        let long = "x".repeat(150);
        let shown = CellValue::from(long.as_str()).display_text();
        assert_eq!(shown.len(), 103);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_truncate_is_char_aware() {
        assert_eq!(truncate_chars("ÁÉÍÓÚ", 3), "ÁÉÍ...");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(CellValue::from(" 7 ").as_i64(), Some(7));
        assert_eq!(CellValue::from("7.9").as_i64(), Some(7));
        assert_eq!(CellValue::from("12.50").as_f64(), Some(12.5));
        assert_eq!(CellValue::from("abc").as_f64(), None);
        assert_eq!(CellValue::Null.as_i64(), None);
    }
}
