//! CSV reading for dataset uploads.
//!
//! Supported dialect: comma-delimited, fields optionally wrapped in double
//! quotes with `""` as an escaped quote, no embedded newlines. Blank lines are
//! skipped, the first remaining line is the header, and `\r\n` line endings
//! are accepted. Missing trailing fields read as the empty string; extra
//! fields beyond the header are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::Row;

/// Reasons an upload is not accepted as CSV.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsvError {
    #[error("Please select a .csv file (got \"{0}\")")]
    NotCsv(String),

    #[error("The file has no header row")]
    Empty,

    #[error("The header row is invalid: {0}")]
    BadHeader(String),

    #[error("The file is not valid UTF-8 text")]
    Encoding,
}

/// A parsed upload: header names and one row per data line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// Reject file names that do not end in `.csv` (case-insensitive).
///
/// # Errors
///
/// Returns `CsvError::NotCsv` otherwise.
pub fn check_file_name(name: &str) -> Result<(), CsvError> {
    let is_csv = name
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        Ok(())
    } else {
        Err(CsvError::NotCsv(name.to_string()))
    }
}

/// Decode uploaded bytes and parse them.
///
/// # Errors
///
/// Returns `CsvError::Encoding` for non-UTF-8 input, otherwise as [`parse`].
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedCsv, CsvError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CsvError::Encoding)?;
    parse(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Parse CSV text into rows keyed by header name.
///
/// # Errors
///
/// Returns `CsvError::Empty` when there is no non-blank line, and
/// `CsvError::BadHeader` when a header name is blank or repeated.
pub fn parse(text: &str) -> Result<ParsedCsv, CsvError> {
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty());

    let header_line = lines.next().ok_or(CsvError::Empty)?;
    let headers = split_line(header_line);

    for (i, header) in headers.iter().enumerate() {
        if header.is_empty() {
            return Err(CsvError::BadHeader(format!("column {} has no name", i + 1)));
        }
        if headers.iter().take(i).any(|earlier| earlier == header) {
            return Err(CsvError::BadHeader(format!("column \"{header}\" appears twice")));
        }
    }

    let rows = lines
        .map(|line| {
            let mut values = split_line(line).into_iter();
            headers
                .iter()
                .map(|header| {
                    let value = values.next().unwrap_or_default();
                    (header.clone(), Value::String(value))
                })
                .collect::<Row>()
        })
        .collect();

    Ok(ParsedCsv { headers, rows })
}

/// Split one line into trimmed fields, honouring quotes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Quote a field for CSV output when it contains a comma, quote or newline.
#[must_use]
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let parsed = parse("id,name\n1,Alice\n2,Bob").unwrap();
        assert_eq!(parsed.headers, vec!["id", "name"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1]["name"], "Bob");
    }

    #[test]
    fn test_quoted_fields_and_escaped_quotes() {
        let parsed = parse("id,comment\n1,\"Hello, \"\"world\"\"\"\n").unwrap();
        assert_eq!(parsed.rows[0]["comment"], "Hello, \"world\"");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let parsed = parse("\r\n id , name \r\n\r\n1,Alice\r\n   \r\n").unwrap();
        assert_eq!(parsed.headers, vec!["id", "name"]);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0]["name"], "Alice");
    }

    #[test]
    fn test_missing_trailing_values_are_empty() {
        let parsed = parse("a,b,c\n1").unwrap();
        let row = &parsed.rows[0];
        assert_eq!(row["a"], "1");
        assert_eq!(row["b"], "");
        assert_eq!(row["c"], "");
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_extra_values_are_ignored() {
        let parsed = parse("a\n1,2,3").unwrap();
        assert_eq!(parsed.rows[0].len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse(""), Err(CsvError::Empty));
        assert_eq!(parse("\n \r\n"), Err(CsvError::Empty));
    }

    #[test]
    fn test_header_only_has_no_rows() {
        let parsed = parse("id,name\n").unwrap();
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_bad_headers() {
        assert!(matches!(parse("id,,name\n1,2,3"), Err(CsvError::BadHeader(_))));
        assert!(matches!(parse("id,id\n1,2"), Err(CsvError::BadHeader(_))));
    }

    #[test]
    fn test_file_name_check() {
        assert!(check_file_name("bookings.csv").is_ok());
        assert!(check_file_name("BOOKINGS.CSV").is_ok());
        assert!(check_file_name("bookings.xlsx").is_err());
        assert!(check_file_name("csv").is_err());
        assert!(check_file_name(".csv").is_err());
    }

    #[test]
    fn test_parse_bytes_rejects_invalid_utf8_and_strips_bom() {
        assert_eq!(parse_bytes(&[0xff, 0xfe, 0x00]), Err(CsvError::Encoding));
        let parsed = parse_bytes("\u{feff}id\n1".as_bytes()).unwrap();
        assert_eq!(parsed.headers, vec!["id"]);
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
