//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Formats a number with two decimals and thousands separators.
///
/// Values that are not numbers are passed through unchanged.
///
/// Usage in templates: `{{ report.total_revenue|amount }}`
#[askama::filter_fn]
pub fn amount(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format_amount(&value.to_string()))
}

fn format_amount(raw: &str) -> String {
    let Ok(number) = Decimal::from_str(raw.trim()) else {
        return raw.to_string();
    };
    let rounded = number.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("0"), "0.00");
        assert_eq!(format_amount("1234.5"), "1,234.50");
        assert_eq!(format_amount("1234567.891"), "1,234,567.89");
        assert_eq!(format_amount("-950.125"), "-950.13");
        assert_eq!(format_amount("n/a"), "n/a");
    }
}
