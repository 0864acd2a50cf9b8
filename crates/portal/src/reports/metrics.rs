//! Monthly metrics table with derived columns.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::resources::Metric;

/// Months shown in the report.
pub const REPORT_MONTHS: usize = 12;

/// One month of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyRow {
    /// `March 2024`, or the raw value if it is not a date.
    pub month: String,
    pub franchise_id: String,
    pub revenue: Decimal,
    pub customers: i64,
    pub orders: i64,
    /// Revenue per order, two decimals. `None` without orders.
    pub average_order_value: Option<Decimal>,
    /// Revenue change against the previous month, percent with one decimal.
    /// `None` for the oldest month or when the previous revenue was zero.
    pub growth_percent: Option<Decimal>,
}

/// The latest months of metrics plus totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsReport {
    /// Newest first.
    pub rows: Vec<MonthlyRow>,
    pub total_revenue: Decimal,
    pub total_customers: i64,
    pub total_orders: i64,
}

impl MetricsReport {
    /// Build the report from metrics ordered newest first.
    #[must_use]
    pub fn build(metrics: &[Metric]) -> Self {
        let latest: Vec<&Metric> = metrics.iter().take(REPORT_MONTHS).collect();

        let rows = latest
            .iter()
            .enumerate()
            .map(|(i, metric)| {
                let previous = latest.get(i + 1).map(|m| m.revenue);
                MonthlyRow {
                    month: month_label(&metric.month),
                    franchise_id: metric.franchise_id.clone(),
                    revenue: metric.revenue,
                    customers: metric.customers,
                    orders: metric.orders,
                    average_order_value: average_order_value(metric.revenue, metric.orders),
                    growth_percent: previous.and_then(|p| growth_percent(metric.revenue, p)),
                }
            })
            .collect();

        Self {
            rows,
            total_revenue: latest.iter().map(|m| m.revenue).sum(),
            total_customers: latest.iter().map(|m| m.customers).sum(),
            total_orders: latest.iter().map(|m| m.orders).sum(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Revenue per order over the whole report.
    #[must_use]
    pub fn overall_average_order_value(&self) -> Option<Decimal> {
        average_order_value(self.total_revenue, self.total_orders)
    }
}

fn average_order_value(revenue: Decimal, orders: i64) -> Option<Decimal> {
    if orders <= 0 {
        return None;
    }
    revenue
        .checked_div(Decimal::from(orders))
        .map(|v| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

fn growth_percent(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    ((current - previous) * Decimal::ONE_HUNDRED)
        .checked_div(previous)
        .map(|v| v.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

/// Month names for report labels.
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// English name of month `month` (1-12).
#[must_use]
pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
        .and_then(|i| MONTH_NAMES.get(i))
        .copied()
        .unwrap_or("")
}

fn month_label(raw: &str) -> String {
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_or_else(
        |_| raw.to_string(),
        |d| format!("{} {}", month_name(d.month()), d.year()),
    )
}
