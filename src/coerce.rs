//! Per-column type coercion.
//!
//! Datasets carry no declared schema, so the dashboard pipelines coerce the columns they know
//! about: prices with thousands separators, percentage weights, and date columns from which a
//! year and month are derived.

use crate::error::DashboardError;
use crate::table::Table;
use crate::types::Value;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Date-time formats tried in order when parsing text.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Date formats tried in order when parsing text. Month-first is preferred for slashed dates.
const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Convert a cell to a number.
///
/// Text is parsed after removing every character in `strip` and surrounding whitespace.
/// Booleans are 1 or 0. Anything that cannot be converted is `None`.
pub fn to_number(value: &Value, strip: &[char]) -> Option<f64> {
    match value {
        Value::Number(number) => Some(*number),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Text(text) => {
            let cleaned: String = text.chars().filter(|c| !strip.contains(c)).collect();
            cleaned
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|number| !number.is_nan())
        }
        Value::Null | Value::Date(_) => None,
    }
}

/// Convert a cell to a date.
///
/// Text is tried against a set of common ISO, US and named-month formats.
pub fn to_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(date) => Some(*date),
        Value::Text(text) => {
            let text = text.trim();
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .or_else(|| {
                    DATE_FORMATS.iter().find_map(|format| {
                        NaiveDate::parse_from_str(text, format)
                            .ok()
                            .and_then(|date| date.and_hms_opt(0, 0, 0))
                    })
                })
        }
        _ => None,
    }
}

/// Coerce a column to numbers, replacing failures with `fill`.
///
/// # Arguments
///
/// * `table`: Table to modify
/// * `column`: Column name. Nothing happens if the table lacks it.
/// * `strip`: Characters removed from text before parsing
/// * `fill`: Value for cells that cannot be converted
pub fn numeric_column(
    table: &mut Table,
    column: &str,
    strip: &[char],
    fill: f64,
) -> Result<bool, DashboardError> {
    table.map_column(column, |value| {
        Value::Number(to_number(value, strip).unwrap_or(fill))
    })
}

/// Coerce a column of percentages (`"3.45%"`) to fractions (`0.0345`), replacing failures with
/// `fill`.
pub fn percent_column(table: &mut Table, column: &str, fill: f64) -> Result<bool, DashboardError> {
    table.map_column(column, |value| {
        Value::Number(to_number(value, &['%']).map_or(fill, |number| number / 100.0))
    })
}

/// Coerce a column to dates and derive year and month columns from it.
///
/// The year column holds the four-digit year as text and the month column the abbreviated
/// month name (`Jan`); both are empty text for cells that are not dates. Unparseable date cells
/// become [Value::Null].
///
/// Returns false, leaving the table untouched, if it lacks the date column.
pub fn date_parts(
    table: &mut Table,
    column: &str,
    year_column: &str,
    month_column: &str,
) -> Result<bool, DashboardError> {
    let Some(index) = table.column_index(column) else {
        return Ok(false);
    };
    let dates: Vec<Option<NaiveDateTime>> =
        table.column_values(index)?.iter().map(to_date).collect();
    let years = dates
        .iter()
        .map(|date| Value::Text(date.map(|d| d.year().to_string()).unwrap_or_default()))
        .collect();
    let months = dates
        .iter()
        .map(|date| {
            Value::Text(
                date.map(|d| d.format("%b").to_string())
                    .unwrap_or_default(),
            )
        })
        .collect();
    let parsed = dates
        .into_iter()
        .map(|date| date.map_or(Value::Null, Value::Date))
        .collect();
    table.set_column(column, parsed)?;
    table.set_column(year_column, years)?;
    table.set_column(month_column, months)?;
    Ok(true)
}

/// Round half to even at the given number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    let rounded = (value * scale).round_ties_even() / scale;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
