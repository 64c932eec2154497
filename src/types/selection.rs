//! Accepted values for a single filter column.

use super::Value;

use serde::{Deserialize, Serialize};

/// The wildcard value sent by the frontend when a dropdown has no choice made.
pub const ALL: &str = "All";

/// Accepted value(s) for one filter column in a request.
///
/// A single value keeps rows whose cell equals it, a list keeps rows whose cell is a member of
/// the list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    /// Single accepted value
    One(String),
    /// Any of several accepted values
    Many(Vec<String>),
}

impl Selection {
    /// Parse a selection from a raw query parameter.
    ///
    /// * `[..]` is parsed as a JSON array, with each element rendered as text. Invalid JSON
    ///   falls back to a single value.
    /// * A value containing commas is split and each part trimmed.
    /// * Anything else is a single value.
    ///
    /// Returns `None` for an empty parameter.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if raw.starts_with('[') && raw.ends_with(']') {
            return match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
                Ok(items) => Some(Selection::Many(items.iter().map(json_text).collect())),
                Err(_) => Some(Selection::One(raw.to_string())),
            };
        }
        if raw.contains(',') {
            return Some(Selection::Many(
                raw.split(',').map(|part| part.trim().to_string()).collect(),
            ));
        }
        Some(Selection::One(raw.to_string()))
    }

    /// Returns true if this selection restricts rows.
    ///
    /// The [ALL] wildcard, an empty value and an empty list restrict nothing.
    pub fn is_active(&self) -> bool {
        match self {
            Selection::One(value) => !value.is_empty() && value != ALL,
            Selection::Many(values) => !values.is_empty(),
        }
    }

    /// Accepted values as text.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Selection::One(value) => vec![value.as_str()],
            Selection::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Render a JSON array element as the text a cell would be compared with.
fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Number(number) => match number.as_f64() {
            Some(number) => Value::Number(number).to_string(),
            None => number.to_string(),
        },
        other => other.to_string(),
    }
}
