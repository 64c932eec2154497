//! Cell value representing a single entry of a [Table](crate::table::Table)

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// Format used when a date cell is rendered or serialised.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single cell of a dataset.
///
/// Cell types are inferred from the source: spreadsheets yield numbers, text, booleans and
/// dates, while the Google Sheets API yields text that is coerced per column later on.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Empty cell
    #[default]
    Null,
    /// Boolean cell
    Bool(bool),
    /// Numeric cell. Integers are stored as floating point, as a dataframe would.
    Number(f64),
    /// Date or date-time cell
    Date(NaiveDateTime),
    /// Text cell
    Text(String),
}

impl Value {
    /// Returns true if the cell is empty.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the numeric value of the cell, if it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Returns the text of the cell, if it holds text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Infer a cell from raw text, as read from a CSV file.
    ///
    /// Empty text is [Value::Null] and anything that parses as a finite number is a
    /// [Value::Number]. Everything else is kept as text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Value::Number(number),
            _ => Value::Text(raw.to_string()),
        }
    }

    /// Position of each variant in the total order.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::Date(_) => 3,
            Value::Text(_) => 4,
        }
    }
}

/// Cell text, matching the JSON a cell serialises to with strings unquoted.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(number) if *number == 0.0 => write!(f, "0"),
            Value::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                write!(f, "{:.0}", number)
            }
            Value::Number(number) => write!(f, "{}", number),
            Value::Date(date) => write!(f, "{}", date.format(DATETIME_FORMAT)),
            Value::Text(text) => write!(f, "{}", text),
        }
    }
}

// Numbers compare by IEEE total order so that values can be used as sorted map keys.

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            // Bit patterns are equal exactly when total_cmp reports equality.
            Value::Number(number) => number.to_bits().hash(state),
            Value::Date(date) => date.hash(state),
            Value::Text(text) => text.hash(state),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(number) if number.is_finite() => serializer.serialize_f64(*number),
            Value::Number(_) => serializer.serialize_none(),
            Value::Date(_) => serializer.collect_str(self),
            Value::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(date: NaiveDateTime) -> Self {
        Value::Date(date)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_infer() {
        assert_eq!(Value::Null, Value::infer(""));
        assert_eq!(Value::Null, Value::infer("   "));
        assert_eq!(Value::Number(42.0), Value::infer("42"));
        assert_eq!(Value::Number(-1.5), Value::infer(" -1.5 "));
        assert_eq!(Value::from("1,200"), Value::infer("1,200"));
        assert_eq!(Value::from("NaN"), Value::infer("NaN"));
    }

    #[test]
    fn test_display_integral_number() {
        assert_eq!("2021", Value::Number(2021.0).to_string());
        assert_eq!("2.5", Value::Number(2.5).to_string());
        assert_eq!("", Value::Null.to_string());
    }

    #[test]
    fn test_display_negative_zero() {
        assert_eq!("0", Value::Number(-0.0).to_string());
        assert_eq!("0", Value::Number(0.0).to_string());
    }

    #[test]
    fn test_display_date() {
        assert_eq!("2021-03-04T00:00:00", Value::Date(date(2021, 3, 4)).to_string());
        let with_time = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!("2021-03-04T10:30:00", Value::Date(with_time).to_string());
    }

    #[test]
    fn test_display_matches_json() {
        let values = vec![
            Value::Bool(true),
            Value::Number(2021.0),
            Value::Number(2.5),
            Value::Date(date(2021, 3, 4)),
            Value::from("Tech"),
        ];
        for value in values {
            let json = serde_json::to_value(&value).unwrap();
            let text = match json {
                serde_json::Value::String(text) => text,
                serde_json::Value::Number(number) => {
                    Value::Number(number.as_f64().unwrap()).to_string()
                }
                other => other.to_string(),
            };
            assert_eq!(text, value.to_string());
        }
    }

    #[test]
    fn test_total_order() {
        let mut values = vec![
            Value::from("b"),
            Value::Number(2.0),
            Value::Null,
            Value::from("a"),
            Value::Date(date(2020, 1, 1)),
            Value::Number(-1.0),
            Value::Bool(true),
        ];
        values.sort();
        assert_eq!(
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Number(-1.0),
                Value::Number(2.0),
                Value::Date(date(2020, 1, 1)),
                Value::from("a"),
                Value::from("b"),
            ],
            values
        );
    }

    #[test]
    fn test_serialize() {
        let values = vec![
            Value::Null,
            Value::Bool(false),
            Value::Number(1.5),
            Value::Number(f64::NAN),
            Value::Date(date(2022, 12, 31)),
            Value::from("x"),
        ];
        assert_eq!(
            r#"[null,false,1.5,null,"2022-12-31T00:00:00","x"]"#,
            serde_json::to_string(&values).unwrap()
        );
    }
}
