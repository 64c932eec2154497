//! In-memory tables.
//!
//! A [Table] wraps a polars [DataFrame] and converts between its typed columns and the [Value]
//! cells read from uploads and the Google Sheets API. Each column is stored with the narrowest
//! type that holds all of its cells: numbers as `Float64`, booleans as `Boolean`, dates as
//! millisecond `Datetime`, and anything mixed as `String` using the cell text.

use crate::error::DashboardError;
use crate::types::Value;

use chrono::DateTime;
use polars::prelude::*;

/// A JSON object describing a single row.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Data type used for date columns.
pub const DATETIME_TYPE: DataType = DataType::Datetime(TimeUnit::Milliseconds, None);

/// Named, typed columns of equal length.
#[derive(Clone, Debug)]
pub struct Table {
    frame: DataFrame,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            frame: DataFrame::empty(),
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns()
            && matches!((self.rows(), other.rows()), (Ok(a), Ok(b)) if a == b)
    }
}

impl From<DataFrame> for Table {
    fn from(frame: DataFrame) -> Self {
        Self { frame }
    }
}

/// Build a column from cells, choosing the narrowest type that holds every non-null cell.
pub fn to_series(name: &str, values: &[Value]) -> PolarsResult<Series> {
    let name = PlSmallStr::from(name);
    let uniform = |is_kind: fn(&Value) -> bool| values.iter().all(|v| v.is_null() || is_kind(v));
    let series = match values.iter().find(|value| !value.is_null()) {
        Some(Value::Number(_)) if uniform(|v| matches!(v, Value::Number(_))) => {
            let numbers: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
            Series::new(name, numbers)
        }
        Some(Value::Bool(_)) if uniform(|v| matches!(v, Value::Bool(_))) => {
            let flags: Vec<Option<bool>> = values
                .iter()
                .map(|value| match value {
                    Value::Bool(flag) => Some(*flag),
                    _ => None,
                })
                .collect();
            Series::new(name, flags)
        }
        Some(Value::Date(_)) if uniform(|v| matches!(v, Value::Date(_))) => {
            let millis: Vec<Option<i64>> = values
                .iter()
                .map(|value| match value {
                    Value::Date(date) => Some(date.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect();
            Series::new(name, millis).cast(&DATETIME_TYPE)?
        }
        _ => {
            let texts: Vec<Option<String>> = values
                .iter()
                .map(|value| match value {
                    Value::Null => None,
                    Value::Text(text) => Some(text.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            Series::new(name, texts)
        }
    };
    Ok(series)
}

/// Convert a single dataframe cell.
fn from_any(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(flag) => Value::Bool(flag),
        AnyValue::Int8(v) => Value::Number(v.into()),
        AnyValue::Int16(v) => Value::Number(v.into()),
        AnyValue::Int32(v) => Value::Number(v.into()),
        AnyValue::Int64(v) => Value::Number(v as f64),
        AnyValue::UInt8(v) => Value::Number(v.into()),
        AnyValue::UInt16(v) => Value::Number(v.into()),
        AnyValue::UInt32(v) => Value::Number(v.into()),
        AnyValue::UInt64(v) => Value::Number(v as f64),
        AnyValue::Float32(v) => Value::Number(v.into()),
        AnyValue::Float64(v) => Value::Number(v),
        AnyValue::String(text) => Value::Text(text.to_string()),
        AnyValue::StringOwned(text) => Value::Text(text.to_string()),
        AnyValue::Datetime(timestamp, unit, _) => {
            let date = match unit {
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(timestamp),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(timestamp),
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(timestamp)),
            };
            date.map_or(Value::Null, |date| Value::Date(date.naive_utc()))
        }
        other => Value::Text(other.to_string()),
    }
}

impl Table {
    /// Returns a table with the given columns and rows.
    ///
    /// Rows shorter than the header are padded with [Value::Null], longer rows are truncated.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, DashboardError> {
        let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); columns.len()];
        for mut row in rows {
            row.resize(columns.len(), Value::Null);
            for (column, value) in cells.iter_mut().zip(row) {
                column.push(value);
            }
        }
        let series = columns
            .iter()
            .zip(&cells)
            .map(|(name, values)| to_series(name, values).map(Column::from))
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(Self {
            frame: DataFrame::new(series)?,
        })
    }

    /// The underlying dataframe.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Column names in order.
    pub fn columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.frame.get_column_index(name)
    }

    /// Returns true if the table has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column that an operation cannot do without.
    pub fn require_column(&self, name: &str) -> Result<usize, DashboardError> {
        self.column_index(name)
            .ok_or_else(|| DashboardError::ColumnNotFound {
                column: name.to_string(),
            })
    }

    /// Data type of a column.
    pub fn dtype(&self, name: &str) -> Option<&DataType> {
        self.frame.column(name).ok().map(Column::dtype)
    }

    /// Values of a column.
    ///
    /// # Arguments
    ///
    /// * `index`: Column index, as returned by [Table::column_index]
    pub fn column_values(&self, index: usize) -> Result<Vec<Value>, DashboardError> {
        let column = &self.frame.get_columns()[index];
        (0..column.len())
            .map(|row| Ok(from_any(column.get(row)?)))
            .collect()
    }

    /// Rows in order.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>, DashboardError> {
        let mut rows = vec![Vec::with_capacity(self.frame.width()); self.len()];
        for index in 0..self.frame.width() {
            for (row, value) in rows.iter_mut().zip(self.column_values(index)?) {
                row.push(value);
            }
        }
        Ok(rows)
    }

    /// Returns a new table holding the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Result<Table, DashboardError> {
        let indices: Vec<IdxSize> = rows.iter().map(|&row| row as IdxSize).collect();
        let indices = IdxCa::from_vec("rows".into(), indices);
        Ok(self.frame.take(&indices)?.into())
    }

    /// Returns a new table holding the rows for which `predicate` is true.
    pub fn filter(&self, predicate: Expr) -> Result<Table, DashboardError> {
        Ok(self.frame.clone().lazy().filter(predicate).collect()?.into())
    }

    /// Returns a new table holding only the named columns, in the given order.
    pub fn select(&self, columns: &[&str]) -> Result<Table, DashboardError> {
        for column in columns {
            self.require_column(column)?;
        }
        Ok(self.frame.select(columns.iter().copied())?.into())
    }

    /// Concatenate tables vertically.
    ///
    /// The result has the union of all columns in first-seen order. Cells for columns that a
    /// table lacks are null, and a column whose type differs between tables is widened.
    pub fn concat<'a, I>(tables: I) -> Result<Table, DashboardError>
    where
        I: IntoIterator<Item = &'a Table>,
    {
        let frames: Vec<LazyFrame> = tables
            .into_iter()
            .map(|table| table.frame.clone().lazy())
            .collect();
        if frames.is_empty() {
            return Ok(Table::default());
        }
        let args = UnionArgs {
            to_supertypes: true,
            ..Default::default()
        };
        Ok(concat_lf_diagonal(frames, args)?.collect()?.into())
    }

    /// Rename a column. Returns false if there is no such column.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<bool, DashboardError> {
        if !self.has_column(from) {
            return Ok(false);
        }
        self.frame.rename(from, to.into())?;
        Ok(true)
    }

    /// Convert all column names to lower case.
    pub fn lowercase_columns(&mut self) -> Result<(), DashboardError> {
        let names: Vec<String> = self
            .columns()
            .iter()
            .map(|column| column.to_lowercase())
            .collect();
        self.frame.set_column_names(names)?;
        Ok(())
    }

    /// Replace each value of a column with the result of `f`. Returns false if there is no such
    /// column.
    pub fn map_column<F>(&mut self, name: &str, f: F) -> Result<bool, DashboardError>
    where
        F: FnMut(&Value) -> Value,
    {
        let Some(index) = self.column_index(name) else {
            return Ok(false);
        };
        let values: Vec<Value> = self.column_values(index)?.iter().map(f).collect();
        self.set_column(name, values)?;
        Ok(true)
    }

    /// Add a column, or replace it if one with the same name exists.
    ///
    /// `values` must hold one value per row.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), DashboardError> {
        self.frame.with_column(to_series(name, &values)?)?;
        Ok(())
    }

    /// Sorted distinct non-null values of a column.
    pub fn distinct(&self, name: &str) -> Result<Vec<Value>, DashboardError> {
        let distinct = self
            .frame
            .clone()
            .lazy()
            .select([col(name).drop_nulls().unique().sort(SortOptions::default())])
            .collect()?;
        Table::from(distinct).column_values(0)
    }

    /// Convert rows to JSON objects keyed by column name.
    pub fn to_records(&self) -> Result<Vec<Record>, DashboardError> {
        let columns = self.columns();
        Ok(self
            .rows()?
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| {
                        (
                            column.clone(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    use chrono::NaiveDate;

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|column| column.to_string()).collect()
    }

    #[test]
    fn test_from_rows_pads_and_truncates() {
        let table = Table::from_rows(
            names(&["a", "b"]),
            vec![
                vec![Value::from(1.0)],
                vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)],
            ],
        )
        .unwrap();
        assert_eq!(
            vec![
                vec![Value::from(1.0), Value::Null],
                vec![Value::from(1.0), Value::from(2.0)]
            ],
            table.rows().unwrap()
        );
    }

    #[test]
    fn test_column_types() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let table = Table::from_rows(
            names(&["number", "flag", "date", "mixed", "empty"]),
            vec![
                vec![
                    Value::from(1.0),
                    Value::Bool(true),
                    Value::Date(date),
                    Value::from(2.0),
                    Value::Null,
                ],
                vec![
                    Value::Null,
                    Value::Bool(false),
                    Value::Null,
                    Value::from("x"),
                    Value::Null,
                ],
            ],
        )
        .unwrap();
        assert_eq!(Some(&DataType::Float64), table.dtype("number"));
        assert_eq!(Some(&DataType::Boolean), table.dtype("flag"));
        assert_eq!(Some(&DATETIME_TYPE), table.dtype("date"));
        assert_eq!(Some(&DataType::String), table.dtype("mixed"));
        assert_eq!(Some(&DataType::String), table.dtype("empty"));
        assert_eq!(
            vec![
                Value::from(1.0),
                Value::Bool(true),
                Value::Date(date),
                Value::from("2"),
                Value::Null
            ],
            table.rows().unwrap()[0]
        );
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        assert!(Table::from_rows(names(&["a", "a"]), vec![]).is_err());
    }

    #[test]
    fn test_require_column() {
        let table = test_utils::get_test_sales_table();
        assert_eq!(0, table.require_column("Category").unwrap());
        match table.require_column("Nope") {
            Err(DashboardError::ColumnNotFound { column }) => assert_eq!("Nope", column),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_take_filter_and_select() {
        let table = test_utils::get_test_sales_table();
        let taken = table.take(&[2, 0]).unwrap();
        assert_eq!(2, taken.len());
        assert_eq!(table.rows().unwrap()[2], taken.rows().unwrap()[0]);
        let selected = taken.select(&["Value", "Item"]).unwrap();
        assert_eq!(vec!["Value", "Item"], selected.columns());
        assert_eq!(table.rows().unwrap()[2][3], selected.rows().unwrap()[0][0]);
        assert!(table.select(&["Nope"]).is_err());
        let large = table.filter(col("Value").gt(lit(8.0))).unwrap();
        assert_eq!(2, large.len());
    }

    #[test]
    fn test_concat_column_union() {
        let left = Table::from_rows(
            names(&["a", "b"]),
            vec![vec![Value::from(1.0), Value::from(2.0)]],
        )
        .unwrap();
        let right = Table::from_rows(
            names(&["b", "c"]),
            vec![vec![Value::from(3.0), Value::from(4.0)]],
        )
        .unwrap();
        let result = Table::concat([&left, &right]).unwrap();
        assert_eq!(vec!["a", "b", "c"], result.columns());
        assert_eq!(
            vec![
                vec![Value::from(1.0), Value::from(2.0), Value::Null],
                vec![Value::Null, Value::from(3.0), Value::from(4.0)],
            ],
            result.rows().unwrap()
        );
        assert!(Table::concat([]).unwrap().is_empty());
    }

    #[test]
    fn test_rename_and_lowercase() {
        let mut table = test_utils::get_test_sales_table();
        assert!(table.rename_column("Value", "Amount").unwrap());
        assert!(!table.rename_column("Value", "Amount").unwrap());
        table.lowercase_columns().unwrap();
        assert_eq!(
            vec!["category", "subcategory", "item", "amount"],
            table.columns()
        );
    }

    #[test]
    fn test_map_and_set_column() {
        let mut table = test_utils::get_test_sales_table();
        assert!(table
            .map_column("Value", |value| {
                Value::from(value.as_f64().unwrap_or_default() * 2.0)
            })
            .unwrap());
        assert_eq!(Value::from(20.0), table.rows().unwrap()[0][3]);
        let flags = vec![Value::Bool(true); table.len()];
        table.set_column("Flag", flags).unwrap();
        assert_eq!(Some(4), table.column_index("Flag"));
        let replaced = vec![Value::Null; table.len()];
        table.set_column("Value", replaced).unwrap();
        assert_eq!(5, table.columns().len());
        assert!(table.rows().unwrap()[0][3].is_null());
        assert!(!table.map_column("Nope", Value::clone).unwrap());
    }

    #[test]
    fn test_distinct_sorted_without_nulls() {
        let mut rows = test_utils::get_test_sales_table().rows().unwrap();
        rows.push(vec![Value::Null]);
        let table =
            Table::from_rows(names(&["Category", "SubCategory", "Item", "Value"]), rows).unwrap();
        assert_eq!(
            vec![Value::from("Clothing"), Value::from("Electronics")],
            table.distinct("Category").unwrap()
        );
        assert_eq!(
            [3.0, 5.0, 7.0, 10.0, 20.0].map(Value::from).to_vec(),
            table.distinct("Value").unwrap()
        );
    }

    #[test]
    fn test_to_records() {
        let table = test_utils::get_test_sales_table()
            .select(&["Item", "Value"])
            .unwrap();
        let records = table.to_records().unwrap();
        assert_eq!(table.len(), records.len());
        assert_eq!(
            serde_json::json!({"Item": "Phone", "Value": 10.0}),
            serde_json::Value::Object(records[0].clone())
        );
    }
}
