//! Spreadsheet file parsing.
//!
//! Uploaded files are parsed entirely in memory. Workbooks (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`,
//! `.ods`) are read with calamine and CSV files with the csv crate. The first row of each sheet
//! is the header.

use crate::error::DashboardError;
use crate::table::Table;
use crate::types::Value;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::io::Cursor;

/// Supported upload formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FileFormat {
    /// Any workbook format calamine can detect
    Workbook,
    /// Comma-separated values
    Csv,
}

impl FileFormat {
    /// Determine the format of an upload from its file name.
    ///
    /// Files without a name or extension are assumed to be workbooks, as the dashboard uploads
    /// Excel files by default.
    pub fn from_file_name(file_name: Option<&str>) -> Result<Self, DashboardError> {
        let Some(file_name) = file_name else {
            return Ok(FileFormat::Workbook);
        };
        let extension = match file_name.rsplit_once('.') {
            Some((_, extension)) => extension.to_lowercase(),
            None => return Ok(FileFormat::Workbook),
        };
        match extension.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "xla" | "xlam" | "ods" => Ok(FileFormat::Workbook),
            "csv" => Ok(FileFormat::Csv),
            _ => Err(DashboardError::UnsupportedFileType {
                file_name: file_name.to_string(),
            }),
        }
    }
}

/// Name reported for the single sheet of a CSV file.
const CSV_SHEET_NAME: &str = "Sheet1";

/// List the sheet names of an uploaded file.
///
/// # Arguments
///
/// * `data`: File contents
/// * `format`: File format
pub fn sheet_names(data: &[u8], format: FileFormat) -> Result<Vec<String>, DashboardError> {
    match format {
        FileFormat::Workbook => {
            let workbook = open_workbook_auto_from_rs(Cursor::new(data))?;
            Ok(workbook.sheet_names())
        }
        FileFormat::Csv => Ok(vec![CSV_SHEET_NAME.to_string()]),
    }
}

/// Parse an uploaded file into a table.
///
/// For workbooks, if `sheet` is given only that sheet is read. Otherwise the first
/// `max_sheets` sheets are read and concatenated. CSV files have a single sheet and ignore
/// `sheet`.
///
/// # Arguments
///
/// * `data`: File contents
/// * `format`: File format
/// * `sheet`: Optional name of the sheet to read
/// * `max_sheets`: Maximum number of sheets to read when no sheet is named
pub fn read_table(
    data: &[u8],
    format: FileFormat,
    sheet: Option<&str>,
    max_sheets: usize,
) -> Result<Table, DashboardError> {
    match format {
        FileFormat::Workbook => read_workbook(data, sheet, max_sheets),
        FileFormat::Csv => read_csv(data),
    }
}

fn read_workbook(
    data: &[u8],
    sheet: Option<&str>,
    max_sheets: usize,
) -> Result<Table, DashboardError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))?;
    let available = workbook.sheet_names();
    let selected: Vec<String> = match sheet {
        Some(sheet) => {
            if !available.iter().any(|name| name == sheet) {
                return Err(DashboardError::SheetNotFound {
                    name: sheet.to_string(),
                });
            }
            vec![sheet.to_string()]
        }
        None => available.into_iter().take(max_sheets).collect(),
    };
    let mut tables = Vec::with_capacity(selected.len());
    for name in &selected {
        let range = workbook.worksheet_range(name)?;
        let mut rows = range.rows();
        let header = match rows.next() {
            Some(header) => header_names(header.iter().map(cell_to_value)),
            None => vec![],
        };
        let body = rows
            .map(|row| row.iter().map(cell_to_value).collect())
            .collect();
        tables.push(Table::from_rows(header, body)?);
    }
    match tables.len() {
        1 => Ok(tables.remove(0)),
        _ => Table::concat(&tables),
    }
}

fn read_csv(data: &[u8]) -> Result<Table, DashboardError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);
    let header = header_names(reader.headers()?.iter().map(Value::infer));
    let rows = reader
        .records()
        .map(|record| Ok(record?.iter().map(Value::infer).collect()))
        .collect::<Result<Vec<_>, DashboardError>>()?;
    Table::from_rows(header, rows)
}

/// Build column names from a header row.
///
/// Blank header cells are named `Unnamed: <i>`. Repeated names get `.1`, `.2`, ... suffixes.
pub(crate) fn header_names<I>(cells: I) -> Vec<String>
where
    I: Iterator<Item = Value>,
{
    let mut names: Vec<String> = vec![];
    for (i, cell) in cells.enumerate() {
        let base = match cell {
            Value::Null => format!("Unnamed: {}", i),
            other => other.to_string(),
        };
        let mut name = base.clone();
        let mut n = 1;
        while names.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}

/// Convert an Excel serial date (days since 1899-12-30) to a date-time.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    epoch.checked_add_signed(Duration::milliseconds(millis as i64))
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(dt) => {
            excel_serial_to_datetime(dt.as_f64()).map_or(Value::Null, Value::Date)
        }
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|date| date.and_time(chrono::NaiveTime::MIN))
            })
            .map_or_else(|_| Value::Text(s.clone()), Value::Date),
        Data::DurationIso(s) => Value::Text(s.clone()),
    }
}
