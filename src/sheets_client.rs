//! Google Sheets API client.
//!
//! Spreadsheets are read with the caller's OAuth bearer token. Sheet values are fetched in
//! pages that stay below the API's per-request cell limit.

use crate::error::DashboardError;
use crate::ingest::header_names;
use crate::resource_manager::ResourceManager;
use crate::table::Table;
use crate::types::Value;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// Maximum number of cells requested per values request.
const MAX_CELLS_PER_REQUEST: usize = 500_000;

/// Rows per request when the cell limit would allow none.
const FALLBACK_ROWS_PER_REQUEST: usize = 1000;

/// Row count assumed when the sheet does not report its grid size.
const DEFAULT_ROW_COUNT: usize = 1_000_000;

/// Column count assumed when the sheet does not report its grid size.
const DEFAULT_COLUMN_COUNT: usize = 26;

/// Spreadsheet metadata.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    /// Sheets in display order
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

/// A single sheet of a spreadsheet.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Sheet {
    pub properties: SheetProperties,
}

/// Sheet properties.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    /// Sheet name
    pub title: String,
    /// Grid size, if the sheet is a grid
    #[serde(default)]
    pub grid_properties: Option<GridProperties>,
}

/// Size of a sheet's grid.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    pub row_count: Option<usize>,
    pub column_count: Option<usize>,
}

/// Values of a cell range, row by row.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ValueRange {
    /// Rows of cells. Trailing empty rows and cells are omitted by the API.
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Google API error body.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Google Sheets API trait.
///
/// Defines the two read operations needed to ingest a sheet.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Fetch spreadsheet metadata.
    ///
    /// # Arguments
    ///
    /// * `spreadsheet_id`: Spreadsheet identifier
    /// * `token`: OAuth bearer token
    async fn spreadsheet(
        &self,
        spreadsheet_id: &str,
        token: &str,
    ) -> Result<Spreadsheet, DashboardError>;

    /// Fetch the values of an A1 range.
    ///
    /// # Arguments
    ///
    /// * `spreadsheet_id`: Spreadsheet identifier
    /// * `range`: A1 notation range, including the sheet name
    /// * `token`: OAuth bearer token
    async fn values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        token: &str,
    ) -> Result<ValueRange, DashboardError>;
}

/// HTTP client for the Google Sheets REST API.
///
/// Implements [SheetsApi] with reqwest.
#[derive(Debug)]
pub struct GoogleSheetsClient {
    reqwest_client: reqwest::Client,
    base_url: Url,
}

impl GoogleSheetsClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url`: API base URL, e.g. `https://sheets.googleapis.com/v4/`
    pub fn new(base_url: Url) -> Self {
        Self {
            reqwest_client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Build an API URL from path segments below the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, DashboardError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DashboardError::InvalidSheetUrl)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and deserialise a successful JSON response.
    async fn get_json<T>(&self, url: Url, token: &str) -> Result<T, DashboardError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .reqwest_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|body| body.error.message)
                .unwrap_or(body);
            return Err(DashboardError::SheetsApiStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    #[tracing::instrument(level = "DEBUG", skip(self, token))]
    async fn spreadsheet(
        &self,
        spreadsheet_id: &str,
        token: &str,
    ) -> Result<Spreadsheet, DashboardError> {
        let mut url = self.url(&["spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(title,gridProperties)");
        self.get_json(url, token).await
    }

    #[tracing::instrument(level = "DEBUG", skip(self, token))]
    async fn values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        token: &str,
    ) -> Result<ValueRange, DashboardError> {
        let url = self.url(&["spreadsheets", spreadsheet_id, "values", range])?;
        self.get_json(url, token).await
    }
}

/// Extract the spreadsheet identifier from a Google Sheets URL.
///
/// The identifier is the path segment following `/spreadsheets/d/`.
pub fn spreadsheet_id(sheet_url: &str) -> Result<String, DashboardError> {
    let url = Url::parse(sheet_url).map_err(|_| DashboardError::InvalidSheetUrl)?;
    let segments: Vec<&str> = url
        .path_segments()
        .ok_or(DashboardError::InvalidSheetUrl)?
        .collect();
    segments
        .windows(3)
        .find(|window| window[0] == "spreadsheets" && window[1] == "d" && !window[2].is_empty())
        .map(|window| window[2].to_string())
        .ok_or(DashboardError::InvalidSheetUrl)
}

/// Quote a sheet name for use in an A1 range if it contains anything other than letters,
/// digits and underscores.
fn quote_sheet_name(sheet_name: &str) -> String {
    if !sheet_name.is_empty()
        && sheet_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        sheet_name.to_string()
    } else {
        format!("'{}'", sheet_name.replace('\'', "''"))
    }
}

/// A1 ranges covering a sheet in pages.
///
/// # Arguments
///
/// * `sheet_name`: Sheet name
/// * `grid`: Reported grid size, if any
pub fn page_ranges(sheet_name: &str, grid: Option<GridProperties>) -> Vec<String> {
    let grid = grid.unwrap_or_default();
    let row_count = grid.row_count.unwrap_or(DEFAULT_ROW_COUNT);
    let column_count = grid
        .column_count
        .filter(|count| *count > 0)
        .unwrap_or(DEFAULT_COLUMN_COUNT);
    let mut rows_per_request = row_count.min(MAX_CELLS_PER_REQUEST / column_count);
    if rows_per_request == 0 {
        rows_per_request = FALLBACK_ROWS_PER_REQUEST;
    }
    let sheet_name = quote_sheet_name(sheet_name);
    (0..row_count)
        .step_by(rows_per_request)
        .map(|start| {
            let end = (start + rows_per_request).min(row_count);
            format!("{}!A{}:Z{}", sheet_name, start + 1, end)
        })
        .collect()
}

/// Convert a cell returned by the API.
fn json_to_value(cell: &serde_json::Value) -> Value {
    match cell {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
        serde_json::Value::String(s) if s.is_empty() => Value::Null,
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// List the sheet names of a spreadsheet.
///
/// # Arguments
///
/// * `api`: Sheets API implementation
/// * `resource_manager`: ResourceManager object
/// * `spreadsheet_id`: Spreadsheet identifier
/// * `token`: OAuth bearer token
#[tracing::instrument(level = "DEBUG", skip(api, resource_manager, token))]
pub async fn sheet_names(
    api: &dyn SheetsApi,
    resource_manager: &ResourceManager,
    spreadsheet_id: &str,
    token: &str,
) -> Result<Vec<String>, DashboardError> {
    let _conn_permits = resource_manager.sheets_connection().await?;
    let spreadsheet = api.spreadsheet(spreadsheet_id, token).await?;
    Ok(spreadsheet
        .sheets
        .into_iter()
        .map(|sheet| sheet.properties.title)
        .collect())
}

/// Fetch a whole sheet as a table.
///
/// The grid size is taken from the sheet with the given name, or from the first sheet if none
/// matches. The first non-empty page supplies the header row.
///
/// # Arguments
///
/// * `api`: Sheets API implementation
/// * `resource_manager`: ResourceManager object
/// * `spreadsheet_id`: Spreadsheet identifier
/// * `sheet_name`: Name of the sheet to read
/// * `token`: OAuth bearer token
#[tracing::instrument(level = "DEBUG", skip(api, resource_manager, token))]
pub async fn fetch_sheet(
    api: &dyn SheetsApi,
    resource_manager: &ResourceManager,
    spreadsheet_id: &str,
    sheet_name: &str,
    token: &str,
) -> Result<Table, DashboardError> {
    let spreadsheet = {
        let _conn_permits = resource_manager.sheets_connection().await?;
        api.spreadsheet(spreadsheet_id, token).await?
    };
    let grid = spreadsheet
        .sheets
        .iter()
        .find(|sheet| sheet.properties.title == sheet_name)
        .or_else(|| spreadsheet.sheets.first())
        .and_then(|sheet| sheet.properties.grid_properties);

    let mut header: Option<Vec<String>> = None;
    let mut body: Vec<Vec<Value>> = vec![];
    for range in page_ranges(sheet_name, grid) {
        let value_range = {
            let _conn_permits = resource_manager.sheets_connection().await?;
            api.values(spreadsheet_id, &range, token).await?
        };
        let mut rows = value_range.values.iter();
        if header.is_none() {
            match rows.next() {
                Some(first) => header = Some(header_names(first.iter().map(json_to_value))),
                None => continue,
            }
        }
        body.extend(rows.map(|row| row.iter().map(json_to_value).collect()));
    }
    match header {
        Some(header) => Table::from_rows(header, body),
        None => Ok(Table::default()),
    }
}
