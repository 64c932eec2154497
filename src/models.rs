//! Request and response types and associated functions and methods

use crate::dataset_store::DatasetSummary;
use crate::error::DashboardError;
use crate::filter::FilterConfig;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

/// Filter configuration as posted by the frontend.
///
/// The frontend sends the configuration JSON-encoded as a string, but a plain array is also
/// accepted.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterConfigPayload {
    /// JSON array of filter descriptors
    Decoded(FilterConfig),
    /// JSON-encoded array of filter descriptors
    Encoded(String),
}

/// Request data for `/set-filter-config`
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SetFilterConfigRequest {
    #[serde(rename = "filterConfig")]
    pub filter_config: FilterConfigPayload,
}

impl SetFilterConfigRequest {
    /// Decode and validate the filter configuration.
    pub fn into_config(self) -> Result<FilterConfig, DashboardError> {
        let config = match self.filter_config {
            FilterConfigPayload::Decoded(config) => config,
            FilterConfigPayload::Encoded(encoded) => serde_json::from_str(&encoded)?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Validate for SetFilterConfigRequest {
    /// Validate an already decoded configuration. Encoded configurations are validated by
    /// [SetFilterConfigRequest::into_config].
    fn validate(&self) -> Result<(), ValidationErrors> {
        match &self.filter_config {
            FilterConfigPayload::Decoded(config) => config.validate(),
            FilterConfigPayload::Encoded(_) => Ok(()),
        }
    }
}

/// Form data identifying a Google Sheet
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
pub struct SheetUrlForm {
    /// Spreadsheet URL as shown in the browser
    #[validate(length(min = 1, message = "sheet_url must not be empty"))]
    pub sheet_url: String,
    /// OAuth access token
    #[validate(length(min = 1, message = "auth_token must not be empty"))]
    pub auth_token: String,
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_sheet_index() -> usize {
    1
}

/// Form data for `/process-google-sheet`
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
pub struct ProcessSheetForm {
    /// Spreadsheet URL as shown in the browser
    #[validate(length(min = 1, message = "sheet_url must not be empty"))]
    pub sheet_url: String,
    /// OAuth access token
    #[validate(length(min = 1, message = "auth_token must not be empty"))]
    pub auth_token: String,
    /// Sheet to read
    #[serde(default = "default_sheet_name")]
    #[validate(length(min = 1, message = "sheet_name must not be empty"))]
    pub sheet_name: String,
    /// Dataset index; the sheet is stored as `googlesheet<sheet_index>`
    #[serde(default = "default_sheet_index")]
    #[validate(range(min = 1, message = "sheet_index must be at least 1"))]
    pub sheet_index: usize,
}

/// Form data for `/clear-dataset`
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
pub struct ClearDatasetForm {
    #[validate(length(min = 1, message = "dataset_name must not be empty"))]
    pub dataset_name: String,
}

/// Successful response envelope.
///
/// Serialises as the body's fields plus `"success": true`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Success<T> {
    /// Wrap a response body.
    pub fn new(body: T) -> Self {
        Self {
            success: true,
            body,
        }
    }
}

/// Response body carrying a human readable message.
#[derive(Debug, PartialEq, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body of `/get-filter-config`
#[derive(Debug, Serialize)]
pub struct FilterConfigBody {
    pub filter_config: FilterConfig,
}

/// Response body listing sheet names
#[derive(Debug, Serialize)]
pub struct SheetNames {
    pub sheet_names: Vec<String>,
}

/// Response body of `/process-google-sheet`
#[derive(Debug, Serialize)]
pub struct ProcessedSheet {
    pub message: String,
    pub dataset_name: String,
}

/// Response body of `/datasets`
#[derive(Debug, Serialize)]
pub struct Datasets {
    pub datasets: Vec<DatasetSummary>,
}
