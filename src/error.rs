//! Error handling.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{FormRejection, JsonRejection},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

/// Dashboard server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant is classified as a client or server error, which determines how it is logged.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Background parsing task panicked or was cancelled
    #[error("background task failed")]
    BackgroundTask(#[from] tokio::task::JoinError),

    /// Column required by an operation is missing from a dataset
    #[error("column {column} not found")]
    ColumnNotFound { column: String },

    /// Error reading a CSV upload
    #[error("failed to read CSV file")]
    Csv(#[from] csv::Error),

    /// Dataset requested by name is not stored
    #[error("Dataset {name} not found")]
    DatasetNotFound { name: String },

    /// One or more datasets needed by a dashboard pipeline are not stored
    #[error("{names} data not available")]
    DatasetsUnavailable { names: String },

    /// Upload request carried no files
    #[error("no files provided")]
    EmptyUpload,

    /// Filter configuration is not valid JSON
    #[error("filter config is not valid JSON")]
    FilterConfigJson(#[from] serde_json::Error),

    /// Insufficient memory to process request
    #[error("Insufficient memory to process request ({requested} > {total})")]
    InsufficientMemory { requested: usize, total: usize },

    /// Spreadsheet URL does not identify a Google Sheet
    #[error("Invalid Google Sheet URL")]
    InvalidSheetUrl,

    /// Error reading a multipart upload
    #[error("upload is not valid")]
    Multipart(#[from] MultipartError),

    /// Error evaluating a dataframe operation
    #[error("dataframe operation failed")]
    Polars(#[from] polars::error::PolarsError),

    /// Operation requires at least one stored dataset
    #[error("No datasets available. Please upload files or provide a Google Sheet URL.")]
    NoDatasets,

    /// Error deserialising form request data
    #[error("request data is not valid")]
    RequestDataFormRejection(#[from] FormRejection),

    /// Error deserialising JSON request data
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Request is not a multipart upload
    #[error("request data is not valid")]
    RequestDataMultipartRejection(#[from] MultipartRejection),

    /// Error validating request data (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error validating request data (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Named sheet is not present in a workbook or spreadsheet
    #[error("sheet {name} not found")]
    SheetNotFound { name: String },

    /// Error sending a request to the Google Sheets API
    #[error("error calling Google Sheets API")]
    SheetsApi(#[from] reqwest::Error),

    /// Google Sheets API returned an unsuccessful status
    #[error("Google Sheets API request failed with status {status}: {message}")]
    SheetsApiStatus { status: u16, message: String },

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Filter declares a dependency on an id that is not configured
    #[error("filter {filter} depends on unknown filter {dependency}")]
    UnknownFilterDependency { filter: String, dependency: String },

    /// Uploaded file is not a supported spreadsheet format
    #[error("unsupported file type {file_name}")]
    UnsupportedFileType { file_name: String },

    /// Error reading a workbook upload
    #[error("failed to read workbook")]
    Workbook(#[from] calamine::Error),
}

impl DashboardError {
    /// Returns true if the error is caused by the server or an upstream service rather than the
    /// request.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            DashboardError::BackgroundTask(_)
                | DashboardError::Polars(_)
                | DashboardError::SemaphoreAcquireError(_)
                | DashboardError::SheetsApi(_)
                | DashboardError::TryFromInt(_)
        ) || matches!(self, DashboardError::SheetsApiStatus { status, .. } if *status >= 500)
    }
}

impl IntoResponse for DashboardError {
    /// Convert from a `DashboardError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// The dashboard frontend inspects `success` rather than the HTTP status, so every error is
/// returned with a 200 status.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// Always false
    success: bool,

    /// Main error message
    error: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorResponse {
            success: false,
            error: message,
            caused_by,
        }
    }
}

impl From<DashboardError> for ErrorResponse {
    /// Convert from a `DashboardError` into an `ErrorResponse`.
    fn from(error: DashboardError) -> Self {
        // Log server errors.
        if error.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        } else {
            event!(Level::DEBUG, "request failed: {}", error.to_string());
        }

        Self::new(&error)
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                StatusCode::OK,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hyper::HeaderMap;

    // Jump through the hoops to get the body as a string.
    async fn body_string(response: Response) -> String {
        String::from_utf8(
            hyper::body::to_bytes(response.into_body())
                .await
                .unwrap()
                .to_vec(),
        )
        .unwrap()
    }

    async fn test_dashboard_error(
        error: DashboardError,
        message: &str,
        caused_by: Option<Vec<&'static str>>,
    ) {
        let response = error.into_response();
        assert_eq!(StatusCode::OK, response.status());
        let mut headers = HeaderMap::new();
        headers.insert(&header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(headers, *response.headers());
        let error_response: ErrorResponse =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert!(!error_response.success);
        assert_eq!(message.to_string(), error_response.error);
        // Map Vec items from str to String
        let caused_by = caused_by.map(|cb| cb.iter().map(|s| s.to_string()).collect());
        assert_eq!(caused_by, error_response.caused_by);
    }

    #[tokio::test]
    async fn column_not_found() {
        let error = DashboardError::ColumnNotFound {
            column: "Year".to_string(),
        };
        test_dashboard_error(error, "column Year not found", None).await;
    }

    #[tokio::test]
    async fn dataset_not_found() {
        let error = DashboardError::DatasetNotFound {
            name: "excelsheet1".to_string(),
        };
        test_dashboard_error(error, "Dataset excelsheet1 not found", None).await;
    }

    #[tokio::test]
    async fn datasets_unavailable() {
        let error = DashboardError::DatasetsUnavailable {
            names: "googlesheet2, googlesheet3".to_string(),
        };
        test_dashboard_error(error, "googlesheet2, googlesheet3 data not available", None).await;
    }

    #[tokio::test]
    async fn filter_config_json() {
        let json_error = serde_json::from_str::<Vec<u32>>("[").unwrap_err();
        let cause = json_error.to_string();
        let error = DashboardError::FilterConfigJson(json_error);
        let response = error.into_response();
        let error_response: ErrorResponse =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!("filter config is not valid JSON", error_response.error);
        assert_eq!(Some(vec![cause]), error_response.caused_by);
    }

    #[tokio::test]
    async fn insufficient_memory() {
        let error = DashboardError::InsufficientMemory {
            requested: 2,
            total: 1,
        };
        let message = "Insufficient memory to process request (2 > 1)";
        test_dashboard_error(error, message, None).await;
    }

    #[tokio::test]
    async fn invalid_sheet_url() {
        test_dashboard_error(
            DashboardError::InvalidSheetUrl,
            "Invalid Google Sheet URL",
            None,
        )
        .await;
    }

    #[tokio::test]
    async fn no_datasets() {
        test_dashboard_error(
            DashboardError::NoDatasets,
            "No datasets available. Please upload files or provide a Google Sheet URL.",
            None,
        )
        .await;
    }

    #[tokio::test]
    async fn polars_error() {
        let error = DashboardError::Polars(polars::error::PolarsError::ColumnNotFound(
            "Year".into(),
        ));
        assert!(error.is_server_error());
        let response = error.into_response();
        let error_response: ErrorResponse =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!("dataframe operation failed", error_response.error);
        assert_eq!(1, error_response.caused_by.unwrap().len());
    }

    #[tokio::test]
    async fn request_data_validation_single() {
        let validation_error = validator::ValidationError::new("foo");
        let error = DashboardError::RequestDataValidationSingle(validation_error);
        let caused_by = Some(vec!["Validation error: foo [{}]"]);
        test_dashboard_error(error, "request data is not valid", caused_by).await;
    }

    #[tokio::test]
    async fn request_data_validation() {
        let mut validation_errors = validator::ValidationErrors::new();
        let validation_error = validator::ValidationError::new("foo");
        validation_errors.add("bar", validation_error);
        let error = DashboardError::RequestDataValidation(validation_errors);
        let caused_by = Some(vec!["bar: Validation error: foo [{}]"]);
        test_dashboard_error(error, "request data is not valid", caused_by).await;
    }

    #[tokio::test]
    async fn semaphore_acquire_error() {
        let sem = tokio::sync::Semaphore::new(1);
        sem.close();
        let error = DashboardError::SemaphoreAcquireError(sem.acquire().await.unwrap_err());
        assert!(error.is_server_error());
        let caused_by = Some(vec!["semaphore closed"]);
        test_dashboard_error(error, "error acquiring resources", caused_by).await;
    }

    #[tokio::test]
    async fn sheets_api_status() {
        let error = DashboardError::SheetsApiStatus {
            status: 403,
            message: "The caller does not have permission".to_string(),
        };
        assert!(!error.is_server_error());
        let message =
            "Google Sheets API request failed with status 403: The caller does not have permission";
        test_dashboard_error(error, message, None).await;
    }

    #[tokio::test]
    async fn sheets_api_server_status() {
        let error = DashboardError::SheetsApiStatus {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(error.is_server_error());
    }

    #[tokio::test]
    async fn try_from_int_error() {
        let error = DashboardError::TryFromInt(u8::try_from(-1_i8).unwrap_err());
        let message = "out of range integral type conversion attempted";
        test_dashboard_error(error, message, None).await;
    }

    #[tokio::test]
    async fn unknown_filter_dependency() {
        let error = DashboardError::UnknownFilterDependency {
            filter: "item".to_string(),
            dependency: "nope".to_string(),
        };
        test_dashboard_error(error, "filter item depends on unknown filter nope", None).await;
    }

    #[tokio::test]
    async fn unsupported_file_type() {
        let error = DashboardError::UnsupportedFileType {
            file_name: "notes.txt".to_string(),
        };
        test_dashboard_error(error, "unsupported file type notes.txt", None).await;
    }
}
