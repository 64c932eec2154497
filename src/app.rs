//! Dashboard HTTP API

use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::dashboard;
use crate::dataset_store::DatasetKind;
use crate::error::DashboardError;
use crate::ingest::{self, FileFormat};
use crate::metrics::{self, metrics_handler};
use crate::models;
use crate::resource_manager::MemoryReservation;
use crate::sheets_client;
use crate::table::Table;
use crate::validated::{ValidatedForm, ValidatedJson};

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower::Layer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

impl<T: Serialize> IntoResponse for models::Success<T> {
    /// Render a successful response as JSON.
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Application service type
pub type Service = NormalizePath<Router>;

/// Initialise the application
///
/// Sizes the global Rayon thread pool to the task limit when Rayon is enabled.
pub fn init(args: &CommandLineArgs) {
    if args.use_rayon {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(task_limit) = args.task_limit {
            builder = builder.num_threads(task_limit);
        }
        builder
            .build_global()
            .expect("Failed to initialise the Rayon thread pool");
    }
}

/// Returns a [Service] for the dashboard API.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn service(args: &CommandLineArgs) -> Service {
    service_with_state(Arc::new(AppState::new(args)))
}

/// Returns a [Service] for the dashboard API using existing state.
///
/// Trailing slashes are trimmed before routing, so `/get-data/` and `/get-data` are equal.
pub fn service_with_state(state: SharedAppState) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// Returns a [axum::Router] for the dashboard API.
fn router(state: SharedAppState) -> Router {
    let max_upload_size = state.args.max_upload_size;
    Router::new()
        .route("/set-filter-config", post(set_filter_config))
        .route("/get-filter-config", get(get_filter_config))
        .route("/get-sheet-names", post(get_sheet_names))
        .route("/get-excel-sheet-names", post(get_excel_sheet_names))
        .route("/upload-files", post(upload_files))
        .route("/process-google-sheet", post(process_google_sheet))
        .route("/clear-dataset", post(clear_dataset))
        .route("/datasets", get(datasets))
        .route("/get-data", get(get_data))
        .route("/get-summary", get(get_summary))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .on_request(metrics::request_counter)
                        .on_response(metrics::record_response_metrics),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// A file read from a multipart request.
struct Upload {
    file_name: Option<String>,
    data: Vec<u8>,
}

impl Upload {
    /// Read a file field chunk by chunk, growing `reservation` before each chunk is kept.
    async fn read(
        mut field: Field<'_>,
        reservation: &mut MemoryReservation<'_>,
    ) -> Result<Self, DashboardError> {
        let file_name = field.file_name().map(str::to_string);
        let mut data = vec![];
        while let Some(chunk) = field.chunk().await? {
            reservation.grow(chunk.len()).await?;
            data.extend_from_slice(&chunk);
        }
        Ok(Upload { file_name, data })
    }
}

/// Run a blocking parse off the async executor.
///
/// A task permit is held until `parse` completes. Uses the Rayon thread pool when
/// enabled, otherwise Tokio's blocking pool.
async fn run_blocking<T, F>(state: &AppState, parse: F) -> Result<T, DashboardError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DashboardError> + Send + 'static,
{
    let _task_permit = state.resource_manager.task().await?;
    if state.args.use_rayon {
        tokio_rayon::spawn(parse).await
    } else {
        tokio::task::spawn_blocking(parse).await?
    }
}

/// Parse an uploaded file.
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `upload`: File to parse
/// * `sheet`: Optional name of the only sheet to read
async fn parse_upload(
    state: &AppState,
    upload: Upload,
    sheet: Option<String>,
) -> Result<Table, DashboardError> {
    let format = FileFormat::from_file_name(upload.file_name.as_deref())?;
    let max_sheets = state.args.max_sheets_per_file;
    run_blocking(state, move || {
        ingest::read_table(&upload.data, format, sheet.as_deref(), max_sheets)
    })
    .await
}

/// Handler for `/set-filter-config`
async fn set_filter_config(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<models::SetFilterConfigRequest>,
) -> Result<models::Success<models::Message>, DashboardError> {
    let config = request.into_config()?;
    tracing::info!(filters = config.filters().len(), "filter configuration updated");
    *state.filter_config.write().await = config;
    Ok(models::Success::new(models::Message::new(
        "Filter config set successfully",
    )))
}

/// Handler for `/get-filter-config`
async fn get_filter_config(
    State(state): State<SharedAppState>,
) -> models::Success<models::FilterConfigBody> {
    let filter_config = state.filter_config.read().await.clone();
    models::Success::new(models::FilterConfigBody { filter_config })
}

/// Handler for `/get-sheet-names`
async fn get_sheet_names(
    State(state): State<SharedAppState>,
    ValidatedForm(form): ValidatedForm<models::SheetUrlForm>,
) -> Result<models::Success<models::SheetNames>, DashboardError> {
    let spreadsheet_id = sheets_client::spreadsheet_id(&form.sheet_url)?;
    let sheet_names = sheets_client::sheet_names(
        state.sheets.as_ref(),
        &state.resource_manager,
        &spreadsheet_id,
        &form.auth_token,
    )
    .await?;
    Ok(models::Success::new(models::SheetNames { sheet_names }))
}

/// Handler for `/get-excel-sheet-names`
async fn get_excel_sheet_names(
    State(state): State<SharedAppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<models::Success<models::SheetNames>, DashboardError> {
    let mut multipart = multipart?;
    let mut reservation = state.resource_manager.memory_reservation();
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            upload = Some(Upload::read(field, &mut reservation).await?);
            break;
        }
    }
    let upload = upload.ok_or(DashboardError::EmptyUpload)?;
    let format = FileFormat::from_file_name(upload.file_name.as_deref())?;
    let sheet_names =
        run_blocking(&state, move || ingest::sheet_names(&upload.data, format)).await?;
    Ok(models::Success::new(models::SheetNames { sheet_names }))
}

/// Handler for `/upload-files`
///
/// File `i` (1-based) is stored as `excelsheet<i>`, reading only the `i`th entry of
/// `sheet_names` when it is present and non-empty. File data is reserved against the
/// memory limit as it is read and released once every file has been parsed.
async fn upload_files(
    State(state): State<SharedAppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<models::Success<models::Message>, DashboardError> {
    let mut multipart = multipart?;
    let mut reservation = state.resource_manager.memory_reservation();
    let mut uploads = vec![];
    let mut sheet_names: Vec<String> = vec![];
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") => uploads.push(Upload::read(field, &mut reservation).await?),
            Some("sheet_names") => sheet_names.push(field.text().await?),
            _ => {}
        }
    }
    if uploads.is_empty() {
        return Err(DashboardError::EmptyUpload);
    }

    let count = uploads.len();
    for (i, upload) in uploads.into_iter().enumerate() {
        let sheet = sheet_names
            .get(i)
            .filter(|name| !name.is_empty())
            .cloned();
        let table = parse_upload(&state, upload, sheet).await?;
        let name = DatasetKind::ExcelSheet.name(i + 1);
        metrics::record_rows_ingested("excel", table.len());
        tracing::info!(dataset = %name, rows = table.len(), "stored uploaded file");
        state.datasets.insert(&name, table).await;
    }
    Ok(models::Success::new(models::Message::new(format!(
        "{} files uploaded and processed successfully",
        count
    ))))
}

/// Handler for `/process-google-sheet`
async fn process_google_sheet(
    State(state): State<SharedAppState>,
    ValidatedForm(form): ValidatedForm<models::ProcessSheetForm>,
) -> Result<models::Success<models::ProcessedSheet>, DashboardError> {
    let spreadsheet_id = sheets_client::spreadsheet_id(&form.sheet_url)?;
    let table = sheets_client::fetch_sheet(
        state.sheets.as_ref(),
        &state.resource_manager,
        &spreadsheet_id,
        &form.sheet_name,
        &form.auth_token,
    )
    .await?;
    let dataset_name = DatasetKind::GoogleSheet.name(form.sheet_index);
    metrics::record_rows_ingested("googlesheet", table.len());
    tracing::info!(dataset = %dataset_name, rows = table.len(), "stored Google Sheet");
    state.datasets.insert(&dataset_name, table).await;
    Ok(models::Success::new(models::ProcessedSheet {
        message: "Google Sheet processed successfully".to_string(),
        dataset_name,
    }))
}

/// Handler for `/clear-dataset`
async fn clear_dataset(
    State(state): State<SharedAppState>,
    ValidatedForm(form): ValidatedForm<models::ClearDatasetForm>,
) -> Result<models::Success<models::Message>, DashboardError> {
    state.datasets.remove(&form.dataset_name).await?;
    Ok(models::Success::new(models::Message::new(format!(
        "Cleared dataset {}",
        form.dataset_name
    ))))
}

/// Handler for `/datasets`
async fn datasets(State(state): State<SharedAppState>) -> models::Success<models::Datasets> {
    models::Success::new(models::Datasets {
        datasets: state.datasets.summaries().await,
    })
}

/// Handler for `/get-data`
async fn get_data(
    State(state): State<SharedAppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<models::Success<dashboard::DashboardData>, DashboardError> {
    let config = state.filter_config.read().await;
    let values = config.values_from_query(&params);
    let data = dashboard::get_data(&state.datasets, &state.layout, &config, &values).await?;
    Ok(models::Success::new(data))
}

/// Handler for `/get-summary`
async fn get_summary(
    State(state): State<SharedAppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<models::Success<dashboard::Summary>, DashboardError> {
    let config = state.filter_config.read().await;
    let values = config.values_from_query(&params);
    let summary =
        dashboard::get_summary(&state.datasets, &state.layout, &config, &values).await?;
    Ok(models::Success::new(summary))
}
