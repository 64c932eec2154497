use crate::cli::CommandLineArgs;
use crate::dashboard::DashboardLayout;
use crate::dataset_store::DatasetStore;
use crate::filter::FilterConfig;
use crate::resource_manager::ResourceManager;
use crate::sheets_client::{GoogleSheetsClient, SheetsApi};

use expanduser::expanduser;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::RwLock;
use validator::Validate;

/// Shared application state passed to each request handler.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Resource manager.
    pub resource_manager: ResourceManager,

    /// Stored datasets.
    pub datasets: DatasetStore,

    /// Current filter configuration.
    pub filter_config: RwLock<FilterConfig>,

    /// Dataset and column names read by the dashboard pipelines.
    pub layout: DashboardLayout,

    /// Google Sheets API client.
    pub sheets: Arc<dyn SheetsApi>,
}

impl AppState {
    /// Create and return an [AppState].
    ///
    /// The layout and initial filter configuration are read from the files named in `args`,
    /// if any.
    pub fn new(args: &CommandLineArgs) -> Self {
        let layout = args
            .layout_file
            .as_deref()
            .map(read_json_file::<DashboardLayout>)
            .unwrap_or_default();
        let filter_config = args
            .filter_config_file
            .as_deref()
            .map(read_json_file::<FilterConfig>)
            .unwrap_or_default();
        filter_config
            .validate()
            .expect("The filter configuration file is not valid");
        let sheets = Arc::new(GoogleSheetsClient::new(args.sheets_api_url.clone()));
        Self::with_parts(args, layout, filter_config, sheets)
    }

    /// Create and return an [AppState] from its parts.
    pub fn with_parts(
        args: &CommandLineArgs,
        layout: DashboardLayout,
        filter_config: FilterConfig,
        sheets: Arc<dyn SheetsApi>,
    ) -> Self {
        let task_limit = args
            .task_limit
            .or_else(|| Some(num_cpus::get().saturating_sub(1).max(1)));
        let resource_manager =
            ResourceManager::new(args.sheets_connection_limit, args.memory_limit, task_limit);

        Self {
            args: args.clone(),
            resource_manager,
            datasets: DatasetStore::new(),
            filter_config: RwLock::new(filter_config),
            layout,
            sheets,
        }
    }
}

/// Read a JSON file at startup. Panics if the file cannot be read or parsed.
fn read_json_file<T: DeserializeOwned>(path: &str) -> T {
    let path = expanduser(path)
        .expect("Failed to expand ~ to user name. Please provide an absolute path instead.");
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("Failed to read {}: {}", path.display(), err));
    serde_json::from_str(&contents)
        .unwrap_or_else(|err| panic!("Failed to parse {}: {}", path.display(), err))
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
