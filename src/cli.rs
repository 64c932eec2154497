//! Command Line Interface (CLI) arguments.

use byte_unit::Byte;
use clap::Parser;

/// Sheetdash command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "SHEETDASH_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "SHEETDASH_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "SHEETDASH_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/sheetdash/certs/cert.pem",
        env = "SHEETDASH_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/sheetdash/certs/key.pem",
        env = "SHEETDASH_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "SHEETDASH_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to enable sending traces to Jaeger.
    #[arg(long, default_value_t = false, env = "SHEETDASH_ENABLE_JAEGER")]
    pub enable_jaeger: bool,
    /// Whether to use Rayon for parsing uploaded workbooks.
    #[arg(long, default_value_t = false, env = "SHEETDASH_USE_RAYON")]
    pub use_rayon: bool,
    /// Memory limit in bytes for uploaded file data held concurrently.
    #[arg(long, env = "SHEETDASH_MEMORY_LIMIT")]
    pub memory_limit: Option<usize>,
    /// Maximum number of concurrent parsing tasks. Defaults to the number of CPUs minus one.
    #[arg(long, env = "SHEETDASH_TASK_LIMIT")]
    pub task_limit: Option<usize>,
    /// Maximum number of concurrent Google Sheets API connections.
    #[arg(long, env = "SHEETDASH_SHEETS_CONNECTION_LIMIT")]
    pub sheets_connection_limit: Option<usize>,
    /// Maximum size of an upload request body, e.g. "100MiB".
    #[arg(long, default_value = "100MiB", value_parser = parse_size, env = "SHEETDASH_MAX_UPLOAD_SIZE")]
    pub max_upload_size: usize,
    /// Maximum number of sheets read from an uploaded workbook when no sheet is named.
    #[arg(long, default_value_t = 5, env = "SHEETDASH_MAX_SHEETS_PER_FILE")]
    pub max_sheets_per_file: usize,
    /// Base URL of the Google Sheets API.
    #[arg(
        long,
        default_value = "https://sheets.googleapis.com/v4/",
        env = "SHEETDASH_SHEETS_API_URL"
    )]
    pub sheets_api_url: url::Url,
    /// Path to a JSON file describing the dashboard layout.
    #[arg(long, env = "SHEETDASH_LAYOUT_FILE")]
    pub layout_file: Option<String>,
    /// Path to a JSON file holding the filter configuration to load at startup.
    #[arg(long, env = "SHEETDASH_FILTER_CONFIG_FILE")]
    pub filter_config_file: Option<String>,
}

/// Parse a human readable size such as "100MiB" into bytes.
fn parse_size(size: &str) -> Result<usize, String> {
    let bytes = Byte::parse_str(size, /* ignore case */ true)
        .map_err(|err| err.to_string())?
        .as_u64();
    usize::try_from(bytes).map_err(|err| err.to_string())
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
