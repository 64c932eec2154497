//! This file defines the sheetdash binary entry point.

use sheetdash::app;
use sheetdash::cli;
use sheetdash::metrics;
use sheetdash::server;
use sheetdash::tracing;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing(&args);
    ::tracing::debug!(?args, "parsed command line arguments");
    metrics::register_metrics();
    app::init(&args);
    let service = app::service(&args);
    server::serve(&args, service).await;
    tracing::shutdown_tracing();
}
