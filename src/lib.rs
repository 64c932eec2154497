//! This crate provides a dashboard data server. It ingests spreadsheets, either uploaded Excel
//! or CSV files or Google Sheets fetched on the user's behalf, into named in-memory datasets
//! and serves filtered, aggregated views of them as JSON.
//!
//! Filters are declared at runtime as a list of columns, each of which may depend on others.
//! A request's filter values narrow the rows fed into the aggregations, and the dropdown
//! options of each filter cascade from the selections of the filters it depends on.
//!
//! The server is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [calamine] reads Excel and OpenDocument workbooks, and [csv] reads CSV files.
//! * [reqwest] calls the Google Sheets API.

pub mod aggregation;
pub mod aggregations;
pub mod app;
pub mod app_state;
pub mod cli;
pub mod coerce;
pub mod dashboard;
pub mod dataset_store;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod join;
pub mod metrics;
pub mod models;
pub mod resource_manager;
pub mod server;
pub mod sheets_client;
pub mod table;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
pub mod validated;
