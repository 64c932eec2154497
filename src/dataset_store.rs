//! In-memory dataset store.
//!
//! Datasets are held as shared immutable tables behind an async read/write lock. Replacing or
//! removing a dataset never affects readers still holding the previous table.

use crate::error::DashboardError;
use crate::metrics::DATASETS_STORED;
use crate::table::Table;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::RwLock;

/// Source of a dataset, which determines its name prefix.
#[derive(Clone, Copy, Debug, Display, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum DatasetKind {
    /// Uploaded spreadsheet file
    ExcelSheet,
    /// Google Sheet
    GoogleSheet,
}

impl DatasetKind {
    /// Name of the dataset with 1-based index `index`, e.g. `excelsheet1`.
    pub fn name(self, index: usize) -> String {
        format!("{}{}", self, index)
    }
}

/// Summary of a stored dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Dataset store.
#[derive(Debug, Default)]
pub struct DatasetStore {
    datasets: RwLock<BTreeMap<String, Arc<Table>>>,
}

impl DatasetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a dataset, replacing any dataset with the same name.
    ///
    /// Returns the replaced dataset, if any.
    #[tracing::instrument(level = "DEBUG", skip(self, table), fields(rows = table.len()))]
    pub async fn insert(&self, name: &str, table: Table) -> Option<Arc<Table>> {
        let mut datasets = self.datasets.write().await;
        let previous = datasets.insert(name.to_string(), Arc::new(table));
        DATASETS_STORED.set(datasets.len() as i64);
        previous
    }

    /// Look up a dataset by name.
    pub async fn get(&self, name: &str) -> Option<Arc<Table>> {
        self.datasets.read().await.get(name).cloned()
    }

    /// Remove a dataset.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn remove(&self, name: &str) -> Result<Arc<Table>, DashboardError> {
        let mut datasets = self.datasets.write().await;
        let removed = datasets
            .remove(name)
            .ok_or_else(|| DashboardError::DatasetNotFound {
                name: name.to_string(),
            })?;
        DATASETS_STORED.set(datasets.len() as i64);
        Ok(removed)
    }

    /// Returns true if no datasets are stored.
    pub async fn is_empty(&self) -> bool {
        self.datasets.read().await.is_empty()
    }

    /// All stored datasets, in name order.
    pub async fn snapshot(&self) -> Vec<(String, Arc<Table>)> {
        self.datasets
            .read()
            .await
            .iter()
            .map(|(name, table)| (name.clone(), table.clone()))
            .collect()
    }

    /// Summaries of all stored datasets, in name order.
    pub async fn summaries(&self) -> Vec<DatasetSummary> {
        self.datasets
            .read()
            .await
            .iter()
            .map(|(name, table)| DatasetSummary {
                name: name.clone(),
                rows: table.len(),
                columns: table.columns(),
            })
            .collect()
    }
}
