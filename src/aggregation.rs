use crate::error::DashboardError;
use crate::table::Table;
use crate::types::Value;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Trait for dashboard aggregations.
///
/// This forms the contract between the dashboard pipelines and the reductions they apply to
/// filtered tables.
pub trait Aggregation {
    /// Result of the aggregation.
    type Output;

    /// Execute the aggregation.
    ///
    /// # Arguments
    ///
    /// * `table`: Table to aggregate
    fn aggregate(&self, table: &Table) -> Result<Self::Output, DashboardError>;
}

/// One output row of a grouped aggregation.
///
/// Serialises as a flat JSON object: `{<group column>: <key>, <field>: <value>, ...}`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupRecord {
    /// Name of the column that was grouped by
    pub group_column: String,
    /// Group key
    pub key: Value,
    /// Named aggregated values
    pub fields: Vec<(String, f64)>,
}

impl GroupRecord {
    /// Returns a new record for the group `key` of `group_column`.
    pub fn new(group_column: &str, key: Value) -> Self {
        Self {
            group_column: group_column.to_string(),
            key,
            fields: vec![],
        }
    }

    /// Add a named value.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    /// Look up a named value.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }
}

impl Serialize for GroupRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(&self.group_column, &self.key)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
