//! Filter engine.
//!
//! A [FilterConfig] declares which columns can be filtered and, for each one, which other
//! filters narrow its dropdown options. It is applied to a [Table] with a request's
//! [FilterValues] in two ways:
//!
//! * [FilterConfig::apply] keeps the rows accepted by every active selection.
//! * [FilterConfig::options] computes the remaining choices for each filter, considering only
//!   the selections of its declared dependencies, so that dropdowns cascade.

use crate::coerce::{to_date, to_number};
use crate::error::DashboardError;
use crate::table::{Table, DATETIME_TYPE};
use crate::types::{Selection, Value};

use polars::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use validator::{Validate, ValidationError};

/// Accepted values per column for a single request.
pub type FilterValues = BTreeMap<String, Selection>;

/// Remaining options per filter, keyed `<lowercased column>_options`.
pub type FilterOptions = BTreeMap<String, Vec<Value>>;

/// A single filterable column.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
pub struct FilterDescriptor {
    /// Identifier other filters use to declare a dependency
    #[validate(length(min = 1, message = "filter id must not be empty"))]
    pub id: String,
    /// Column the filter applies to
    #[validate(length(min = 1, message = "filter column must not be empty"))]
    pub column: String,
    /// Ids of the filters whose selections narrow this filter's options
    #[serde(
        default,
        alias = "dependsOn",
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub depends_on: Vec<String>,
    /// Free-form kind used by the frontend, e.g. `top-level` or `dependent`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Ordered list of filters.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(transparent)]
#[validate(schema(function = "validate_filter_config"))]
pub struct FilterConfig {
    #[validate]
    filters: Vec<FilterDescriptor>,
}

/// Treat an explicit `null` dependency list as an empty one.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Validate filter ids and dependencies
fn validate_filter_config(config: &FilterConfig) -> Result<(), ValidationError> {
    for (i, filter) in config.filters.iter().enumerate() {
        if config.filters[..i].iter().any(|other| other.id == filter.id) {
            let mut error = ValidationError::new("Filter ids must be unique");
            error.add_param("id".into(), &filter.id);
            return Err(error);
        }
        for dependency in &filter.depends_on {
            if dependency == &filter.id {
                let mut error = ValidationError::new("Filter must not depend on itself");
                error.add_param("id".into(), &filter.id);
                return Err(error);
            }
            if config.column_of(dependency).is_none() {
                let mut error = ValidationError::new("Filter depends on an unknown filter id");
                error.add_param("id".into(), &filter.id);
                error.add_param("dependency".into(), dependency);
                return Err(error);
            }
        }
    }
    Ok(())
}

/// Accepted values converted to the type of the column they are compared with.
///
/// Selections arrive as text. Values that cannot be read as the column type match nothing.
enum Candidates {
    Numbers(Vec<f64>),
    Flags(Vec<bool>),
    Dates(Vec<i64>),
    Texts(Vec<String>),
}

impl Candidates {
    fn new(dtype: &DataType, texts: &[&str]) -> Self {
        let values = || texts.iter().map(|text| Value::from(*text));
        match dtype {
            dtype if dtype.is_float() || dtype.is_integer() => Candidates::Numbers(
                values()
                    .filter_map(|value| to_number(&value, &[]))
                    .collect(),
            ),
            DataType::Boolean => Candidates::Flags(
                texts
                    .iter()
                    .filter_map(|text| text.to_lowercase().parse().ok())
                    .collect(),
            ),
            DataType::Datetime(_, _) => Candidates::Dates(
                values()
                    .filter_map(|value| to_date(&value))
                    .map(|date| date.and_utc().timestamp_millis())
                    .collect(),
            ),
            _ => Candidates::Texts(texts.iter().map(|text| text.to_string()).collect()),
        }
    }

    /// Literal for the first candidate.
    fn first(&self) -> Option<Expr> {
        match self {
            Candidates::Numbers(numbers) => numbers.first().map(|number| lit(*number)),
            Candidates::Flags(flags) => flags.first().map(|flag| lit(*flag)),
            Candidates::Dates(millis) => millis
                .first()
                .map(|millis| lit(*millis).cast(DATETIME_TYPE)),
            Candidates::Texts(texts) => texts.first().map(|text| lit(text.as_str())),
        }
    }

    /// Literal list of all candidates.
    fn list(self) -> PolarsResult<Expr> {
        let name = PlSmallStr::from("candidates");
        let series = match self {
            Candidates::Numbers(numbers) => Series::new(name, numbers),
            Candidates::Flags(flags) => Series::new(name, flags),
            Candidates::Dates(millis) => Series::new(name, millis).cast(&DATETIME_TYPE)?,
            Candidates::Texts(texts) => Series::new(name, texts),
        };
        Ok(lit(series))
    }
}

/// Predicate keeping the rows of `table` accepted by every active selection.
///
/// Selections for columns the table lacks are ignored. Null cells never match. Returns `None`
/// if nothing restricts the rows.
fn predicate<'a, I>(table: &Table, selections: I) -> PolarsResult<Option<Expr>>
where
    I: IntoIterator<Item = (&'a str, &'a Selection)>,
{
    let mut predicate: Option<Expr> = None;
    for (column, selection) in selections {
        let Some(dtype) = table.dtype(column).filter(|_| selection.is_active()) else {
            continue;
        };
        let accepted = Candidates::new(dtype, &selection.values());
        let cells = match dtype {
            DataType::Datetime(_, _) => col(column).cast(DATETIME_TYPE),
            dtype if dtype.is_integer() => col(column).cast(DataType::Float64),
            _ => col(column),
        };
        let matches = match selection {
            Selection::One(_) => accepted.first().map_or(lit(false), |value| cells.eq(value)),
            Selection::Many(_) => cells.is_in(accepted.list()?),
        };
        let matches = matches.fill_null(lit(false));
        predicate = Some(match predicate {
            Some(predicate) => predicate.and(matches),
            None => matches,
        });
    }
    Ok(predicate)
}

/// Rows of `table` accepted by every active selection.
fn matching<'a, I>(table: &Table, selections: I) -> Result<Table, DashboardError>
where
    I: IntoIterator<Item = (&'a str, &'a Selection)>,
{
    match predicate(table, selections)? {
        Some(predicate) => table.filter(predicate),
        None => Ok(table.clone()),
    }
}

impl FilterConfig {
    /// Returns a new filter configuration.
    pub fn new(filters: Vec<FilterDescriptor>) -> Self {
        Self { filters }
    }

    /// Filters in declared order.
    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    /// Returns true if no filters are configured.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Column of the filter with the given id.
    pub fn column_of(&self, id: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|filter| filter.id == id)
            .map(|filter| filter.column.as_str())
    }

    /// Extract filter values from query parameters.
    ///
    /// Only parameters named after a configured filter column are read. See
    /// [Selection::parse] for the accepted formats.
    pub fn values_from_query(&self, params: &HashMap<String, String>) -> FilterValues {
        self.filters
            .iter()
            .filter_map(|filter| {
                params
                    .get(&filter.column)
                    .and_then(|raw| Selection::parse(raw))
                    .map(|selection| (filter.column.clone(), selection))
            })
            .collect()
    }

    /// Returns the rows of `table` accepted by every configured filter.
    ///
    /// # Arguments
    ///
    /// * `table`: Table to filter
    /// * `values`: Accepted values per column
    pub fn apply(&self, table: &Table, values: &FilterValues) -> Result<Table, DashboardError> {
        let selections = self.filters.iter().filter_map(|filter| {
            values
                .get(&filter.column)
                .map(|selection| (filter.column.as_str(), selection))
        });
        matching(table, selections)
    }

    /// Returns the remaining options for each filter.
    ///
    /// For each filter in declared order, only the selections of its declared dependencies are
    /// applied to `table`; the sorted distinct non-null values of its column are then the
    /// options. Filters whose column is absent from the table are omitted.
    ///
    /// # Arguments
    ///
    /// * `table`: Table to compute options from
    /// * `values`: Accepted values per column
    pub fn options(
        &self,
        table: &Table,
        values: &FilterValues,
    ) -> Result<FilterOptions, DashboardError> {
        let mut options = FilterOptions::new();
        for filter in &self.filters {
            let mut selections = Vec::with_capacity(filter.depends_on.len());
            for dependency in &filter.depends_on {
                let column = self.column_of(dependency).ok_or_else(|| {
                    DashboardError::UnknownFilterDependency {
                        filter: filter.id.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                if let Some(selection) = values.get(column) {
                    selections.push((column, selection));
                }
            }
            if table.has_column(&filter.column) {
                options.insert(
                    format!("{}_options", filter.column.to_lowercase()),
                    matching(table, selections)?.distinct(&filter.column)?,
                );
            }
        }
        Ok(options)
    }
}
