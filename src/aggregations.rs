//! Grouped reductions.
//!
//! Each aggregation is implemented as a struct that implements the
//! [Aggregation](crate::aggregation::Aggregation) trait. Grouped aggregations drop rows with a
//! null group key and emit groups in ascending key order. Cells that cannot be read as numbers
//! contribute nothing to sums and means.

use crate::aggregation::{Aggregation, GroupRecord};
use crate::coerce::{round_to, to_number};
use crate::error::DashboardError;
use crate::table::Table;
use crate::types::Value;

use polars::prelude::*;

const VALUE: &str = "__value";
const SUM: &str = "__sum";
const MEAN: &str = "__mean";
const RESULT: &str = "__result";

/// A column read as numbers, with cells that are not numeric as nulls.
fn numeric_series(table: &Table, column: &str) -> Result<Series, DashboardError> {
    let index = table.require_column(column)?;
    let numbers: Vec<Option<f64>> = table
        .column_values(index)?
        .iter()
        .map(|value| to_number(value, &[]))
        .collect();
    Ok(Series::new(VALUE.into(), numbers))
}

/// Sum and mean of the numeric cells of `value` per distinct non-null key of `by`, in key
/// order.
fn grouped(table: &Table, by: &str, value: &str) -> Result<LazyFrame, DashboardError> {
    table.require_column(by)?;
    let mut frame = table.frame().select([by])?;
    frame.with_column(numeric_series(table, value)?)?;
    Ok(frame
        .lazy()
        .filter(col(by).is_not_null())
        .group_by([col(by)])
        .agg([col(VALUE).sum().alias(SUM), col(VALUE).mean().alias(MEAN)])
        .sort_by_exprs([col(by)], SortMultipleOptions::default()))
}

/// Values of a float column, with nulls and non-finite values as 0.
fn finite(frame: &DataFrame, name: &str) -> Result<Vec<f64>, DashboardError> {
    let series = frame
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|number| number.filter(|n| n.is_finite()).unwrap_or(0.0))
        .collect())
}

/// Group keys of a collected grouping.
fn keys(frame: DataFrame, by: &str) -> Result<Vec<Value>, DashboardError> {
    let table = Table::from(frame);
    table.column_values(table.require_column(by)?)
}

/// Sum a column per group.
pub struct GroupSum {
    /// Column to group by
    pub by: String,
    /// Numeric column to sum
    pub value: String,
    /// Field name of the sum in each output record
    pub output: String,
}

impl GroupSum {
    pub fn new(by: &str, value: &str, output: &str) -> Self {
        Self {
            by: by.to_string(),
            value: value.to_string(),
            output: output.to_string(),
        }
    }
}

impl Aggregation for GroupSum {
    type Output = Vec<GroupRecord>;

    fn aggregate(&self, table: &Table) -> Result<Self::Output, DashboardError> {
        let frame = grouped(table, &self.by, &self.value)?.collect()?;
        let sums = finite(&frame, SUM)?;
        Ok(keys(frame, &self.by)?
            .into_iter()
            .zip(sums)
            .map(|(key, sum)| GroupRecord::new(&self.by, key).with(&self.output, sum))
            .collect())
    }
}

/// Mean of a column per group, reported as the percentage change from the previous group.
///
/// Changes are rounded to 2 decimal places. The first group reports 0, as does any change that
/// is not finite (e.g. from a zero previous mean). A group without numeric cells takes the
/// previous group's mean.
pub struct GroupMeanChange {
    /// Column to group by
    pub by: String,
    /// Numeric column to average
    pub value: String,
    /// Field name of the change in each output record
    pub output: String,
}

impl GroupMeanChange {
    pub fn new(by: &str, value: &str, output: &str) -> Self {
        Self {
            by: by.to_string(),
            value: value.to_string(),
            output: output.to_string(),
        }
    }
}

impl Aggregation for GroupMeanChange {
    type Output = Vec<GroupRecord>;

    fn aggregate(&self, table: &Table) -> Result<Self::Output, DashboardError> {
        let mean = col(MEAN).fill_null_with_strategy(FillNullStrategy::Forward(None));
        let previous = mean.clone().shift(lit(1));
        let frame = grouped(table, &self.by, &self.value)?
            .with_column(((mean - previous.clone()) / previous * lit(100.0)).alias(RESULT))
            .collect()?;
        let changes = finite(&frame, RESULT)?;
        Ok(keys(frame, &self.by)?
            .into_iter()
            .zip(changes)
            .map(|(key, change)| {
                GroupRecord::new(&self.by, key).with(&self.output, round_to(change, 2))
            })
            .collect())
    }
}

/// Sum a column per group along with each group's percentage of the overall total.
///
/// Sums and percentages are rounded to 1 decimal place. Percentages are 0 when the total is 0.
pub struct ShareOfTotal {
    /// Column to group by
    pub by: String,
    /// Numeric column to sum
    pub value: String,
    /// Field name of the sum in each output record
    pub output: String,
    /// Maximum number of groups returned, in key order
    pub limit: Option<usize>,
}

impl ShareOfTotal {
    pub fn new(by: &str, value: &str, output: &str, limit: Option<usize>) -> Self {
        Self {
            by: by.to_string(),
            value: value.to_string(),
            output: output.to_string(),
            limit,
        }
    }
}

impl Aggregation for ShareOfTotal {
    type Output = Vec<GroupRecord>;

    fn aggregate(&self, table: &Table) -> Result<Self::Output, DashboardError> {
        let mut plan = grouped(table, &self.by, &self.value)?
            .with_column((col(SUM) / col(SUM).sum() * lit(100.0)).alias(RESULT));
        if let Some(limit) = self.limit {
            plan = plan.limit(IdxSize::try_from(limit)?);
        }
        let frame = plan.collect()?;
        let sums = finite(&frame, SUM)?;
        let percentages = finite(&frame, RESULT)?;
        Ok(keys(frame, &self.by)?
            .into_iter()
            .zip(sums.into_iter().zip(percentages))
            .map(|(key, (sum, percentage))| {
                GroupRecord::new(&self.by, key)
                    .with(&self.output, round_to(sum, 1))
                    .with("percentage", round_to(percentage, 1))
            })
            .collect())
    }
}

/// Total of a numeric column. A table without the column totals 0.
pub struct ColumnTotal {
    /// Numeric column to sum
    pub column: String,
}

impl ColumnTotal {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
        }
    }
}

impl Aggregation for ColumnTotal {
    type Output = f64;

    fn aggregate(&self, table: &Table) -> Result<Self::Output, DashboardError> {
        if !table.has_column(&self.column) {
            return Ok(0.0);
        }
        Ok(numeric_series(table, &self.column)?.sum::<f64>()?)
    }
}
