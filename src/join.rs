//! Inner join of two tables on shared key columns.

use crate::error::DashboardError;
use crate::table::Table;

use polars::prelude::*;

const LEFT_ROW: &str = "__left_row";
const RIGHT_ROW: &str = "__right_row";

/// Suffixes appended to overlapping non-key column names, left then right.
pub type Suffixes<'a> = (&'a str, &'a str);

/// Non-key columns of a table, with the name each takes in the joined table.
fn rest_columns(
    table: &Table,
    other: &Table,
    on: &[&str],
    suffix: &str,
) -> Vec<(String, String)> {
    let other_columns = other.columns();
    table
        .columns()
        .into_iter()
        .filter(|name| !on.contains(&name.as_str()))
        .map(|name| {
            let renamed = if other_columns.contains(&name) {
                format!("{}{}", name, suffix)
            } else {
                name.clone()
            };
            (name, renamed)
        })
        .collect()
}

/// Keys followed by the renamed non-key columns, tagged with the original row position.
fn prepared(table: &Table, keys: &[Expr], rest: &[(String, String)], row: &str) -> LazyFrame {
    let mut columns = keys.to_vec();
    columns.extend(
        rest.iter()
            .map(|(name, renamed)| col(name.as_str()).alias(renamed.as_str())),
    );
    table
        .frame()
        .clone()
        .lazy()
        .select(columns)
        .with_row_index(row, None)
}

/// Inner join `left` and `right` on the `on` columns.
///
/// The result has the key columns first, then the remaining left columns, then the remaining
/// right columns. A non-key column present in both tables gets the matching suffix. Rows
/// follow left row order; a left row matching several right rows is repeated in right row
/// order. Rows with a null key never match.
///
/// # Arguments
///
/// * `left`: Left table
/// * `right`: Right table
/// * `on`: Key column names, present in both tables
/// * `suffixes`: Suffixes for overlapping column names
pub fn inner_join(
    left: &Table,
    right: &Table,
    on: &[&str],
    suffixes: Suffixes,
) -> Result<Table, DashboardError> {
    for column in on {
        left.require_column(column)?;
        right.require_column(column)?;
    }
    let left_rest = rest_columns(left, right, on, suffixes.0);
    let right_rest = rest_columns(right, left, on, suffixes.1);
    let keys: Vec<Expr> = on.iter().map(|column| col(*column)).collect();

    let mut output = keys.clone();
    output.extend(
        left_rest
            .iter()
            .chain(&right_rest)
            .map(|(_, renamed)| col(renamed.as_str())),
    );
    let joined = prepared(left, &keys, &left_rest, LEFT_ROW)
        .join(
            prepared(right, &keys, &right_rest, RIGHT_ROW),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Inner),
        )
        .sort_by_exprs(
            [col(LEFT_ROW), col(RIGHT_ROW)],
            SortMultipleOptions::default(),
        )
        .select(output)
        .collect()?;
    Ok(joined.into())
}
