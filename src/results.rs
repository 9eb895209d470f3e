//! Result rows returned by `execute` and `execute_sql`.

mod row;

pub use row::{Columns, Row};

use std::sync::Arc;

use crate::types::RowValues;

/// Build rows that all share one column index.
///
/// Drivers call this once per result set so the case-insensitive lookup table is built a
/// single time regardless of row count.
#[must_use]
pub fn build_rows(column_names: Vec<String>, values: Vec<Vec<RowValues>>) -> Vec<Row> {
    let columns = Arc::new(Columns::new(column_names));
    values
        .into_iter()
        .map(|row_values| Row::new(Arc::clone(&columns), row_values))
        .collect()
}
