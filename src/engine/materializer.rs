//! Result materializer
//!
//! Reads the column metadata of an executed statement, fetches every row
//! through the dispatcher and decodes it. The driver reports some query
//! errors (a predicate comparing a string column with a number, say) only
//! once fetching starts, so the error slot is checked after the last fetch.

use super::handle::CallGuard;
use super::statement::StatementHandle;
use crate::codec::{decode, DecodeOptions};
use crate::core::column::{ColumnInfo, QueryResult, Row};
use crate::core::error::Result;
use crate::core::types::ROW_NOT_FOUND;
use std::sync::Arc;

/// Build the result of the statement's current execution
///
/// `None` when the statement produced no result set.
pub(crate) async fn materialize(
    stmt: &Arc<StatementHandle>,
    guard: &Arc<CallGuard>,
) -> Result<Option<QueryResult>> {
    let conn = guard.handle();
    let driver = conn.driver();
    let native = stmt.native();

    let num_cols = driver.num_cols(native);
    if num_cols < 0 {
        return Err(conn.take_error());
    }
    if num_cols == 0 {
        return Ok(None);
    }

    let columns = (0..num_cols as usize)
        .map(|index| {
            driver
                .get_column_info(native, index)
                .ok_or_else(|| conn.take_error())
        })
        .collect::<Result<Vec<ColumnInfo>>>()?;

    let options = DecodeOptions::from_settings(conn.settings());
    let mut rows: Vec<Row> = Vec::new();

    loop {
        let fetching = Arc::clone(stmt);
        let has_row = guard
            .dispatch("fetch_next", false, move |h| {
                !fetching.is_closed() && h.driver().fetch_next(fetching.native())
            })
            .await?;
        if !has_row {
            break;
        }

        let mut row = Row::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let value = driver
                .get_column(native, index)
                .ok_or_else(|| conn.take_error())?;
            row.push(decode(value, column, &options)?);
        }
        rows.push(row);
    }

    match conn.error_code() {
        0 => {}
        ROW_NOT_FOUND => conn.clear_error(),
        _ => return Err(conn.take_error()),
    }

    log::debug!(
        "Materialized {} rows of {} columns from {:?}",
        rows.len(),
        columns.len(),
        native
    );
    Ok(Some(QueryResult::new(columns, rows)))
}
