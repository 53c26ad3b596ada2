//! Parameterized sample query construction
//!
//! Identifiers (table and column names) are whitelisted before they reach
//! the statement text; every value goes through a bind parameter. The WHERE
//! clause keeps a fixed predicate order for index alignment: time range,
//! then network element, then cell list, then PEG list, then host.

use chrono::NaiveDateTime;
use peg_analyzer_types::peg::Filter;
use peg_analyzer_types::request::ColumnMap;
use peg_analyzer_types::window::TimeWindow;
use peg_analyzer_types::{AnalyzerError, Result};
use sqlx::{Postgres, QueryBuilder};

/// Reject anything that is not a plain SQL identifier.
pub fn safe_ident(ident: &str) -> Result<&str> {
    let mut chars = ident.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if head_ok && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(ident)
    } else {
        Err(AnalyzerError::StoreFailure {
            cause: format!("identifier '{ident}' is not allowed"),
        })
    }
}

/// Build the sample SELECT for one window.
///
/// `limit` is bound as-is; callers pass cap + 1 to detect overflow.
pub fn build_sample_query<'a>(
    table: &str,
    columns: &ColumnMap,
    window: &TimeWindow,
    filter: &'a Filter,
    limit: i64,
) -> Result<QueryBuilder<'a, Postgres>> {
    let time_col = safe_ident(&columns.time)?;
    let peg_col = safe_ident(&columns.peg_name)?;
    let value_col = safe_ident(&columns.value)?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
    builder.push(format!(
        "{time_col} AS ts, {peg_col} AS peg_name, {value_col}::float8 AS value"
    ));
    if let Some(ne_col) = &columns.ne {
        builder.push(format!(", {} AS ne_key", safe_ident(ne_col)?));
    }
    if let Some(host_col) = &columns.host {
        builder.push(format!(", {} AS host_name", safe_ident(host_col)?));
    }
    if let Some(index_col) = &columns.index_name {
        builder.push(format!(", {} AS index_name", safe_ident(index_col)?));
    }

    builder.push(" FROM ");
    builder.push(safe_ident(table)?.to_string());

    let start: NaiveDateTime = window.start.naive_local();
    let end: NaiveDateTime = window.end.naive_local();
    builder.push(format!(" WHERE {time_col} >= "));
    builder.push_bind(start);
    builder.push(format!(" AND {time_col} <= "));
    builder.push_bind(end);

    if let (Some(ne), Some(ne_col)) = (&filter.ne, &columns.ne) {
        builder.push(format!(" AND {} = ", safe_ident(ne_col)?));
        builder.push_bind(ne.as_str());
    }
    if let (false, Some(cell_col)) = (filter.cell_ids.is_empty(), &columns.cellid) {
        builder.push(format!(" AND {} IN (", safe_ident(cell_col)?));
        let mut separated = builder.separated(", ");
        for cell_id in &filter.cell_ids {
            separated.push_bind(cell_id.as_str());
        }
        builder.push(")");
    }
    if !filter.peg_names.is_empty() {
        builder.push(format!(" AND {peg_col} IN ("));
        let mut separated = builder.separated(", ");
        for peg_name in &filter.peg_names {
            separated.push_bind(peg_name.as_str());
        }
        builder.push(")");
    }
    if let (Some(host), Some(host_col)) = (&filter.host, &columns.host) {
        builder.push(format!(" AND {} = ", safe_ident(host_col)?));
        builder.push_bind(host.as_str());
    }

    builder.push(format!(" ORDER BY {time_col} ASC LIMIT "));
    builder.push_bind(limit);

    Ok(builder)
}
