//! Clause composition and cursor reading shared by the handlers

use tokio_util::sync::CancellationToken;

use crate::expression::{QueryExpression, SortSpec};
use crate::identity::IdentityBatch;
use crate::schema::{DocumentMapping, DOCUMENT_ALIAS};
use crate::selector::Selector;
use crate::storage::{Command, DbValue, Row, RowCursor};

use super::errors::{QueryError, QueryResult};

/// `<schema>.<table> as d`
pub(crate) fn from_clause(mapping: &DocumentMapping) -> String {
    format!("{} as {}", mapping.qualified_table_name(), DOCUMENT_ALIAS)
}

pub(crate) fn append_where(command: &mut Command, mapping: &DocumentMapping, query: &QueryExpression) {
    if let Some(fragment) = mapping.build_where_fragment(query, command) {
        command.append_query(" where ");
        command.append_query(&fragment);
    }
}

pub(crate) fn append_order(command: &mut Command, mapping: &DocumentMapping, ordering: &[SortSpec]) {
    if ordering.is_empty() {
        return;
    }
    let clauses: Vec<String> = ordering
        .iter()
        .map(|spec| {
            format!(
                "{} {}",
                mapping.field_locator(&spec.field, spec.db_type),
                spec.direction.as_str()
            )
        })
        .collect();
    command.append_query(" order by ");
    command.append_query(&clauses.join(", "));
}

pub(crate) fn append_paging(command: &mut Command, limit: Option<u64>, offset: Option<u64>) {
    if let Some(limit) = limit {
        command.append_query(&format!(" limit {}", limit));
    }
    if let Some(offset) = offset {
        command.append_query(&format!(" offset {}", offset));
    }
}

/// `select <expression> from <table> as d [where ...]`
pub(crate) fn aggregate_command(
    mapping: &DocumentMapping,
    query: &QueryExpression,
    expression: &str,
) -> Command {
    let mut command = Command::new();
    command.append_query(&format!("select {} from {}", expression, from_clause(mapping)));
    append_where(&mut command, mapping, query);
    command
}

/// Decodes up to `cap` rows into `batch`
pub(crate) fn read_rows<T>(
    selector: &dyn Selector<T>,
    rows: &mut dyn RowCursor,
    batch: &mut IdentityBatch<'_>,
    cap: Option<usize>,
) -> QueryResult<Vec<T>> {
    let mut items = Vec::new();
    while cap.map_or(true, |cap| items.len() < cap) {
        let Some(mut row) = rows.next_row()? else {
            break;
        };
        items.push(selector.resolve(&mut row, batch)?);
    }
    Ok(items)
}

/// Async twin of `read_rows`; the token is observed before and during
/// every row read
pub(crate) async fn read_rows_async<T>(
    selector: &dyn Selector<T>,
    rows: &mut dyn RowCursor,
    batch: &mut IdentityBatch<'_>,
    cap: Option<usize>,
    cancel: &CancellationToken,
) -> QueryResult<Vec<T>> {
    let mut items = Vec::new();
    while cap.map_or(true, |cap| items.len() < cap) {
        let Some(mut row) = next_row_cancellable(rows, cancel).await? else {
            break;
        };
        items.push(selector.resolve(&mut row, batch)?);
    }
    Ok(items)
}

pub(crate) async fn next_row_cancellable(
    rows: &mut dyn RowCursor,
    cancel: &CancellationToken,
) -> QueryResult<Option<Row>> {
    if cancel.is_cancelled() {
        return Err(QueryError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(QueryError::Cancelled),
        row = rows.next_row_async() => Ok(row?),
    }
}

/// First column of the first row, or null for an empty result set
pub(crate) fn first_value(rows: &mut dyn RowCursor) -> QueryResult<DbValue> {
    match rows.next_row()? {
        Some(mut row) if !row.is_empty() => Ok(row.take(0)?),
        _ => Ok(DbValue::Null),
    }
}

pub(crate) async fn first_value_async(
    rows: &mut dyn RowCursor,
    cancel: &CancellationToken,
) -> QueryResult<DbValue> {
    match next_row_cancellable(rows, cancel).await? {
        Some(mut row) if !row.is_empty() => Ok(row.take(0)?),
        _ => Ok(DbValue::Null),
    }
}
