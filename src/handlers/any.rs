//! Existence probe handler

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::expression::QueryExpression;
use crate::schema::{DocumentMapping, DocumentSchema};
use crate::storage::{Command, DbValue, RowCursor};

use super::errors::{QueryError, QueryResult};
use super::statement::{aggregate_command, first_value, first_value_async};

/// Answers whether any row matches without fetching documents
pub struct AnyHandler {
    mapping: Arc<DocumentMapping>,
    query: QueryExpression,
}

impl AnyHandler {
    pub fn new(schema: &DocumentSchema, query: &QueryExpression) -> QueryResult<Self> {
        Ok(Self {
            mapping: schema.mapping_for(query)?,
            query: query.clone(),
        })
    }

    pub fn configure_command(&self) -> Command {
        aggregate_command(&self.mapping, &self.query, "(count(*) > 0) as result")
    }

    pub fn handle(&self, rows: &mut dyn RowCursor) -> QueryResult<bool> {
        read_exists(first_value(rows)?)
    }

    pub async fn handle_async(&self, rows: &mut dyn RowCursor, cancel: &CancellationToken) -> QueryResult<bool> {
        read_exists(first_value_async(rows, cancel).await?)
    }
}

fn read_exists(value: DbValue) -> QueryResult<bool> {
    match value {
        DbValue::Null => Ok(false),
        other => other
            .as_bool()
            .ok_or_else(|| QueryError::decode(format!("existence probe returned {:?}", other))),
    }
}
