//! Count and field aggregate handlers
//!
//! Aggregates apply the where fragment and then aggregate; ordering, limit
//! and offset of the source expression do not take part.

use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::expression::QueryExpression;
use crate::schema::{DocumentMapping, DocumentSchema};
use crate::selector::Selectable;
use crate::storage::{Command, DbValue, RowCursor};

use super::errors::{QueryError, QueryResult};
use super::statement::{aggregate_command, first_value, first_value_async};
use super::HandlerKind;

fn log_ignored_clauses(query: &QueryExpression) {
    if query.limit.is_some() || query.offset.is_some() || !query.ordering.is_empty() {
        debug!(
            document = query.document_name(),
            "ordering, limit and offset do not apply to aggregates"
        );
    }
}

/// `count(*)` over the filtered set
pub struct CountHandler {
    mapping: Arc<DocumentMapping>,
    query: QueryExpression,
}

impl CountHandler {
    pub fn new(schema: &DocumentSchema, query: &QueryExpression) -> QueryResult<Self> {
        log_ignored_clauses(query);
        Ok(Self {
            mapping: schema.mapping_for(query)?,
            query: query.clone(),
        })
    }

    pub fn configure_command(&self) -> Command {
        aggregate_command(&self.mapping, &self.query, "count(*)")
    }

    pub fn handle(&self, rows: &mut dyn RowCursor) -> QueryResult<i64> {
        read_count(first_value(rows)?)
    }

    pub async fn handle_async(&self, rows: &mut dyn RowCursor, cancel: &CancellationToken) -> QueryResult<i64> {
        read_count(first_value_async(rows, cancel).await?)
    }
}

fn read_count(value: DbValue) -> QueryResult<i64> {
    if value.is_null() {
        return Ok(0);
    }
    value
        .as_i64()
        .ok_or_else(|| QueryError::decode(format!("count returned {:?}", value)))
}

/// Aggregate function applied to the projected field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Average => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            AggregateFunction::Sum => HandlerKind::Sum,
            AggregateFunction::Average => HandlerKind::Average,
            AggregateFunction::Min => HandlerKind::Min,
            AggregateFunction::Max => HandlerKind::Max,
        }
    }
}

/// Sum, average, min or max of the projected field
pub struct AggregateHandler<T> {
    mapping: Arc<DocumentMapping>,
    query: QueryExpression,
    function: AggregateFunction,
    locator: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Selectable> AggregateHandler<T> {
    pub fn new(
        schema: &DocumentSchema,
        query: &QueryExpression,
        function: AggregateFunction,
    ) -> QueryResult<Self> {
        let projection = query.projection.as_ref().ok_or_else(|| {
            QueryError::InvalidExpression(format!(
                "{} requires a projected field",
                function.sql_name()
            ))
        })?;
        log_ignored_clauses(query);

        let mapping = schema.mapping_for(query)?;
        let locator = mapping.field_locator(&projection.field, projection.db_type);
        Ok(Self {
            mapping,
            query: query.clone(),
            function,
            locator,
            _marker: PhantomData,
        })
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    pub fn configure_command(&self) -> Command {
        let expression = format!("{}({})", self.function.sql_name(), self.locator);
        aggregate_command(&self.mapping, &self.query, &expression)
    }

    /// `None` when no row matched
    pub fn handle(&self, rows: &mut dyn RowCursor) -> QueryResult<Option<T>> {
        T::from_db_value(first_value(rows)?)
    }

    pub async fn handle_async(
        &self,
        rows: &mut dyn RowCursor,
        cancel: &CancellationToken,
    ) -> QueryResult<Option<T>> {
        T::from_db_value(first_value_async(rows, cancel).await?)
    }
}
