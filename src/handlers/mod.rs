//! Query handlers for docstash
//!
//! A handler turns one query expression into one command and decodes that
//! command's one result set. The family is closed:
//!
//! | kind | command | output |
//! |---|---|---|
//! | List | `select <fields> ... [order by] [limit] [offset]` | `QueryOutput::List` |
//! | Enumerable | same as List | `QueryOutput::Enumerable` |
//! | Count | `select count(*) ...` | `QueryOutput::Count` |
//! | Sum, Average, Min, Max | `select <fn>(<field>) ...` | `QueryOutput::Scalar` |
//! | Any | `select (count(*) > 0) ...` | `QueryOutput::Exists` |
//! | One | List with a row cap of 1 or 2 | `QueryOutput::One` |
//!
//! `QueryHandlerFactory` picks exactly one kind per expression.

mod aggregate;
mod any;
mod errors;
mod factory;
mod list;
mod one;
mod output;
mod statement;

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::identity::IdentityMap;
use crate::selector::Selectable;
use crate::storage::{BoxFuture, Command, RowCursor};

pub use aggregate::{AggregateFunction, AggregateHandler, CountHandler};
pub use any::AnyHandler;
pub use errors::{QueryError, QueryErrorCode, QueryResult};
pub use factory::{HandlerConstructor, QueryHandlerFactory};
pub use list::{EnumerableHandler, ListHandler};
pub use one::{OnePolicy, OneResultHandler};
pub use output::{QueryOutput, ResultShape};

/// Tag of each handler variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    List,
    Enumerable,
    Count,
    Sum,
    Average,
    Min,
    Max,
    Any,
    One,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::List => "list",
            HandlerKind::Enumerable => "enumerable",
            HandlerKind::Count => "count",
            HandlerKind::Sum => "sum",
            HandlerKind::Average => "average",
            HandlerKind::Min => "min",
            HandlerKind::Max => "max",
            HandlerKind::Any => "any",
            HandlerKind::One => "one",
        }
    }
}

/// One configured handler
pub enum QueryHandler<T> {
    List(ListHandler<T>),
    Enumerable(EnumerableHandler<T>),
    Count(CountHandler),
    Aggregate(AggregateHandler<T>),
    Any(AnyHandler),
    One(OneResultHandler<T>),
}

impl<T> fmt::Debug for QueryHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            QueryHandler::List(_) => "List",
            QueryHandler::Enumerable(_) => "Enumerable",
            QueryHandler::Count(_) => "Count",
            QueryHandler::Aggregate(_) => "Aggregate",
            QueryHandler::Any(_) => "Any",
            QueryHandler::One(_) => "One",
        };
        f.debug_tuple("QueryHandler").field(&variant).finish()
    }
}

impl<T: Selectable> QueryHandler<T> {
    pub fn kind(&self) -> HandlerKind {
        match self {
            QueryHandler::List(_) => HandlerKind::List,
            QueryHandler::Enumerable(_) => HandlerKind::Enumerable,
            QueryHandler::Count(_) => HandlerKind::Count,
            QueryHandler::Aggregate(h) => h.function().kind(),
            QueryHandler::Any(_) => HandlerKind::Any,
            QueryHandler::One(_) => HandlerKind::One,
        }
    }

    /// Builds the command this handler decodes
    pub fn configure_command(&self) -> Command {
        match self {
            QueryHandler::List(h) => h.configure_command(),
            QueryHandler::Enumerable(h) => h.configure_command(),
            QueryHandler::Count(h) => h.configure_command(),
            QueryHandler::Aggregate(h) => h.configure_command(),
            QueryHandler::Any(h) => h.configure_command(),
            QueryHandler::One(h) => h.configure_command(),
        }
    }

    /// Decodes the result set of the configured command
    pub fn handle(&self, rows: &mut dyn RowCursor, map: &mut dyn IdentityMap) -> QueryResult<QueryOutput<T>> {
        let output = match self {
            QueryHandler::List(h) => QueryOutput::List(h.handle(rows, map)?),
            QueryHandler::Enumerable(h) => QueryOutput::Enumerable(h.handle(rows, map)?),
            QueryHandler::Count(h) => QueryOutput::Count(h.handle(rows)?),
            QueryHandler::Aggregate(h) => QueryOutput::Scalar(h.handle(rows)?),
            QueryHandler::Any(h) => QueryOutput::Exists(h.handle(rows)?),
            QueryHandler::One(h) => QueryOutput::One(h.handle(rows, map)?),
        };
        Ok(output)
    }

    /// Async twin of `handle`. A cancelled decode registers nothing in `map`.
    pub fn handle_async<'a>(
        &'a self,
        rows: &'a mut dyn RowCursor,
        map: &'a mut dyn IdentityMap,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, QueryResult<QueryOutput<T>>> {
        Box::pin(async move {
            let output = match self {
                QueryHandler::List(h) => QueryOutput::List(h.handle_async(rows, map, cancel).await?),
                QueryHandler::Enumerable(h) => {
                    QueryOutput::Enumerable(h.handle_async(rows, map, cancel).await?)
                }
                QueryHandler::Count(h) => QueryOutput::Count(h.handle_async(rows, cancel).await?),
                QueryHandler::Aggregate(h) => QueryOutput::Scalar(h.handle_async(rows, cancel).await?),
                QueryHandler::Any(h) => QueryOutput::Exists(h.handle_async(rows, cancel).await?),
                QueryHandler::One(h) => QueryOutput::One(h.handle_async(rows, map, cancel).await?),
            };
            Ok(output)
        })
    }
}
