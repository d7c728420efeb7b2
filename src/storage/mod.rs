//! Storage backend contracts for docstash
//!
//! The backing store is relational: one table per document type with an id
//! column and a JSON payload column. This module only defines what the query
//! pipeline and the unit of work consume from it.
//!
//! # Resource Rules
//!
//! - Commands carry no connection; they are handed to one at execution time
//! - Connections and transactions are scoped to the operation that acquired them
//! - A transaction dropped without commit is rolled back
//! - Cursors are forward-only

mod command;
mod connection;
mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use command::{Command, CommandParameter, DbType, DbValue, Row};
pub use connection::{BoxFuture, Connection, ConnectionFactory, RowCursor, Transaction};
pub use errors::{StorageError, StorageResult};
