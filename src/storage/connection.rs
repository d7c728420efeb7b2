//! Backend contracts consumed by the query pipeline and the unit of work
//!
//! Every blocking operation has an awaitable twin with identical semantics.
//! Connections and transactions never outlive the call that acquired them:
//! a transaction dropped without `commit` is rolled back by the backend.

use std::future::Future;
use std::pin::Pin;

use super::command::{Command, DbValue, Row};
use super::errors::StorageResult;

/// Boxed future returned by the async twins
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Creates connections to the backing store
pub trait ConnectionFactory: Send + Sync {
    /// Create a new, unopened connection
    fn create(&self) -> StorageResult<Box<dyn Connection>>;
}

/// A single connection to the backing store
pub trait Connection: Send {
    /// Open the connection
    fn open(&mut self) -> StorageResult<()>;

    /// Execute a command and return a forward-only cursor over its rows
    fn query(&mut self, command: &Command) -> StorageResult<Box<dyn RowCursor + '_>>;

    /// Execute a command and return the first column of the first row
    fn execute_scalar(&mut self, command: &Command) -> StorageResult<Option<DbValue>>;

    /// Begin a transaction scoped to this connection
    fn begin_transaction(&mut self) -> StorageResult<Box<dyn Transaction + '_>>;

    fn open_async(&mut self) -> BoxFuture<'_, StorageResult<()>>;

    fn query_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> BoxFuture<'a, StorageResult<Box<dyn RowCursor + 'a>>>;

    fn execute_scalar_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> BoxFuture<'a, StorageResult<Option<DbValue>>>;

    fn begin_transaction_async(&mut self) -> BoxFuture<'_, StorageResult<Box<dyn Transaction + '_>>>;
}

/// A transaction bound to one connection
pub trait Transaction: Send {
    /// Execute a write command inside the transaction, returning affected rows
    fn execute(&mut self, command: &Command) -> StorageResult<u64>;

    /// Commit all writes executed so far
    fn commit(&mut self) -> StorageResult<()>;

    /// Discard all writes executed so far
    fn rollback(&mut self) -> StorageResult<()>;

    fn execute_async<'a>(&'a mut self, command: &'a Command) -> BoxFuture<'a, StorageResult<u64>>;

    fn commit_async(&mut self) -> BoxFuture<'_, StorageResult<()>>;

    fn rollback_async(&mut self) -> BoxFuture<'_, StorageResult<()>>;
}

/// Forward-only row cursor
pub trait RowCursor: Send {
    /// Read the next row, or `None` once the result set is exhausted
    fn next_row(&mut self) -> StorageResult<Option<Row>>;

    fn next_row_async(&mut self) -> BoxFuture<'_, StorageResult<Option<Row>>>;
}
