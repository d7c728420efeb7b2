//! Scripted in-process backend
//!
//! Serves queued result sets in order, records every executed command, and
//! keeps transaction outcomes so callers can observe exactly what a flush
//! committed. Used by the crate's own tests and, behind the `testing`
//! feature, by downstream test suites.
//!
//! Writes only become visible in `committed_commands` after `commit`; a
//! transaction dropped without commit counts as a rollback.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::command::{Command, DbValue, Row};
use super::connection::{BoxFuture, Connection, ConnectionFactory, RowCursor, Transaction};
use super::errors::{StorageError, StorageResult};

/// Outcome served for the next query or scalar command
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    Rows(Vec<Row>),
    Failure(String),
}

#[derive(Debug, Default)]
struct ScriptState {
    results: VecDeque<ScriptedResult>,
    executed: Vec<Command>,
    committed: Vec<Command>,
    fail_write_at: Option<usize>,
    writes_seen: usize,
    commits: usize,
    rollbacks: usize,
    connections_created: usize,
    open_connections: usize,
}

/// Connection factory over a shared script
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnectionFactory {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result set for the next query
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.inspect(|s| s.results.push_back(ScriptedResult::Rows(rows)));
    }

    /// Queue a failure for the next query
    pub fn push_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.inspect(|s| s.results.push_back(ScriptedResult::Failure(reason)));
    }

    /// Fail the `n`-th transactional write from now (1-based)
    pub fn fail_write(&self, n: usize) {
        self.inspect(|s| {
            s.fail_write_at = Some(s.writes_seen + n);
        });
    }

    /// Every command handed to a connection or transaction, in order
    pub fn executed_commands(&self) -> Vec<Command> {
        self.inspect(|s| s.executed.clone())
    }

    /// Writes that belong to committed transactions
    pub fn committed_commands(&self) -> Vec<Command> {
        self.inspect(|s| s.committed.clone())
    }

    pub fn commits(&self) -> usize {
        self.inspect(|s| s.commits)
    }

    pub fn rollbacks(&self) -> usize {
        self.inspect(|s| s.rollbacks)
    }

    pub fn connections_created(&self) -> usize {
        self.inspect(|s| s.connections_created)
    }

    /// Connections opened and not yet dropped
    pub fn open_connections(&self) -> usize {
        self.inspect(|s| s.open_connections)
    }

    fn inspect<R>(&self, f: impl FnOnce(&mut ScriptState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl ConnectionFactory for ScriptedConnectionFactory {
    fn create(&self) -> StorageResult<Box<dyn Connection>> {
        self.inspect(|s| s.connections_created += 1);
        Ok(Box::new(ScriptedConnection {
            state: Arc::clone(&self.state),
            opened: false,
        }))
    }
}

fn lock(state: &Mutex<ScriptState>) -> StorageResult<MutexGuard<'_, ScriptState>> {
    state
        .lock()
        .map_err(|_| StorageError::Connection("scripted backend state poisoned".into()))
}

struct ScriptedConnection {
    state: Arc<Mutex<ScriptState>>,
    opened: bool,
}

impl ScriptedConnection {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.opened {
            Ok(())
        } else {
            Err(StorageError::Connection("connection is not open".into()))
        }
    }

    fn next_result(&self, command: &Command) -> StorageResult<Vec<Row>> {
        self.ensure_open()?;
        let mut state = lock(&self.state)?;
        state.executed.push(command.clone());
        match state.results.pop_front() {
            Some(ScriptedResult::Rows(rows)) => Ok(rows),
            Some(ScriptedResult::Failure(reason)) => Err(StorageError::command(command.sql(), reason)),
            None => Ok(Vec::new()),
        }
    }
}

impl Connection for ScriptedConnection {
    fn open(&mut self) -> StorageResult<()> {
        if !self.opened {
            lock(&self.state)?.open_connections += 1;
            self.opened = true;
        }
        Ok(())
    }

    fn query(&mut self, command: &Command) -> StorageResult<Box<dyn RowCursor + '_>> {
        let rows = self.next_result(command)?;
        Ok(Box::new(ScriptedCursor { rows: rows.into() }))
    }

    fn execute_scalar(&mut self, command: &Command) -> StorageResult<Option<DbValue>> {
        let rows = self.next_result(command)?;
        match rows.into_iter().next() {
            Some(mut row) if !row.is_empty() => {
                let value = row.take(0)?;
                Ok(if value.is_null() { None } else { Some(value) })
            }
            _ => Ok(None),
        }
    }

    fn begin_transaction(&mut self) -> StorageResult<Box<dyn Transaction + '_>> {
        self.ensure_open()?;
        Ok(Box::new(ScriptedTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            finished: false,
        }))
    }

    fn open_async(&mut self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { self.open() })
    }

    fn query_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> BoxFuture<'a, StorageResult<Box<dyn RowCursor + 'a>>> {
        Box::pin(async move {
            let rows = self.next_result(command)?;
            Ok(Box::new(ScriptedCursor { rows: rows.into() }) as Box<dyn RowCursor + 'a>)
        })
    }

    fn execute_scalar_async<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> BoxFuture<'a, StorageResult<Option<DbValue>>> {
        Box::pin(async move { self.execute_scalar(command) })
    }

    fn begin_transaction_async(&mut self) -> BoxFuture<'_, StorageResult<Box<dyn Transaction + '_>>> {
        Box::pin(async move {
            self.ensure_open()?;
            Ok(Box::new(ScriptedTransaction {
                state: Arc::clone(&self.state),
                pending: Vec::new(),
                finished: false,
            }) as Box<dyn Transaction + '_>)
        })
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        if self.opened {
            if let Ok(mut state) = self.state.lock() {
                state.open_connections = state.open_connections.saturating_sub(1);
            }
        }
    }
}

struct ScriptedTransaction {
    state: Arc<Mutex<ScriptState>>,
    pending: Vec<Command>,
    finished: bool,
}

impl ScriptedTransaction {
    fn ensure_active(&self) -> StorageResult<()> {
        if self.finished {
            Err(StorageError::Transaction("transaction already completed".into()))
        } else {
            Ok(())
        }
    }
}

impl Transaction for ScriptedTransaction {
    fn execute(&mut self, command: &Command) -> StorageResult<u64> {
        self.ensure_active()?;
        let mut state = lock(&self.state)?;
        state.executed.push(command.clone());
        state.writes_seen += 1;
        if state.fail_write_at == Some(state.writes_seen) {
            return Err(StorageError::command(command.sql(), "scripted write failure"));
        }
        drop(state);
        self.pending.push(command.clone());
        Ok(1)
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        let mut state = lock(&self.state)?;
        state.committed.append(&mut self.pending);
        state.commits += 1;
        self.finished = true;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        lock(&self.state)?.rollbacks += 1;
        self.pending.clear();
        self.finished = true;
        Ok(())
    }

    fn execute_async<'a>(&'a mut self, command: &'a Command) -> BoxFuture<'a, StorageResult<u64>> {
        Box::pin(async move { self.execute(command) })
    }

    fn commit_async(&mut self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { self.commit() })
    }

    fn rollback_async(&mut self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { self.rollback() })
    }
}

impl Drop for ScriptedTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Ok(mut state) = self.state.lock() {
                state.rollbacks += 1;
            }
        }
    }
}

struct ScriptedCursor {
    rows: VecDeque<Row>,
}

impl RowCursor for ScriptedCursor {
    fn next_row(&mut self) -> StorageResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn next_row_async(&mut self) -> BoxFuture<'_, StorageResult<Option<Row>>> {
        Box::pin(async move { self.next_row() })
    }
}
