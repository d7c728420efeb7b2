//! List and enumerable handlers

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::expression::QueryExpression;
use crate::identity::{IdentityBatch, IdentityMap};
use crate::schema::{DocumentMapping, DocumentSchema};
use crate::selector::{with_includes, IncludeJoin, Selectable, Selector};
use crate::storage::{Command, RowCursor};

use super::errors::QueryResult;
use super::statement::{append_order, append_paging, append_where, read_rows, read_rows_async};

/// Eager, ordered sequence of every matching row
pub struct ListHandler<T> {
    mapping: Arc<DocumentMapping>,
    query: QueryExpression,
    selector: Box<dyn Selector<T>>,
}

impl<T: Selectable> ListHandler<T> {
    pub fn new(
        schema: &DocumentSchema,
        query: &QueryExpression,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> QueryResult<Self> {
        let mapping = schema.mapping_for(query)?;
        let selector = with_includes(mapping.build_selector::<T>(query)?, &mapping, includes);
        Ok(Self {
            mapping,
            query: query.clone(),
            selector,
        })
    }

    /// `select ... from ... [joins] [where] [order by] [limit] [offset]`
    pub fn configure_command(&self) -> Command {
        self.configure_with_limit(self.query.limit)
    }

    pub(crate) fn configure_with_limit(&self, limit: Option<u64>) -> Command {
        let mut command = Command::new();
        command.append_query(&self.selector.to_select_clause(&self.mapping));
        append_where(&mut command, &self.mapping, &self.query);
        append_order(&mut command, &self.mapping, &self.query.ordering);
        append_paging(&mut command, limit, self.query.offset);
        command
    }

    pub fn handle(&self, rows: &mut dyn RowCursor, map: &mut dyn IdentityMap) -> QueryResult<Vec<T>> {
        let mut batch = IdentityBatch::new(map);
        let items = read_rows(self.selector.as_ref(), rows, &mut batch, None)?;
        batch.commit();
        Ok(items)
    }

    pub async fn handle_async(
        &self,
        rows: &mut dyn RowCursor,
        map: &mut dyn IdentityMap,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<T>> {
        let mut batch = IdentityBatch::new(map);
        let items = read_rows_async(self.selector.as_ref(), rows, &mut batch, None, cancel).await?;
        batch.commit();
        Ok(items)
    }

    /// Decodes at most `cap` rows, leaving the commit to the caller
    pub(crate) fn read(
        &self,
        rows: &mut dyn RowCursor,
        batch: &mut IdentityBatch<'_>,
        cap: usize,
    ) -> QueryResult<Vec<T>> {
        read_rows(self.selector.as_ref(), rows, batch, Some(cap))
    }

    pub(crate) async fn read_async(
        &self,
        rows: &mut dyn RowCursor,
        batch: &mut IdentityBatch<'_>,
        cap: usize,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<T>> {
        read_rows_async(self.selector.as_ref(), rows, batch, Some(cap), cancel).await
    }

    pub(crate) fn document_name(&self) -> &'static str {
        self.query.document_name()
    }
}

/// Same command and decoding as `ListHandler`, handed out as an iterator
pub struct EnumerableHandler<T> {
    inner: ListHandler<T>,
}

impl<T: Selectable> EnumerableHandler<T> {
    pub fn new(
        schema: &DocumentSchema,
        query: &QueryExpression,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> QueryResult<Self> {
        Ok(Self {
            inner: ListHandler::new(schema, query, includes)?,
        })
    }

    pub fn configure_command(&self) -> Command {
        self.inner.configure_command()
    }

    pub fn handle(
        &self,
        rows: &mut dyn RowCursor,
        map: &mut dyn IdentityMap,
    ) -> QueryResult<std::vec::IntoIter<T>> {
        self.inner.handle(rows, map).map(Vec::into_iter)
    }

    pub async fn handle_async(
        &self,
        rows: &mut dyn RowCursor,
        map: &mut dyn IdentityMap,
        cancel: &CancellationToken,
    ) -> QueryResult<std::vec::IntoIter<T>> {
        self.inner
            .handle_async(rows, map, cancel)
            .await
            .map(Vec::into_iter)
    }
}
