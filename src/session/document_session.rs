//! Document session: the unit of work
//!
//! A session stages writes and flushes them in one transaction, loads
//! documents by id and runs queries through the store's handler factory.
//! Every call acquires its own connection and releases it before returning.
//! Sessions are not meant to be shared between concurrent callers.

use std::any::TypeId;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compiled::CompiledQuery;
use crate::document::{Document, DocumentId, ValueId};
use crate::expression::QueryExpression;
use crate::handlers::{QueryError, QueryHandler, QueryOutput, ResultShape};
use crate::identity::{IdentityBatch, IdentityKey, IdentityMap, NullIdentityMap, TrackingIdentityMap};
use crate::selector::{IncludeJoin, Selectable};
use crate::serializer::{JsonSerializer, Serializer};
use crate::storage::{Command, DbValue, StorageError};
use crate::store::DocumentStore;

use super::errors::{SessionError, SessionResult};

type SerializeFn<S> = Box<dyn Fn(&S) -> Result<String, serde_json::Error> + Send + Sync>;

/// One staged upsert
struct StagedWrite<S> {
    doc_type: TypeId,
    type_name: &'static str,
    id: DocumentId,
    serialize: SerializeFn<S>,
}

impl<S: Serializer> StagedWrite<S> {
    fn upsert_command(&self, store: &DocumentStore<S>) -> SessionResult<Command> {
        let mapping = store.schema().storage_for(self.doc_type, self.type_name)?;
        let json = (self.serialize)(store.serializer())?;
        Ok(mapping.upsert_command(&self.id, &json)?)
    }
}

/// Unit of work over a document store
pub struct DocumentSession<'s, S: Serializer = JsonSerializer> {
    store: &'s DocumentStore<S>,
    identity: Box<dyn IdentityMap>,
    staged: Vec<StagedWrite<S>>,
}

impl<'s, S: Serializer> DocumentSession<'s, S> {
    pub(crate) fn new(store: &'s DocumentStore<S>) -> Self {
        let identity: Box<dyn IdentityMap> = if store.options().use_identity_map {
            Box::new(TrackingIdentityMap::new())
        } else {
            Box::new(NullIdentityMap)
        };
        Self {
            store,
            identity,
            staged: Vec::new(),
        }
    }

    /// Identity map backing this session
    pub fn identity_map(&self) -> &dyn IdentityMap {
        self.identity.as_ref()
    }

    /// Number of writes waiting for `save_changes`
    pub fn pending_changes(&self) -> usize {
        self.staged.len()
    }

    // ===================================================================
    // Writes
    // ===================================================================

    /// Stages `document` for upsert on the next `save_changes`
    pub fn store<T: Document>(&mut self, document: T) {
        let id = document.document_id();
        debug!(document = std::any::type_name::<T>(), id = %id, "staged document");
        self.staged.push(StagedWrite {
            doc_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            id,
            serialize: Box::new(move |serializer: &S| serializer.to_json(&document)),
        });
    }

    /// Upserts every staged document in staging order inside one transaction.
    ///
    /// Commits only if every write succeeded. On failure the transaction is
    /// rolled back, the staged writes are kept and `TransactionAborted`
    /// carries the underlying error.
    pub fn save_changes(&mut self) -> SessionResult<()> {
        if self.staged.is_empty() {
            debug!("no staged changes");
            return Ok(());
        }

        let store = self.store;
        let staged = self.staged.len();
        info!(staged, "saving staged documents");

        let mut connection = store.connections().create()?;
        connection.open()?;
        let mut transaction = connection.begin_transaction()?;

        let mut executed = 0;
        let outcome = self
            .staged
            .iter()
            .try_for_each(|write| {
                let command = write.upsert_command(store)?;
                transaction.execute(&command)?;
                executed += 1;
                Ok::<(), SessionError>(())
            })
            .and_then(|()| transaction.commit().map_err(SessionError::from));

        match outcome {
            Ok(()) => {
                self.staged.clear();
                info!(staged, "committed staged documents");
                Ok(())
            }
            Err(source) => {
                if let Err(rollback) = transaction.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                warn!(error = %source, executed, staged, "save changes aborted");
                Err(SessionError::TransactionAborted {
                    staged,
                    executed,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Async twin of `save_changes`; cancellation between writes aborts the
    /// transaction like any other failure
    pub async fn save_changes_async(&mut self, cancel: &CancellationToken) -> SessionResult<()> {
        if self.staged.is_empty() {
            debug!("no staged changes");
            return Ok(());
        }

        let store = self.store;
        let staged = self.staged.len();
        info!(staged, "saving staged documents");

        let mut connection = store.connections().create()?;
        connection.open_async().await?;
        let mut transaction = connection.begin_transaction_async().await?;

        let mut executed = 0;
        let mut outcome: SessionResult<()> = Ok(());
        for write in &self.staged {
            if cancel.is_cancelled() {
                outcome = Err(QueryError::Cancelled.into());
                break;
            }
            let result = match write.upsert_command(store) {
                Ok(command) => transaction
                    .execute_async(&command)
                    .await
                    .map(|_| ())
                    .map_err(SessionError::from),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                outcome = Err(err);
                break;
            }
            executed += 1;
        }

        let outcome = match outcome {
            Ok(()) => transaction.commit_async().await.map_err(SessionError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                self.staged.clear();
                info!(staged, "committed staged documents");
                Ok(())
            }
            Err(source) => {
                if let Err(rollback) = transaction.rollback_async().await {
                    warn!(error = %rollback, "rollback failed");
                }
                warn!(error = %source, executed, staged, "save changes aborted");
                Err(SessionError::TransactionAborted {
                    staged,
                    executed,
                    source: Box::new(source),
                })
            }
        }
    }

    pub fn delete<T: Document>(&mut self, _document: &T) -> SessionResult<()> {
        Err(SessionError::NotYetSupported("delete"))
    }

    pub fn delete_by_id<T: Document>(&mut self, _id: impl ValueId) -> SessionResult<()> {
        Err(SessionError::NotYetSupported("delete by id"))
    }

    pub fn delete_by_string<T: Document>(&mut self, _id: &str) -> SessionResult<()> {
        Err(SessionError::NotYetSupported("delete by string id"))
    }

    // ===================================================================
    // Loads
    // ===================================================================

    /// Loads one document by value-typed id; `None` when no row matches.
    ///
    /// A document already tracked by this session is returned without a
    /// round trip.
    pub fn load<T: Document>(&mut self, id: impl ValueId) -> SessionResult<Option<Arc<T>>> {
        let id = id.into_document_id();
        if let Some(tracked) = self.tracked::<T>(&id) {
            return Ok(Some(tracked));
        }

        let command = self.store.schema().mapping::<T>()?.loader_command(&id);
        debug!(document = std::any::type_name::<T>(), id = %id, "loading document");

        let value = {
            let mut connection = self.store.connections().create()?;
            connection.open()?;
            connection.execute_scalar(&command)?
        };
        self.materialize(id, value)
    }

    pub async fn load_async<T: Document>(
        &mut self,
        id: impl ValueId,
        cancel: &CancellationToken,
    ) -> SessionResult<Option<Arc<T>>> {
        let id = id.into_document_id();
        if let Some(tracked) = self.tracked::<T>(&id) {
            return Ok(Some(tracked));
        }

        let command = self.store.schema().mapping::<T>()?.loader_command(&id);
        debug!(document = std::any::type_name::<T>(), id = %id, "loading document");

        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled.into());
        }
        let value = {
            let mut connection = self.store.connections().create()?;
            connection.open_async().await?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueryError::Cancelled.into()),
                value = connection.execute_scalar_async(&command) => value?,
            }
        };
        self.materialize(id, value)
    }

    pub fn load_by_string<T: Document>(&mut self, _id: &str) -> SessionResult<Option<Arc<T>>> {
        Err(SessionError::NotYetSupported("load by string id"))
    }

    pub fn load_many<T: Document, I: ValueId>(
        &mut self,
        _ids: impl IntoIterator<Item = I>,
    ) -> SessionResult<Vec<Arc<T>>> {
        Err(SessionError::NotYetSupported("batch load"))
    }

    fn tracked<T: Document>(&self, id: &DocumentId) -> Option<Arc<T>> {
        let hit = self
            .identity
            .get(&IdentityKey::of::<T>(id.clone()))
            .and_then(|entity| entity.downcast::<T>().ok());
        if hit.is_some() {
            debug!(document = std::any::type_name::<T>(), id = %id, "identity map hit");
        }
        hit
    }

    fn materialize<T: Document>(&mut self, id: DocumentId, value: Option<DbValue>) -> SessionResult<Option<Arc<T>>> {
        let json = match value {
            None | Some(DbValue::Null) => return Ok(None),
            Some(DbValue::Text(text)) => text,
            Some(DbValue::Json(json)) => json.to_string(),
            Some(other) => {
                return Err(StorageError::decode(
                    0,
                    format!("expected a json payload, found {}", other.db_type()),
                )
                .into())
            }
        };
        let document: T = self.store.serializer().from_json(&json)?;

        let mut batch = IdentityBatch::new(self.identity.as_mut());
        let document = batch.resolve(id, move || Ok(document))?;
        batch.commit();
        Ok(Some(document))
    }

    // ===================================================================
    // Queries
    // ===================================================================

    /// Runs `query` and returns the output of the handler the factory picked
    pub fn query<T: Selectable>(
        &mut self,
        query: &QueryExpression,
        shape: ResultShape,
    ) -> SessionResult<QueryOutput<T>> {
        self.query_with_includes(query, shape, &[])
    }

    /// Same as `query`, side-loading related documents through `includes`
    pub fn query_with_includes<T: Selectable>(
        &mut self,
        query: &QueryExpression,
        shape: ResultShape,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> SessionResult<QueryOutput<T>> {
        let handler = self.store.handler_factory().build::<T>(query, shape, includes)?;
        let command = handler.configure_command();
        self.execute(&handler, &command)
    }

    pub async fn query_async<T: Selectable>(
        &mut self,
        query: &QueryExpression,
        shape: ResultShape,
        cancel: &CancellationToken,
    ) -> SessionResult<QueryOutput<T>> {
        let handler = self.store.handler_factory().build::<T>(query, shape, &[])?;
        let command = handler.configure_command();
        self.execute_async(&handler, &command, cancel).await
    }

    /// Runs a compiled query bound to `template`
    pub fn query_compiled<Q: CompiledQuery>(&mut self, template: &Q) -> SessionResult<QueryOutput<Q::Output>> {
        let compiled = self.store.handler_factory().handler_for(template)?;
        self.execute(compiled.handler(), compiled.command())
    }

    pub async fn query_compiled_async<Q: CompiledQuery>(
        &mut self,
        template: &Q,
        cancel: &CancellationToken,
    ) -> SessionResult<QueryOutput<Q::Output>> {
        let compiled = self.store.handler_factory().handler_for(template)?;
        self.execute_async(compiled.handler(), compiled.command(), cancel)
            .await
    }

    pub fn to_list<T: Selectable>(&mut self, query: &QueryExpression) -> SessionResult<Vec<T>> {
        Ok(self.query::<T>(query, ResultShape::List)?.into_list()?)
    }

    pub async fn to_list_async<T: Selectable>(
        &mut self,
        query: &QueryExpression,
        cancel: &CancellationToken,
    ) -> SessionResult<Vec<T>> {
        Ok(self
            .query_async::<T>(query, ResultShape::List, cancel)
            .await?
            .into_list()?)
    }

    pub fn count(&mut self, query: &QueryExpression) -> SessionResult<i64> {
        Ok(self
            .query::<i64>(&query.clone().count(), ResultShape::Value)?
            .into_count()?)
    }

    pub fn any(&mut self, query: &QueryExpression) -> SessionResult<bool> {
        Ok(self
            .query::<bool>(&query.clone().any(), ResultShape::Value)?
            .into_bool()?)
    }

    /// First match; fails with `NotFound` on an empty result
    pub fn first<T: Selectable>(&mut self, query: &QueryExpression) -> SessionResult<T> {
        self.one(&query.clone().first())
    }

    pub fn first_or_default<T: Selectable>(&mut self, query: &QueryExpression) -> SessionResult<Option<T>> {
        Ok(self
            .query::<T>(&query.clone().first_or_default(), ResultShape::Value)?
            .into_one()?)
    }

    /// Only match; fails with `NotFound` or `Cardinality`
    pub fn single<T: Selectable>(&mut self, query: &QueryExpression) -> SessionResult<T> {
        self.one(&query.clone().single())
    }

    pub fn single_or_default<T: Selectable>(&mut self, query: &QueryExpression) -> SessionResult<Option<T>> {
        Ok(self
            .query::<T>(&query.clone().single_or_default(), ResultShape::Value)?
            .into_one()?)
    }

    fn one<T: Selectable>(&mut self, query: &QueryExpression) -> SessionResult<T> {
        self.query::<T>(query, ResultShape::Value)?
            .into_one()?
            .ok_or_else(|| {
                QueryError::NotFound {
                    document: query.document_name(),
                }
                .into()
            })
    }

    fn execute<T: Selectable>(
        &mut self,
        handler: &QueryHandler<T>,
        command: &Command,
    ) -> SessionResult<QueryOutput<T>> {
        debug!(
            kind = handler.kind().as_str(),
            sql = command.sql(),
            parameters = command.parameters().len(),
            "executing query"
        );
        let mut connection = self.store.connections().create()?;
        connection.open()?;
        let mut rows = connection.query(command)?;
        Ok(handler.handle(rows.as_mut(), self.identity.as_mut())?)
    }

    async fn execute_async<T: Selectable>(
        &mut self,
        handler: &QueryHandler<T>,
        command: &Command,
        cancel: &CancellationToken,
    ) -> SessionResult<QueryOutput<T>> {
        debug!(
            kind = handler.kind().as_str(),
            sql = command.sql(),
            parameters = command.parameters().len(),
            "executing query"
        );
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled.into());
        }
        let mut connection = self.store.connections().create()?;
        connection.open_async().await?;
        let mut rows = connection.query_async(command).await?;
        Ok(handler
            .handle_async(rows.as_mut(), self.identity.as_mut(), cancel)
            .await?)
    }
}
