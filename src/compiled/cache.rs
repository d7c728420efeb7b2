//! Compiled query cache
//!
//! One entry per template type, holding the command shape, its parameter
//! setters and the handler that configured the command. Entries are built
//! outside the lock; when two callers race on a first build, the first
//! insert wins and both receive that entry. Entries are never evicted.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::handlers::{QueryError, QueryHandler, QueryOutput, QueryResult};
use crate::identity::IdentityMap;
use crate::selector::Selectable;
use crate::storage::{BoxFuture, Command, RowCursor};

use super::setters::ParameterSetter;
use super::template::CompiledQuery;

/// Translated form of one template type
pub struct CachedQuery<Q: CompiledQuery> {
    command: Command,
    setters: Vec<ParameterSetter<Q>>,
    handler: Arc<QueryHandler<Q::Output>>,
}

impl<Q: CompiledQuery> CachedQuery<Q> {
    pub fn new(
        command: Command,
        setters: Vec<ParameterSetter<Q>>,
        handler: QueryHandler<Q::Output>,
    ) -> Self {
        Self {
            command,
            setters,
            handler: Arc::new(handler),
        }
    }

    /// Command shape with member slots still unbound
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn setters(&self) -> &[ParameterSetter<Q>] {
        &self.setters
    }

    /// Clones the command shape and binds `template`'s values into it
    pub fn bind(&self, template: &Q) -> QueryResult<CompiledHandler<Q::Output>> {
        let mut command = self.command.clone();
        for setter in &self.setters {
            setter.apply(template, &mut command)?;
        }
        Ok(CompiledHandler {
            command,
            handler: Arc::clone(&self.handler),
        })
    }
}

/// Shared handler plus a command bound to one template instance
pub struct CompiledHandler<T> {
    command: Command,
    handler: Arc<QueryHandler<T>>,
}

impl<T: Selectable> CompiledHandler<T> {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn handler(&self) -> &QueryHandler<T> {
        &self.handler
    }

    pub fn handle(&self, rows: &mut dyn RowCursor, map: &mut dyn IdentityMap) -> QueryResult<QueryOutput<T>> {
        self.handler.handle(rows, map)
    }

    pub fn handle_async<'a>(
        &'a self,
        rows: &'a mut dyn RowCursor,
        map: &'a mut dyn IdentityMap,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, QueryResult<QueryOutput<T>>> {
        self.handler.handle_async(rows, map, cancel)
    }
}

type CacheEntry = Arc<dyn Any + Send + Sync>;

/// Per-template-type cache of translated queries
#[derive(Default)]
pub struct CompiledQueryCache {
    entries: RwLock<HashMap<TypeId, CacheEntry>>,
}

impl CompiledQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `Q`, calling `build` on a miss
    pub fn get_or_build<Q, F>(&self, build: F) -> QueryResult<Arc<CachedQuery<Q>>>
    where
        Q: CompiledQuery,
        F: FnOnce() -> QueryResult<CachedQuery<Q>>,
    {
        let key = TypeId::of::<Q>();
        let template = std::any::type_name::<Q>();

        let hit = self.read()?.get(&key).cloned();
        if let Some(entry) = hit {
            debug!(template, "compiled query cache hit");
            return downcast(entry);
        }

        debug!(template, "compiled query cache miss");
        let built: CacheEntry = Arc::new(build()?);
        let entry = Arc::clone(self.write()?.entry(key).or_insert(built));
        downcast(entry)
    }

    /// Whether `Q` has been translated
    pub fn contains<Q: CompiledQuery>(&self) -> bool {
        self.read()
            .map(|entries| entries.contains_key(&TypeId::of::<Q>()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> QueryResult<RwLockReadGuard<'_, HashMap<TypeId, CacheEntry>>> {
        self.entries
            .read()
            .map_err(|_| QueryError::internal("compiled query cache lock poisoned"))
    }

    fn write(&self) -> QueryResult<RwLockWriteGuard<'_, HashMap<TypeId, CacheEntry>>> {
        self.entries
            .write()
            .map_err(|_| QueryError::internal("compiled query cache lock poisoned"))
    }
}

impl fmt::Debug for CompiledQueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQueryCache")
            .field("entries", &self.len())
            .finish()
    }
}

fn downcast<Q: CompiledQuery>(entry: CacheEntry) -> QueryResult<Arc<CachedQuery<Q>>> {
    entry.downcast::<CachedQuery<Q>>().map_err(|_| {
        QueryError::internal(format!(
            "compiled query cache entry for {} has another type",
            std::any::type_name::<Q>()
        ))
    })
}
