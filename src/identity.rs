//! Identity maps
//!
//! An identity map makes repeated loads of the same logical document within
//! one session yield the same `Arc`. Decoding never writes to the map
//! directly: registrations are staged in an `IdentityBatch` and applied only
//! when the whole result set decoded successfully, so a cancelled or failed
//! decode leaves the map untouched.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::document::{Document, DocumentId};
use crate::handlers::{QueryError, QueryResult};

/// Type-erased tracked entity
pub type TrackedEntity = Arc<dyn Any + Send + Sync>;

/// Key of a tracked document: its type and identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    doc_type: TypeId,
    id: DocumentId,
}

impl IdentityKey {
    pub fn of<D: Document>(id: DocumentId) -> Self {
        Self {
            doc_type: TypeId::of::<D>(),
            id,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Lookup and registration contract consumed by selectors
pub trait IdentityMap: Send {
    /// Returns the tracked entity for `key`, if any
    fn get(&self, key: &IdentityKey) -> Option<TrackedEntity>;

    /// Tracks `entity` under `key`, replacing any previous entry
    fn register(&mut self, key: IdentityKey, entity: TrackedEntity);

    /// Number of tracked entities
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether lookups can ever hit
    fn is_tracking(&self) -> bool {
        true
    }
}

/// Identity map backed by a hash map
#[derive(Default)]
pub struct TrackingIdentityMap {
    entries: HashMap<IdentityKey, TrackedEntity>,
}

impl TrackingIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed lookup
    pub fn find<D: Document>(&self, id: impl Into<DocumentId>) -> Option<Arc<D>> {
        self.get(&IdentityKey::of::<D>(id.into()))
            .and_then(|entity| entity.downcast::<D>().ok())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for TrackingIdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingIdentityMap")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl IdentityMap for TrackingIdentityMap {
    fn get(&self, key: &IdentityKey) -> Option<TrackedEntity> {
        self.entries.get(key).cloned()
    }

    fn register(&mut self, key: IdentityKey, entity: TrackedEntity) {
        self.entries.insert(key, entity);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Identity map that tracks nothing; every decode yields a fresh instance
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIdentityMap;

impl IdentityMap for NullIdentityMap {
    fn get(&self, _key: &IdentityKey) -> Option<TrackedEntity> {
        None
    }

    fn register(&mut self, _key: IdentityKey, _entity: TrackedEntity) {}

    fn len(&self) -> usize {
        0
    }

    fn is_tracking(&self) -> bool {
        false
    }
}

type Deferred = Box<dyn FnOnce() + Send>;

/// Registrations and callbacks staged while one result set is decoded
pub struct IdentityBatch<'a> {
    map: &'a mut dyn IdentityMap,
    staged: HashMap<IdentityKey, TrackedEntity>,
    order: Vec<IdentityKey>,
    deferred: Vec<Deferred>,
}

impl<'a> IdentityBatch<'a> {
    pub fn new(map: &'a mut dyn IdentityMap) -> Self {
        Self {
            map,
            staged: HashMap::new(),
            order: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Returns the tracked instance for `id`, or decodes and stages a new one.
    ///
    /// `decode` is not called on a hit.
    pub fn resolve<D, F>(&mut self, id: DocumentId, decode: F) -> QueryResult<Arc<D>>
    where
        D: Document,
        F: FnOnce() -> QueryResult<D>,
    {
        if !self.map.is_tracking() {
            return decode().map(Arc::new);
        }

        let key = IdentityKey::of::<D>(id);
        if let Some(entity) = self.staged.get(&key).cloned().or_else(|| self.map.get(&key)) {
            return entity.downcast::<D>().map_err(|_| {
                QueryError::internal(format!(
                    "identity map entry for {} holds another type",
                    std::any::type_name::<D>()
                ))
            });
        }

        let document = Arc::new(decode()?);
        self.order.push(key.clone());
        self.staged.insert(key, Arc::clone(&document) as TrackedEntity);
        Ok(document)
    }

    /// Runs `callback` after the batch commits
    pub fn defer(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.deferred.push(Box::new(callback));
    }

    /// Number of staged registrations
    pub fn staged(&self) -> usize {
        self.order.len()
    }

    /// Applies staged registrations, then runs deferred callbacks in order.
    ///
    /// Dropping the batch without committing discards both.
    pub fn commit(mut self) {
        for key in self.order.drain(..) {
            if let Some(entity) = self.staged.remove(&key) {
                self.map.register(key, entity);
            }
        }
        for callback in self.deferred.drain(..) {
            callback();
        }
    }
}
