//! Include side-loading
//!
//! An include adds a `left outer join` on a related document table and two
//! extra columns per row. Each related document is resolved through the
//! identity map and handed to a callback once the result set committed.

use std::fmt;
use std::sync::Arc;

use crate::document::{Document, DocumentId};
use crate::handlers::QueryResult;
use crate::identity::IdentityBatch;
use crate::schema::{DocumentMapping, DocumentSchema, SchemaResult};
use crate::storage::Row;

use super::document::decode_document;
use super::Selector;

/// A related document join added to a list or one-result query
pub trait IncludeJoin: Send + Sync {
    /// Join clause for the include at position `index`
    fn join_clause(&self, parent: &DocumentMapping, index: usize) -> String;

    /// Columns read for the include at position `index`
    fn columns(&self, index: usize) -> Vec<String>;

    /// Reads this include's columns starting at `start`
    fn read(&self, row: &mut Row, start: usize, batch: &mut IdentityBatch<'_>) -> QueryResult<()>;
}

type IncludeCallback<R> = Arc<dyn Fn(Arc<R>) + Send + Sync>;

/// Include of related document `R` referenced by a field of the parent
pub struct Include<R: Document> {
    related: Arc<DocumentMapping>,
    field: String,
    callback: IncludeCallback<R>,
}

impl<R: Document> Include<R> {
    /// `field` holds the related document's id inside the parent payload
    pub fn new<F>(schema: &DocumentSchema, field: impl Into<String>, callback: F) -> SchemaResult<Self>
    where
        F: Fn(Arc<R>) + Send + Sync + 'static,
    {
        Ok(Self {
            related: schema.mapping::<R>()?,
            field: field.into(),
            callback: Arc::new(callback),
        })
    }

    fn table_alias(index: usize) -> String {
        format!("i{}", index)
    }
}

impl<R: Document> fmt::Debug for Include<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Include")
            .field("related", &self.related.type_name())
            .field("field", &self.field)
            .finish()
    }
}

impl<R: Document> IncludeJoin for Include<R> {
    fn join_clause(&self, parent: &DocumentMapping, index: usize) -> String {
        let alias = Self::table_alias(index);
        format!(
            "left outer join {} as {} on {} = {}.id",
            self.related.qualified_table_name(),
            alias,
            parent.field_locator(&self.field, R::ID_TYPE),
            alias
        )
    }

    fn columns(&self, index: usize) -> Vec<String> {
        let alias = Self::table_alias(index);
        vec![format!("{}.data", alias), format!("{}.id", alias)]
    }

    fn read(&self, row: &mut Row, start: usize, batch: &mut IdentityBatch<'_>) -> QueryResult<()> {
        // Unmatched outer join
        let Some(id) = DocumentId::from_db_value(row.get(start + 1)?) else {
            return Ok(());
        };

        let payload = row.take(start)?;
        let related = batch.resolve(id, move || decode_document::<R>(payload, start))?;
        let callback = Arc::clone(&self.callback);
        batch.defer(move || callback(related));
        Ok(())
    }
}

/// Wraps a selector with include joins
pub struct IncludeSelector<T> {
    inner: Box<dyn Selector<T>>,
    includes: Vec<Arc<dyn IncludeJoin>>,
    joins: Vec<String>,
    offsets: Vec<usize>,
}

impl<T> IncludeSelector<T> {
    pub fn new(
        inner: Box<dyn Selector<T>>,
        parent: &DocumentMapping,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> Self {
        let mut offset = inner.select_fields().len();
        let mut offsets = Vec::with_capacity(includes.len());
        let mut joins = inner.joins();

        for (index, include) in includes.iter().enumerate() {
            offsets.push(offset);
            offset += include.columns(index).len();
            joins.push(include.join_clause(parent, index));
        }

        Self {
            inner,
            includes: includes.to_vec(),
            joins,
            offsets,
        }
    }
}

impl<T: Send + 'static> Selector<T> for IncludeSelector<T> {
    fn select_fields(&self) -> Vec<String> {
        let mut fields = self.inner.select_fields();
        for (index, include) in self.includes.iter().enumerate() {
            fields.extend(include.columns(index));
        }
        fields
    }

    fn joins(&self) -> Vec<String> {
        self.joins.clone()
    }

    fn resolve(&self, row: &mut Row, batch: &mut IdentityBatch<'_>) -> QueryResult<T> {
        let value = self.inner.resolve(row, batch)?;
        for (include, start) in self.includes.iter().zip(&self.offsets) {
            include.read(row, *start, batch)?;
        }
        Ok(value)
    }
}

/// Returns `inner` unchanged when there are no includes
pub fn with_includes<T: Send + 'static>(
    inner: Box<dyn Selector<T>>,
    parent: &DocumentMapping,
    includes: &[Arc<dyn IncludeJoin>],
) -> Box<dyn Selector<T>> {
    if includes.is_empty() {
        inner
    } else {
        Box::new(IncludeSelector::new(inner, parent, includes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::expression::QueryExpression;
    use crate::identity::{IdentityMap, TrackingIdentityMap};
    use crate::selector::Selectable;
    use crate::storage::{DbType, DbValue};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Serialize, Deserialize)]
    struct Issue {
        id: i64,
        assignee_id: Option<i64>,
    }

    impl Document for Issue {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct User {
        id: i64,
        name: String,
    }

    impl Document for User {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    fn schema() -> DocumentSchema {
        let mut schema = DocumentSchema::new(StoreOptions::default());
        schema.register::<Issue>().unwrap();
        schema.register::<User>().unwrap();
        schema
    }

    #[test]
    fn test_include_widens_select_clause() {
        let schema = schema();
        let parent = schema.mapping::<Issue>().unwrap();
        let include: Arc<dyn IncludeJoin> =
            Arc::new(Include::<User>::new(&schema, "assignee_id", |_| {}).unwrap());

        let inner = Arc::<Issue>::build_selector(&parent, &QueryExpression::for_document::<Issue>())
            .unwrap();
        let selector = with_includes(inner, &parent, &[include]);

        assert_eq!(
            selector.to_select_clause(&parent),
            "select d.data, d.id, i0.data, i0.id from public.mt_doc_issue as d \
             left outer join public.mt_doc_user as i0 on CAST(d.data ->> 'assignee_id' as bigint) = i0.id"
        );
    }

    #[test]
    fn test_callbacks_run_after_commit() {
        let schema = schema();
        let parent = schema.mapping::<Issue>().unwrap();
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let include: Arc<dyn IncludeJoin> = Arc::new(
            Include::<User>::new(&schema, "assignee_id", move |user: Arc<User>| {
                sink.lock().unwrap().push(user.name.clone());
            })
            .unwrap(),
        );

        let inner = Arc::<Issue>::build_selector(&parent, &QueryExpression::for_document::<Issue>())
            .unwrap();
        let selector = with_includes(inner, &parent, &[include]);

        let mut map = TrackingIdentityMap::new();
        let mut batch = IdentityBatch::new(&mut map);
        let mut matched = Row::new(vec![
            DbValue::Json(json!({"id": 1, "assignee_id": 7})),
            DbValue::Int(1),
            DbValue::Json(json!({"id": 7, "name": "Ann"})),
            DbValue::Int(7),
        ]);
        let mut unmatched = Row::new(vec![
            DbValue::Json(json!({"id": 2, "assignee_id": null})),
            DbValue::Int(2),
            DbValue::Null,
            DbValue::Null,
        ]);
        selector.resolve(&mut matched, &mut batch).unwrap();
        selector.resolve(&mut unmatched, &mut batch).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        batch.commit();
        assert_eq!(*seen.lock().unwrap(), vec!["Ann".to_string()]);
        assert_eq!(map.len(), 3);
    }
}
