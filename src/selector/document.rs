//! Whole-document selector

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::document::{Document, DocumentId};
use crate::expression::QueryExpression;
use crate::handlers::{QueryError, QueryResult};
use crate::identity::IdentityBatch;
use crate::schema::DocumentMapping;
use crate::storage::{DbValue, Row};

use super::field::FieldSelector;
use super::{Selectable, Selector};

/// Reads `data, id` and resolves the document through the identity map
pub struct DocumentSelector<D> {
    fields: Vec<String>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> DocumentSelector<D> {
    pub fn new(mapping: &DocumentMapping) -> Self {
        Self {
            fields: mapping.select_fields(),
            _marker: PhantomData,
        }
    }
}

impl<D: Document> Selector<Arc<D>> for DocumentSelector<D> {
    fn select_fields(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn resolve(&self, row: &mut Row, batch: &mut IdentityBatch<'_>) -> QueryResult<Arc<D>> {
        let id = DocumentId::from_db_value(row.get(1)?);
        let payload = row.take(0)?;
        let decode = move || decode_document::<D>(payload, 0);

        match id {
            Some(id) => batch.resolve(id, decode),
            None => {
                let document = decode()?;
                batch.resolve(document.document_id(), move || Ok(document))
            }
        }
    }
}

/// Deserializes a payload column into `D`
pub(crate) fn decode_document<D: Document>(payload: DbValue, index: usize) -> QueryResult<D> {
    let json = payload.into_json_payload(index)?.ok_or_else(|| {
        QueryError::decode(format!(
            "null payload for {}",
            std::any::type_name::<D>()
        ))
    })?;
    Ok(serde_json::from_value(json)?)
}

impl<D: Document> Selectable for Arc<D> {
    fn build_selector(
        mapping: &DocumentMapping,
        query: &QueryExpression,
    ) -> QueryResult<Box<dyn Selector<Self>>> {
        if query.projection.is_some() {
            return FieldSelector::<Self>::boxed(mapping, query);
        }
        if mapping.doc_type() != TypeId::of::<D>() {
            return Err(QueryError::InvalidExpression(format!(
                "cannot select {} from a query over {}",
                std::any::type_name::<D>(),
                mapping.type_name()
            )));
        }
        Ok(Box::new(DocumentSelector::<D>::new(mapping)))
    }

    fn from_db_value(value: DbValue) -> QueryResult<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }
        decode_document::<D>(value, 0).map(|d| Some(Arc::new(d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::identity::{IdentityMap, TrackingIdentityMap};
    use crate::storage::DbType;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
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

    fn row(id: i64, name: &str) -> Row {
        Row::new(vec![
            DbValue::Json(json!({"id": id, "name": name})),
            DbValue::Int(id),
        ])
    }

    #[test]
    fn test_decodes_and_tracks_document() {
        let mapping = DocumentMapping::for_document::<User>(&StoreOptions::default());
        let query = QueryExpression::for_document::<User>();
        let selector = Arc::<User>::build_selector(&mapping, &query).unwrap();
        assert_eq!(selector.select_fields(), vec!["d.data", "d.id"]);

        let mut map = TrackingIdentityMap::new();
        let mut batch = IdentityBatch::new(&mut map);
        let first = selector.resolve(&mut row(1, "Alice"), &mut batch).unwrap();
        let again = selector.resolve(&mut row(1, "Changed"), &mut batch).unwrap();
        batch.commit();

        assert_eq!(first.name, "Alice");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_text_payload_is_accepted() {
        let mapping = DocumentMapping::for_document::<User>(&StoreOptions::default());
        let selector = DocumentSelector::<User>::new(&mapping);
        let mut map = TrackingIdentityMap::new();
        let mut batch = IdentityBatch::new(&mut map);

        let mut row = Row::new(vec![
            DbValue::Text(r#"{"id":2,"name":"Bob"}"#.into()),
            DbValue::Int(2),
        ]);
        let user = selector.resolve(&mut row, &mut batch).unwrap();
        assert_eq!(*user, User { id: 2, name: "Bob".into() });
    }

    #[test]
    fn test_null_payload_is_decode_error() {
        let mapping = DocumentMapping::for_document::<User>(&StoreOptions::default());
        let selector = DocumentSelector::<User>::new(&mapping);
        let mut map = TrackingIdentityMap::new();
        let mut batch = IdentityBatch::new(&mut map);

        let mut row = Row::new(vec![DbValue::Null, DbValue::Int(2)]);
        let err = selector.resolve(&mut row, &mut batch).unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }
}
