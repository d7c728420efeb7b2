//! Registry of document mappings
//!
//! Populated while the store is being built and read-only afterwards.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::StoreOptions;
use crate::document::Document;
use crate::expression::QueryExpression;

use super::errors::{SchemaError, SchemaResult};
use super::mapping::DocumentMapping;

/// All document types known to a store
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    options: StoreOptions,
    mappings: HashMap<TypeId, Arc<DocumentMapping>>,
    /// Registration order, used for DDL
    order: Vec<TypeId>,
}

impl DocumentSchema {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            mappings: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Registers `D` with its default mapping
    pub fn register<D: Document>(&mut self) -> SchemaResult<()> {
        self.register_with::<D, _>(|_| Ok(()))
    }

    /// Registers `D`, letting `configure` adjust the mapping first
    pub fn register_with<D, F>(&mut self, configure: F) -> SchemaResult<()>
    where
        D: Document,
        F: FnOnce(&mut DocumentMapping) -> SchemaResult<()>,
    {
        let type_id = TypeId::of::<D>();
        if self.mappings.contains_key(&type_id) {
            return Err(SchemaError::DuplicateRegistration(
                std::any::type_name::<D>().to_string(),
            ));
        }

        let mut mapping = DocumentMapping::for_document::<D>(&self.options);
        configure(&mut mapping)?;

        if let Some(existing) = self
            .mappings
            .values()
            .find(|m| m.qualified_table_name() == mapping.qualified_table_name())
        {
            return Err(SchemaError::invalid_field(
                "alias",
                format!(
                    "{} and {} both map to {}",
                    existing.type_name(),
                    mapping.type_name(),
                    mapping.qualified_table_name()
                ),
            ));
        }

        tracing::debug!(
            document = mapping.type_name(),
            table = %mapping.qualified_table_name(),
            "registered document type"
        );
        self.mappings.insert(type_id, Arc::new(mapping));
        self.order.push(type_id);
        Ok(())
    }

    /// Resolves the mapping for a document type
    pub fn storage_for(&self, doc_type: TypeId, type_name: &str) -> SchemaResult<Arc<DocumentMapping>> {
        self.mappings
            .get(&doc_type)
            .cloned()
            .ok_or_else(|| SchemaError::unknown_document(type_name))
    }

    /// Typed form of `storage_for`
    pub fn mapping<D: Document>(&self) -> SchemaResult<Arc<DocumentMapping>> {
        self.storage_for(TypeId::of::<D>(), std::any::type_name::<D>())
    }

    /// Resolves the mapping for an expression's source document type
    pub fn mapping_for(&self, query: &QueryExpression) -> SchemaResult<Arc<DocumentMapping>> {
        self.storage_for(query.document_type(), query.document_name())
    }

    /// Fails with `UnknownDocumentType` unless the type is registered
    pub fn ensure_storage_exists(&self, doc_type: TypeId, type_name: &str) -> SchemaResult<()> {
        if self.mappings.contains_key(&doc_type) {
            Ok(())
        } else {
            Err(SchemaError::unknown_document(type_name))
        }
    }

    /// Mappings in registration order
    pub fn mappings(&self) -> impl Iterator<Item = &Arc<DocumentMapping>> {
        self.order.iter().filter_map(|id| self.mappings.get(id))
    }

    /// Table DDL for every registered type, in registration order
    pub fn ddl(&self) -> Vec<String> {
        self.mappings().map(|m| m.table_ddl()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use crate::storage::DbType;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct User {
        id: i64,
    }

    impl Document for User {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Account {
        id: i64,
    }

    impl Document for Account {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }

        fn alias() -> String {
            "user".into()
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut schema = DocumentSchema::new(StoreOptions::default());
        schema.register::<User>().unwrap();

        let mapping = schema.mapping::<User>().unwrap();
        assert_eq!(mapping.qualified_table_name(), "public.mt_doc_user");

        let query = QueryExpression::for_document::<User>();
        assert!(schema.mapping_for(&query).is_ok());
        assert!(schema
            .ensure_storage_exists(TypeId::of::<User>(), "User")
            .is_ok());
    }

    #[test]
    fn test_unknown_document_type() {
        let schema = DocumentSchema::new(StoreOptions::default());
        let err = schema
            .ensure_storage_exists(TypeId::of::<User>(), "User")
            .unwrap_err();
        assert_eq!(err, SchemaError::UnknownDocumentType("User".into()));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut schema = DocumentSchema::new(StoreOptions::default());
        schema.register::<User>().unwrap();
        assert!(matches!(
            schema.register::<User>(),
            Err(SchemaError::DuplicateRegistration(_))
        ));
    }

    #[test]
    fn test_table_collision_rejected() {
        let mut schema = DocumentSchema::new(StoreOptions::default());
        schema.register::<User>().unwrap();
        assert!(schema.register::<Account>().is_err());
    }

    #[test]
    fn test_ddl_in_registration_order() {
        let mut schema = DocumentSchema::new(StoreOptions::default());
        schema
            .register_with::<User, _>(|m| {
                m.duplicate_field("name", DbType::Text)?;
                Ok(())
            })
            .unwrap();

        let ddl = schema.ddl();
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].contains("name varchar"));
    }
}
