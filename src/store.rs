//! Document store
//!
//! The store is the long-lived root: options, the document schema, the
//! handler factory with its compiled-query cache, the connection factory and
//! the serializer. It is immutable once built and hands out sessions.

use std::sync::Arc;

use tracing::info;

use crate::config::StoreOptions;
use crate::document::Document;
use crate::handlers::QueryHandlerFactory;
use crate::schema::{DocumentMapping, DocumentSchema, SchemaResult};
use crate::serializer::{JsonSerializer, Serializer};
use crate::session::{DocumentSession, SessionResult};
use crate::storage::{Command, ConnectionFactory};

/// Collects document registrations before the store is built
#[derive(Debug)]
pub struct StoreBuilder {
    schema: DocumentSchema,
}

impl StoreBuilder {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            schema: DocumentSchema::new(options),
        }
    }

    /// Registers `D` with its default mapping
    pub fn register<D: Document>(mut self) -> SchemaResult<Self> {
        self.schema.register::<D>()?;
        Ok(self)
    }

    /// Registers `D` and lets `configure` add duplicated fields
    pub fn register_with<D, F>(mut self, configure: F) -> SchemaResult<Self>
    where
        D: Document,
        F: FnOnce(&mut DocumentMapping) -> SchemaResult<()>,
    {
        self.schema.register_with::<D, F>(configure)?;
        Ok(self)
    }

    /// Builds a store using the JSON serializer
    pub fn build(self, connections: impl ConnectionFactory + 'static) -> SessionResult<DocumentStore> {
        self.build_with_serializer(connections, JsonSerializer)
    }

    /// Validates the options and builds the store.
    ///
    /// With `auto_create_schema` set the document tables are created before
    /// the store is returned.
    pub fn build_with_serializer<S: Serializer>(
        self,
        connections: impl ConnectionFactory + 'static,
        serializer: S,
    ) -> SessionResult<DocumentStore<S>> {
        self.schema.options().validate()?;

        let options = self.schema.options().clone();
        let schema = Arc::new(self.schema);
        let store = DocumentStore {
            options,
            handlers: QueryHandlerFactory::new(Arc::clone(&schema)),
            schema,
            connections: Box::new(connections),
            serializer,
        };

        info!(
            documents = store.schema.mappings().count(),
            schema = %store.options.database_schema_name,
            "document store built"
        );

        if store.options.auto_create_schema {
            store.apply_schema()?;
        }
        Ok(store)
    }
}

/// Root object for sessions and queries
pub struct DocumentStore<S: Serializer = JsonSerializer> {
    options: StoreOptions,
    schema: Arc<DocumentSchema>,
    handlers: QueryHandlerFactory,
    connections: Box<dyn ConnectionFactory>,
    serializer: S,
}

impl<S: Serializer> DocumentStore<S> {
    /// Opens a unit of work. Tracks identities when the options ask for it.
    pub fn open_session(&self) -> DocumentSession<'_, S> {
        DocumentSession::new(self)
    }

    /// Creates every registered document table in one transaction
    pub fn apply_schema(&self) -> SessionResult<()> {
        let commands = self.schema_commands();
        let mut connection = self.connections.create()?;
        connection.open()?;
        let mut transaction = connection.begin_transaction()?;
        for command in &commands {
            transaction.execute(command)?;
        }
        transaction.commit()?;
        info!(tables = commands.len(), "schema applied");
        Ok(())
    }

    pub async fn apply_schema_async(&self) -> SessionResult<()> {
        let commands = self.schema_commands();
        let mut connection = self.connections.create()?;
        connection.open_async().await?;
        let mut transaction = connection.begin_transaction_async().await?;
        for command in &commands {
            transaction.execute_async(command).await?;
        }
        transaction.commit_async().await?;
        info!(tables = commands.len(), "schema applied");
        Ok(())
    }

    fn schema_commands(&self) -> Vec<Command> {
        self.schema.ddl().into_iter().map(Command::with_sql).collect()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    pub fn handler_factory(&self) -> &QueryHandlerFactory {
        &self.handlers
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub(crate) fn connections(&self) -> &dyn ConnectionFactory {
        self.connections.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use crate::storage::scripted::ScriptedConnectionFactory;
    use crate::storage::DbType;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Invoice {
        id: i64,
        total: f64,
    }

    impl Document for Invoice {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    #[test]
    fn test_build_validates_options() {
        let options = StoreOptions {
            table_prefix: "bad prefix".into(),
            ..StoreOptions::default()
        };
        let result = StoreBuilder::new(options).build(ScriptedConnectionFactory::new());
        assert!(matches!(result, Err(crate::session::SessionError::Config(_))));
    }

    #[test]
    fn test_auto_create_schema_runs_ddl() {
        let backend = ScriptedConnectionFactory::new();
        let options = StoreOptions {
            auto_create_schema: true,
            ..StoreOptions::default()
        };
        let store = StoreBuilder::new(options)
            .register::<Invoice>()
            .unwrap()
            .build(backend.clone())
            .unwrap();

        let committed = backend.committed_commands();
        assert_eq!(committed.len(), 1);
        assert!(committed[0].sql().contains("public.mt_doc_invoice"));
        assert_eq!(backend.commits(), 1);
        assert!(store.schema().mapping::<Invoice>().is_ok());
    }

    #[test]
    fn test_build_without_auto_create_touches_nothing() {
        let backend = ScriptedConnectionFactory::new();
        let _store = StoreBuilder::new(StoreOptions::default())
            .register::<Invoice>()
            .unwrap()
            .build(backend.clone())
            .unwrap();
        assert_eq!(backend.connections_created(), 0);
    }

    #[test]
    fn test_session_follows_identity_option() {
        let options = StoreOptions {
            use_identity_map: false,
            ..StoreOptions::default()
        };
        let store = StoreBuilder::new(options)
            .build(ScriptedConnectionFactory::new())
            .unwrap();
        assert!(!store.open_session().identity_map().is_tracking());

        let store = StoreBuilder::new(StoreOptions::default())
            .build(ScriptedConnectionFactory::new())
            .unwrap();
        assert!(store.open_session().identity_map().is_tracking());
    }
}
