//! docstash - typed document persistence over a relational JSON store
//!
//! Documents are stored as JSON payloads in one table per document type.
//! Query expressions are translated into a single parameterized command by a
//! query handler, executed, and decoded back into typed values.
//!
//! # Pipeline
//!
//! 1. `QueryHandlerFactory::build` picks exactly one handler for an expression
//! 2. The handler configures one command
//! 3. The storage backend executes it
//! 4. The same handler decodes the row cursor through an identity map
//!
//! Compiled queries insert the `CompiledQueryCache` between steps 1 and 3 so a
//! template type is translated once and replayed with fresh parameter values.

pub mod compiled;
pub mod config;
pub mod document;
pub mod expression;
pub mod handlers;
pub mod identity;
pub mod schema;
pub mod selector;
pub mod serializer;
pub mod session;
pub mod storage;
pub mod store;

pub use compiled::{CompiledHandler, CompiledQuery, CompiledQueryCache, TemplateMember};
pub use config::{ConfigError, StoreOptions};
pub use document::{Document, DocumentId, ValueId};
pub use expression::{
    AggregateOperator, ChoiceOperator, CompareOp, Filter, Operand, Projection, QueryExpression,
    ResultOperator, SortDirection, SortSpec,
};
pub use handlers::{
    HandlerKind, QueryError, QueryErrorCode, QueryHandler, QueryHandlerFactory, QueryOutput,
    QueryResult, ResultShape,
};
pub use identity::{IdentityMap, NullIdentityMap, TrackingIdentityMap};
pub use schema::{DocumentMapping, DocumentSchema, SchemaError};
pub use selector::{Include, IncludeJoin, Selectable, Selector};
pub use serializer::{JsonSerializer, Serializer};
pub use session::{DocumentSession, SessionError, SessionResult};
pub use storage::{Command, ConnectionFactory, DbType, DbValue, Row, StorageError};
pub use store::{DocumentStore, StoreBuilder};
