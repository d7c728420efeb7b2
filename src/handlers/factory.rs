//! Handler selection
//!
//! `build` tries, in order:
//! 1. scalar detection: Count/LongCount, Sum, Average, Any
//! 2. choice detection: First/Single variants, Min, Max; Last variants fail
//! 3. list fallback by requested shape: List or Enumerable
//!
//! and fails with `NoHandlerFound` when nothing matches. Each kind maps to a
//! constructor through `HandlerKind::constructor`.

use std::any::TypeId;
use std::sync::Arc;

use tracing::debug;

use crate::compiled::{CachedQuery, CompiledHandler, CompiledQuery, CompiledQueryCache, ParameterSetter};
use crate::expression::{AggregateOperator, ChoiceOperator, QueryExpression};
use crate::schema::DocumentSchema;
use crate::selector::{IncludeJoin, Selectable};

use super::aggregate::{AggregateFunction, AggregateHandler, CountHandler};
use super::any::AnyHandler;
use super::errors::{QueryError, QueryResult};
use super::list::{EnumerableHandler, ListHandler};
use super::one::OneResultHandler;
use super::output::ResultShape;
use super::{HandlerKind, QueryHandler};

/// Constructor registered for one handler kind
pub type HandlerConstructor<T> =
    fn(&DocumentSchema, &QueryExpression, &[Arc<dyn IncludeJoin>]) -> QueryResult<QueryHandler<T>>;

fn build_list<T: Selectable>(
    schema: &DocumentSchema,
    query: &QueryExpression,
    includes: &[Arc<dyn IncludeJoin>],
) -> QueryResult<QueryHandler<T>> {
    ListHandler::new(schema, query, includes).map(QueryHandler::List)
}

fn build_enumerable<T: Selectable>(
    schema: &DocumentSchema,
    query: &QueryExpression,
    includes: &[Arc<dyn IncludeJoin>],
) -> QueryResult<QueryHandler<T>> {
    EnumerableHandler::new(schema, query, includes).map(QueryHandler::Enumerable)
}

fn build_count<T: Selectable>(
    schema: &DocumentSchema,
    query: &QueryExpression,
    _includes: &[Arc<dyn IncludeJoin>],
) -> QueryResult<QueryHandler<T>> {
    CountHandler::new(schema, query).map(QueryHandler::Count)
}

fn build_any<T: Selectable>(
    schema: &DocumentSchema,
    query: &QueryExpression,
    _includes: &[Arc<dyn IncludeJoin>],
) -> QueryResult<QueryHandler<T>> {
    AnyHandler::new(schema, query).map(QueryHandler::Any)
}

fn build_one<T: Selectable>(
    schema: &DocumentSchema,
    query: &QueryExpression,
    includes: &[Arc<dyn IncludeJoin>],
) -> QueryResult<QueryHandler<T>> {
    OneResultHandler::new(schema, query, includes).map(QueryHandler::One)
}

macro_rules! aggregate_constructor {
    ($name:ident, $function:expr) => {
        fn $name<T: Selectable>(
            schema: &DocumentSchema,
            query: &QueryExpression,
            _includes: &[Arc<dyn IncludeJoin>],
        ) -> QueryResult<QueryHandler<T>> {
            AggregateHandler::new(schema, query, $function).map(QueryHandler::Aggregate)
        }
    };
}

aggregate_constructor!(build_sum, AggregateFunction::Sum);
aggregate_constructor!(build_average, AggregateFunction::Average);
aggregate_constructor!(build_min, AggregateFunction::Min);
aggregate_constructor!(build_max, AggregateFunction::Max);

impl HandlerKind {
    /// Registered constructor for this kind
    pub fn constructor<T: Selectable>(self) -> HandlerConstructor<T> {
        match self {
            HandlerKind::List => build_list::<T> as HandlerConstructor<T>,
            HandlerKind::Enumerable => build_enumerable::<T>,
            HandlerKind::Count => build_count::<T>,
            HandlerKind::Sum => build_sum::<T>,
            HandlerKind::Average => build_average::<T>,
            HandlerKind::Min => build_min::<T>,
            HandlerKind::Max => build_max::<T>,
            HandlerKind::Any => build_any::<T>,
            HandlerKind::One => build_one::<T>,
        }
    }

    /// Scalar detection
    pub fn for_scalar(query: &QueryExpression) -> Option<Self> {
        query.aggregate().map(|aggregate| match aggregate {
            AggregateOperator::Count | AggregateOperator::LongCount => HandlerKind::Count,
            AggregateOperator::Sum => HandlerKind::Sum,
            AggregateOperator::Average => HandlerKind::Average,
            AggregateOperator::Any => HandlerKind::Any,
        })
    }

    /// Choice detection. Last and LastOrDefault are rejected here.
    pub fn for_single(query: &QueryExpression) -> QueryResult<Option<Self>> {
        let Some(choice) = query.choice() else {
            return Ok(None);
        };
        let kind = match choice {
            ChoiceOperator::First
            | ChoiceOperator::FirstOrDefault
            | ChoiceOperator::Single
            | ChoiceOperator::SingleOrDefault => HandlerKind::One,
            ChoiceOperator::Min => HandlerKind::Min,
            ChoiceOperator::Max => HandlerKind::Max,
            ChoiceOperator::Last | ChoiceOperator::LastOrDefault => {
                return Err(QueryError::UnsupportedOperation(format!(
                    "{:?} is not supported; reverse the ordering and use First{} instead",
                    choice,
                    if choice.returns_default_when_empty() {
                        "OrDefault"
                    } else {
                        ""
                    }
                )))
            }
        };
        Ok(Some(kind))
    }

    /// List fallback
    pub fn for_sequence(shape: ResultShape) -> Option<Self> {
        match shape {
            ResultShape::List => Some(HandlerKind::List),
            ResultShape::Enumerable => Some(HandlerKind::Enumerable),
            ResultShape::Value => None,
        }
    }
}

/// Selects and constructs handlers; owns the compiled query cache
pub struct QueryHandlerFactory {
    schema: Arc<DocumentSchema>,
    cache: CompiledQueryCache,
}

impl QueryHandlerFactory {
    pub fn new(schema: Arc<DocumentSchema>) -> Self {
        Self {
            schema,
            cache: CompiledQueryCache::new(),
        }
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    pub fn cache(&self) -> &CompiledQueryCache {
        &self.cache
    }

    /// Picks the handler kind for an expression and requested shape
    pub fn select_kind(query: &QueryExpression, shape: ResultShape) -> QueryResult<HandlerKind> {
        query.validate().map_err(QueryError::InvalidExpression)?;

        if let Some(kind) = HandlerKind::for_scalar(query) {
            return Ok(kind);
        }
        if let Some(kind) = HandlerKind::for_single(query)? {
            return Ok(kind);
        }
        HandlerKind::for_sequence(shape).ok_or(QueryError::NoHandlerFound {
            document: query.document_name(),
            shape: shape.as_str(),
        })
    }

    /// Builds the one handler for `query`
    pub fn build<T: Selectable>(
        &self,
        query: &QueryExpression,
        shape: ResultShape,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> QueryResult<QueryHandler<T>> {
        let kind = Self::select_kind(query, shape)?;
        self.construct(kind, query, includes)
    }

    /// Scalar entry point; fails fast on an unknown document type
    pub fn handler_for_scalar_query<T: Selectable>(
        &self,
        query: &QueryExpression,
    ) -> QueryResult<QueryHandler<T>> {
        self.schema
            .ensure_storage_exists(query.document_type(), query.document_name())?;
        query.validate().map_err(QueryError::InvalidExpression)?;

        let kind = HandlerKind::for_scalar(query).ok_or(QueryError::NoHandlerFound {
            document: query.document_name(),
            shape: "scalar",
        })?;
        self.construct(kind, query, &[])
    }

    /// Single-result entry point; fails fast on an unknown document type
    pub fn handler_for_single_query<T: Selectable>(
        &self,
        query: &QueryExpression,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> QueryResult<QueryHandler<T>> {
        self.schema
            .ensure_storage_exists(query.document_type(), query.document_name())?;
        query.validate().map_err(QueryError::InvalidExpression)?;

        let kind = HandlerKind::for_single(query)?.ok_or(QueryError::NoHandlerFound {
            document: query.document_name(),
            shape: "single",
        })?;
        self.construct(kind, query, includes)
    }

    /// Compiled entry point: translates `Q` once, then binds `template`
    pub fn handler_for<Q: CompiledQuery>(&self, template: &Q) -> QueryResult<CompiledHandler<Q::Output>> {
        let cached = self.cache.get_or_build(|| self.compile::<Q>())?;
        cached.bind(template)
    }

    fn compile<Q: CompiledQuery>(&self) -> QueryResult<CachedQuery<Q>> {
        let query = Q::query_is();
        if query.document_type() != TypeId::of::<Q::Document>() {
            return Err(QueryError::InvalidExpression(format!(
                "{} declares {} but its expression queries {}",
                std::any::type_name::<Q>(),
                std::any::type_name::<Q::Document>(),
                query.document_name()
            )));
        }

        let handler = self.build::<Q::Output>(&query, Q::SHAPE, &[])?;
        let command = handler.configure_command();
        let setters = ParameterSetter::<Q>::discover(&query, &command)?;
        debug!(
            template = std::any::type_name::<Q>(),
            kind = handler.kind().as_str(),
            setters = setters.len(),
            "compiled query translated"
        );
        Ok(CachedQuery::new(command, setters, handler))
    }

    fn construct<T: Selectable>(
        &self,
        kind: HandlerKind,
        query: &QueryExpression,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> QueryResult<QueryHandler<T>> {
        debug!(
            document = query.document_name(),
            kind = kind.as_str(),
            includes = includes.len(),
            "selected query handler"
        );
        (kind.constructor::<T>())(&self.schema, query, includes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::document::{Document, DocumentId};
    use crate::expression::Filter;
    use crate::storage::DbType;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct User {
        id: i64,
        name: String,
        age: i32,
    }

    impl Document for User {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Unregistered {
        id: i64,
    }

    impl Document for Unregistered {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    fn factory() -> QueryHandlerFactory {
        let mut schema = DocumentSchema::new(StoreOptions::default());
        schema.register::<User>().unwrap();
        QueryHandlerFactory::new(Arc::new(schema))
    }

    fn users() -> QueryExpression {
        QueryExpression::for_document::<User>()
    }

    #[test]
    fn test_kind_selection_order() {
        let kind = |q: QueryExpression, shape| QueryHandlerFactory::select_kind(&q, shape).unwrap();

        assert_eq!(kind(users().count(), ResultShape::Value), HandlerKind::Count);
        assert_eq!(kind(users().long_count(), ResultShape::Value), HandlerKind::Count);
        assert_eq!(kind(users().any(), ResultShape::Value), HandlerKind::Any);
        assert_eq!(
            kind(users().select("age", DbType::Integer).sum(), ResultShape::Value),
            HandlerKind::Sum
        );
        assert_eq!(
            kind(users().select("age", DbType::Integer).max(), ResultShape::Value),
            HandlerKind::Max
        );
        assert_eq!(kind(users().single(), ResultShape::Value), HandlerKind::One);
        assert_eq!(kind(users(), ResultShape::List), HandlerKind::List);
        assert_eq!(kind(users(), ResultShape::Enumerable), HandlerKind::Enumerable);
    }

    #[test]
    fn test_no_handler_for_plain_value_shape() {
        let err = QueryHandlerFactory::select_kind(&users(), ResultShape::Value).unwrap_err();
        assert!(matches!(err, QueryError::NoHandlerFound { shape: "value", .. }));
    }

    #[test]
    fn test_last_is_unsupported() {
        let err = QueryHandlerFactory::select_kind(&users().last_or_default(), ResultShape::Value)
            .unwrap_err();
        match err {
            QueryError::UnsupportedOperation(message) => {
                assert!(message.contains("FirstOrDefault"));
            }
            other => panic!("expected unsupported operation, got {:?}", other),
        }
    }

    #[test]
    fn test_constructed_kind_matches_registry() {
        let factory = factory();
        let handler = factory
            .build::<i64>(&users().filter(Filter::eq("name", "x")).count(), ResultShape::Value, &[])
            .unwrap();
        assert_eq!(handler.kind(), HandlerKind::Count);
        assert_eq!(format!("{:?}", handler), "QueryHandler(\"Count\")");

        let handler = factory
            .build::<f64>(
                &users().select("age", DbType::Integer).average(),
                ResultShape::Value,
                &[],
            )
            .unwrap();
        assert_eq!(handler.kind(), HandlerKind::Average);
    }

    #[test]
    fn test_scalar_entry_point_checks_storage_first() {
        let factory = factory();
        let query = QueryExpression::for_document::<Unregistered>().count();
        let err = factory.handler_for_scalar_query::<i64>(&query).unwrap_err();
        assert!(matches!(err, QueryError::Schema(_)));

        let err = factory.handler_for_scalar_query::<i64>(&users()).unwrap_err();
        assert!(matches!(err, QueryError::NoHandlerFound { shape: "scalar", .. }));
    }

    #[test]
    fn test_single_entry_point() {
        let factory = factory();
        let handler = factory
            .handler_for_single_query::<Arc<User>>(&users().first(), &[])
            .unwrap();
        assert_eq!(handler.kind(), HandlerKind::One);

        let err = factory
            .handler_for_single_query::<Arc<User>>(&users().last(), &[])
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperation(_)));
    }
}
