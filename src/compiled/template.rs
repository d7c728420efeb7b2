//! Compiled query templates

use crate::document::Document;
use crate::expression::QueryExpression;
use crate::handlers::ResultShape;
use crate::selector::Selectable;
use crate::storage::DbValue;

/// A query template translated once per type and replayed per instance.
///
/// The expression returned by `query_is` refers to template fields through
/// `Operand::member`; `members` tells the cache how to read each of them
/// from a live instance.
///
/// ```ignore
/// struct UsersByName {
///     name: String,
/// }
///
/// impl CompiledQuery for UsersByName {
///     type Document = User;
///     type Output = Arc<User>;
///     const SHAPE: ResultShape = ResultShape::List;
///
///     fn query_is() -> QueryExpression {
///         QueryExpression::for_document::<User>().filter(Filter::compare(
///             "name",
///             CompareOp::Eq,
///             Operand::member("name", DbType::Text),
///         ))
///     }
///
///     fn members() -> Vec<TemplateMember<Self>> {
///         vec![TemplateMember::new("name", |q: &Self| q.name.clone().into())]
///     }
/// }
/// ```
pub trait CompiledQuery: Sized + Send + Sync + 'static {
    /// Document type the query runs over
    type Document: Document;

    /// Element type of the result
    type Output: Selectable;

    /// Requested result shape
    const SHAPE: ResultShape;

    /// Expression body. Called once per template type.
    fn query_is() -> QueryExpression;

    /// Readers for every member the expression refers to
    fn members() -> Vec<TemplateMember<Self>>;
}

/// Named reader of one template field
pub struct TemplateMember<Q> {
    pub name: &'static str,
    pub read: fn(&Q) -> DbValue,
}

impl<Q> TemplateMember<Q> {
    pub fn new(name: &'static str, read: fn(&Q) -> DbValue) -> Self {
        Self { name, read }
    }
}

impl<Q> Clone for TemplateMember<Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Q> Copy for TemplateMember<Q> {}
