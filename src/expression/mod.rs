//! Query expression model for docstash
//!
//! A query expression is the already-parsed form of a declarative query:
//! a source document type, a filter tree, ordering, limit/offset, an optional
//! projection and at most one choice and one aggregate result operator.
//!
//! Expressions are immutable inputs to the handler factory. They carry either
//! constant operands or compiled-query template members; the latter are bound
//! per call through parameter setters.

mod ast;
mod visitor;

pub use ast::{
    AggregateOperator, ChoiceOperator, CompareOp, Filter, Operand, Projection, QueryExpression,
    ResultOperator, SortDirection, SortSpec,
};
pub use visitor::{walk_expression, walk_filter, ExpressionVisitor, MemberCollector};
