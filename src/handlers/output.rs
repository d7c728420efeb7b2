//! Handler outputs and requested result shapes

use super::errors::{QueryError, QueryResult};

/// Result shape requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// Eager ordered sequence
    List,
    /// Lazy sequence over the decoded rows
    Enumerable,
    /// One value: a scalar, a boolean or a single element
    Value,
}

impl ResultShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultShape::List => "list",
            ResultShape::Enumerable => "enumerable",
            ResultShape::Value => "value",
        }
    }
}

/// Decoded result of one handler call
#[derive(Debug)]
pub enum QueryOutput<T> {
    List(Vec<T>),
    Enumerable(std::vec::IntoIter<T>),
    Count(i64),
    /// Sum, average, min or max; `None` when no row matched
    Scalar(Option<T>),
    Exists(bool),
    /// First or single element; `None` only for the `OrDefault` variants
    One(Option<T>),
}

impl<T> QueryOutput<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutput::List(_) => "list",
            QueryOutput::Enumerable(_) => "enumerable",
            QueryOutput::Count(_) => "count",
            QueryOutput::Scalar(_) => "scalar",
            QueryOutput::Exists(_) => "exists",
            QueryOutput::One(_) => "one",
        }
    }

    fn mismatch(&self, expected: &'static str) -> QueryError {
        QueryError::ShapeMismatch {
            expected,
            actual: self.kind(),
        }
    }

    /// Eager or lazy sequence as a vector
    pub fn into_list(self) -> QueryResult<Vec<T>> {
        match self {
            QueryOutput::List(items) => Ok(items),
            QueryOutput::Enumerable(items) => Ok(items.collect()),
            other => Err(other.mismatch("list")),
        }
    }

    /// Eager or lazy sequence as an iterator
    pub fn into_enumerable(self) -> QueryResult<std::vec::IntoIter<T>> {
        match self {
            QueryOutput::Enumerable(items) => Ok(items),
            QueryOutput::List(items) => Ok(items.into_iter()),
            other => Err(other.mismatch("enumerable")),
        }
    }

    pub fn into_count(self) -> QueryResult<i64> {
        match self {
            QueryOutput::Count(count) => Ok(count),
            other => Err(other.mismatch("count")),
        }
    }

    pub fn into_scalar(self) -> QueryResult<Option<T>> {
        match self {
            QueryOutput::Scalar(value) => Ok(value),
            other => Err(other.mismatch("scalar")),
        }
    }

    pub fn into_bool(self) -> QueryResult<bool> {
        match self {
            QueryOutput::Exists(exists) => Ok(exists),
            other => Err(other.mismatch("exists")),
        }
    }

    pub fn into_one(self) -> QueryResult<Option<T>> {
        match self {
            QueryOutput::One(value) => Ok(value),
            other => Err(other.mismatch("one")),
        }
    }
}
