//! Query pipeline error types
//!
//! Error codes:
//! - DOC_QUERY_SCHEMA
//! - DOC_QUERY_STORAGE
//! - DOC_QUERY_UNSUPPORTED
//! - DOC_QUERY_CARDINALITY
//! - DOC_QUERY_NOT_FOUND
//! - DOC_QUERY_NO_HANDLER
//! - DOC_QUERY_INVALID_EXPRESSION
//! - DOC_QUERY_SHAPE_MISMATCH
//! - DOC_QUERY_DECODE
//! - DOC_QUERY_CANCELLED
//! - DOC_QUERY_INTERNAL

use std::fmt;

use thiserror::Error;

use crate::schema::SchemaError;
use crate::storage::StorageError;

/// Result type for query pipeline operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Stable codes for query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    Schema,
    Storage,
    Unsupported,
    Cardinality,
    NotFound,
    NoHandler,
    InvalidExpression,
    ShapeMismatch,
    Decode,
    Cancelled,
    Internal,
}

impl QueryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::Schema => "DOC_QUERY_SCHEMA",
            QueryErrorCode::Storage => "DOC_QUERY_STORAGE",
            QueryErrorCode::Unsupported => "DOC_QUERY_UNSUPPORTED",
            QueryErrorCode::Cardinality => "DOC_QUERY_CARDINALITY",
            QueryErrorCode::NotFound => "DOC_QUERY_NOT_FOUND",
            QueryErrorCode::NoHandler => "DOC_QUERY_NO_HANDLER",
            QueryErrorCode::InvalidExpression => "DOC_QUERY_INVALID_EXPRESSION",
            QueryErrorCode::ShapeMismatch => "DOC_QUERY_SHAPE_MISMATCH",
            QueryErrorCode::Decode => "DOC_QUERY_DECODE",
            QueryErrorCode::Cancelled => "DOC_QUERY_CANCELLED",
            QueryErrorCode::Internal => "DOC_QUERY_INTERNAL",
        }
    }

    /// Errors caused by how the pipeline was called rather than by data or I/O
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            QueryErrorCode::Unsupported
                | QueryErrorCode::NoHandler
                | QueryErrorCode::InvalidExpression
                | QueryErrorCode::ShapeMismatch
        )
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Query pipeline errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A single-result query matched more than one row
    #[error("Expected a single {document} but the query matched more than one")]
    Cardinality { document: &'static str },

    /// First or Single on an empty result set
    #[error("Query over {document} returned no rows")]
    NotFound { document: &'static str },

    #[error("No query handler matches the requested {shape} result for {document}")]
    NoHandlerFound {
        document: &'static str,
        shape: &'static str,
    },

    #[error("Invalid query expression: {0}")]
    InvalidExpression(String),

    /// The output was read with an accessor for another shape
    #[error("Query produced a {actual} result, not a {expected}")]
    ShapeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Cannot decode query result: {0}")]
    Decode(String),

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn code(&self) -> QueryErrorCode {
        match self {
            QueryError::Schema(_) => QueryErrorCode::Schema,
            QueryError::Storage(_) => QueryErrorCode::Storage,
            QueryError::UnsupportedOperation(_) => QueryErrorCode::Unsupported,
            QueryError::Cardinality { .. } => QueryErrorCode::Cardinality,
            QueryError::NotFound { .. } => QueryErrorCode::NotFound,
            QueryError::NoHandlerFound { .. } => QueryErrorCode::NoHandler,
            QueryError::InvalidExpression(_) => QueryErrorCode::InvalidExpression,
            QueryError::ShapeMismatch { .. } => QueryErrorCode::ShapeMismatch,
            QueryError::Decode(_) => QueryErrorCode::Decode,
            QueryError::Cancelled => QueryErrorCode::Cancelled,
            QueryError::Internal(_) => QueryErrorCode::Internal,
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        QueryError::Decode(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        QueryError::Internal(reason.into())
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(QueryError::Cancelled.code().code(), "DOC_QUERY_CANCELLED");
        assert_eq!(
            QueryError::Cardinality { document: "User" }.code(),
            QueryErrorCode::Cardinality
        );
        assert_eq!(
            QueryError::from(SchemaError::unknown_document("User")).code(),
            QueryErrorCode::Schema
        );
    }

    #[test]
    fn test_caller_errors() {
        assert!(QueryErrorCode::NoHandler.is_caller_error());
        assert!(QueryErrorCode::Unsupported.is_caller_error());
        assert!(!QueryErrorCode::Storage.is_caller_error());
        assert!(!QueryErrorCode::Cardinality.is_caller_error());
    }

    #[test]
    fn test_schema_error_is_transparent() {
        let err = QueryError::from(SchemaError::unknown_document("app::User"));
        assert_eq!(
            err.to_string(),
            "No storage mapping registered for document type 'app::User'"
        );
    }
}
