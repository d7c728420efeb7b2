//! Session error types
//!
//! Error codes:
//! - DOC_SESSION_QUERY
//! - DOC_SESSION_SCHEMA
//! - DOC_SESSION_STORAGE
//! - DOC_SESSION_SERIALIZATION
//! - DOC_SESSION_CONFIG
//! - DOC_SESSION_TRANSACTION_ABORTED
//! - DOC_SESSION_NOT_YET_SUPPORTED

use thiserror::Error;

use crate::config::ConfigError;
use crate::handlers::QueryError;
use crate::schema::SchemaError;
use crate::storage::StorageError;

/// Result type for session and store operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Unit of work errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A flush failed; nothing from the batch was committed
    #[error("Transaction aborted after {executed} of {staged} staged writes: {source}")]
    TransactionAborted {
        staged: usize,
        executed: usize,
        #[source]
        source: Box<SessionError>,
    },

    /// The operation exists but is deliberately unimplemented
    #[error("{0} is not yet supported")]
    NotYetSupported(&'static str),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Query(_) => "DOC_SESSION_QUERY",
            SessionError::Schema(_) => "DOC_SESSION_SCHEMA",
            SessionError::Storage(_) => "DOC_SESSION_STORAGE",
            SessionError::Serialization(_) => "DOC_SESSION_SERIALIZATION",
            SessionError::Config(_) => "DOC_SESSION_CONFIG",
            SessionError::TransactionAborted { .. } => "DOC_SESSION_TRANSACTION_ABORTED",
            SessionError::NotYetSupported(_) => "DOC_SESSION_NOT_YET_SUPPORTED",
        }
    }

    /// The query error behind this failure, if any
    pub fn as_query_error(&self) -> Option<&QueryError> {
        match self {
            SessionError::Query(err) => Some(err),
            SessionError::TransactionAborted { source, .. } => source.as_query_error(),
            _ => None,
        }
    }
}
