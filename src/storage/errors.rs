//! Storage backend error types
//!
//! Error codes:
//! - DOC_STORAGE_CONNECTION
//! - DOC_STORAGE_COMMAND
//! - DOC_STORAGE_TRANSACTION
//! - DOC_STORAGE_DECODE

use thiserror::Error;

/// Result type for storage backend operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures surfaced by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Connection could not be created or opened
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The backend rejected or failed to execute a command
    #[error("Command failed: {reason} (sql: {sql})")]
    Command { sql: String, reason: String },

    /// Begin, commit or rollback failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// A column value could not be read as the requested type
    #[error("Cannot decode column {index}: {reason}")]
    Decode { index: usize, reason: String },
}

impl StorageError {
    /// Create a command failure for the given statement
    pub fn command(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            sql: sql.into(),
            reason: reason.into(),
        }
    }

    /// Create a column decode failure
    pub fn decode(index: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            index,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Connection(_) => "DOC_STORAGE_CONNECTION",
            StorageError::Command { .. } => "DOC_STORAGE_COMMAND",
            StorageError::Transaction(_) => "DOC_STORAGE_TRANSACTION",
            StorageError::Decode { .. } => "DOC_STORAGE_DECODE",
        }
    }
}
