//! Schema error types
//!
//! Error codes:
//! - DOC_SCHEMA_UNKNOWN_DOCUMENT
//! - DOC_SCHEMA_DUPLICATE_REGISTRATION
//! - DOC_SCHEMA_INVALID_FIELD

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema and mapping errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The document type has no storage mapping
    #[error("No storage mapping registered for document type '{0}'")]
    UnknownDocumentType(String),

    /// The document type was registered twice
    #[error("Document type '{0}' is already registered")]
    DuplicateRegistration(String),

    /// A mapped field cannot be used as configured
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl SchemaError {
    pub fn unknown_document(type_name: impl Into<String>) -> Self {
        Self::UnknownDocumentType(type_name.into())
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::UnknownDocumentType(_) => "DOC_SCHEMA_UNKNOWN_DOCUMENT",
            SchemaError::DuplicateRegistration(_) => "DOC_SCHEMA_DUPLICATE_REGISTRATION",
            SchemaError::InvalidField { .. } => "DOC_SCHEMA_INVALID_FIELD",
        }
    }
}
