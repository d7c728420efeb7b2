//! Document trait and identifiers
//!
//! A document is any serde type with an identifier. Its payload is stored
//! as JSON; the identifier lives in its own typed column.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::storage::{DbType, DbValue};

/// An application type persisted as a JSON payload
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Column type of the identifier
    const ID_TYPE: DbType;

    /// Returns this document's identifier
    fn document_id(&self) -> DocumentId;

    /// Storage alias, used to derive the table name
    fn alias() -> String {
        default_alias(std::any::type_name::<Self>())
    }
}

/// Derives `user` from `my_app::model::User` and `page` from `Page<Draft>`
fn default_alias(type_name: &str) -> String {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_lowercase()
}

/// Document identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentId {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl DocumentId {
    /// Value-typed identifiers (numbers, uuids) as opposed to strings
    pub fn is_value_type(&self) -> bool {
        !matches!(self, DocumentId::Text(_))
    }

    pub fn db_type(&self) -> DbType {
        match self {
            DocumentId::Int(_) => DbType::BigInt,
            DocumentId::Uuid(_) => DbType::Uuid,
            DocumentId::Text(_) => DbType::Text,
        }
    }

    pub fn to_db_value(&self) -> DbValue {
        match self {
            DocumentId::Int(v) => DbValue::Int(*v),
            DocumentId::Uuid(v) => DbValue::Uuid(*v),
            DocumentId::Text(v) => DbValue::Text(v.clone()),
        }
    }

    /// Reads an identifier column. Uuids stored as text are recognized.
    pub fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Int(v) => Some(DocumentId::Int(*v)),
            DbValue::Uuid(v) => Some(DocumentId::Uuid(*v)),
            DbValue::Text(v) => Some(
                Uuid::parse_str(v)
                    .map(DocumentId::Uuid)
                    .unwrap_or_else(|_| DocumentId::Text(v.clone())),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(v) => write!(f, "{}", v),
            DocumentId::Uuid(v) => write!(f, "{}", v),
            DocumentId::Text(v) => f.write_str(v),
        }
    }
}

impl From<i32> for DocumentId {
    fn from(v: i32) -> Self {
        DocumentId::Int(i64::from(v))
    }
}

impl From<i64> for DocumentId {
    fn from(v: i64) -> Self {
        DocumentId::Int(v)
    }
}

impl From<Uuid> for DocumentId {
    fn from(v: Uuid) -> Self {
        DocumentId::Uuid(v)
    }
}

impl From<String> for DocumentId {
    fn from(v: String) -> Self {
        DocumentId::Text(v)
    }
}

impl From<&str> for DocumentId {
    fn from(v: &str) -> Self {
        DocumentId::Text(v.to_string())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for uuid::Uuid {}
}

/// Value-typed identifiers accepted by point loads
pub trait ValueId: sealed::Sealed {
    fn into_document_id(self) -> DocumentId;
}

impl ValueId for i32 {
    fn into_document_id(self) -> DocumentId {
        DocumentId::from(self)
    }
}

impl ValueId for i64 {
    fn into_document_id(self) -> DocumentId {
        DocumentId::from(self)
    }
}

impl ValueId for Uuid {
    fn into_document_id(self) -> DocumentId {
        DocumentId::from(self)
    }
}
