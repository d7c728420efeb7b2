//! Document schema for docstash
//!
//! Maps document types to tables and JSON field locators, and builds the
//! commands that depend only on that mapping: point loads, upserts, where
//! fragments and table DDL.
//!
//! # Rules
//!
//! - Every queried or stored type must be registered first
//! - Unknown types fail before any command is built
//! - Mappings are immutable once the store is built

mod errors;
mod mapping;
mod registry;
mod where_fragment;

pub use errors::{SchemaError, SchemaResult};
pub use mapping::{DocumentMapping, DuplicatedField, DOCUMENT_ALIAS};
pub use registry::DocumentSchema;
pub use where_fragment::WhereFragment;
