//! Compiled queries for docstash
//!
//! A compiled query is a template type whose expression is translated once.
//! Later calls clone the cached command, copy the live template's member
//! values into their slots and reuse the cached handler.
//!
//! # Rules
//!
//! - The cache key is the template type, never its values
//! - `CompiledQuery::query_is` runs at most once per type under no contention
//! - A racing first build may run twice; only one entry is ever stored
//! - Compiled queries take no include joins

mod cache;
mod setters;
mod template;

pub use cache::{CachedQuery, CompiledHandler, CompiledQueryCache};
pub use setters::ParameterSetter;
pub use template::{CompiledQuery, TemplateMember};
