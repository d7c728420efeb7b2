//! Unit of work for docstash
//!
//! A `DocumentSession` is opened from a `DocumentStore`. It owns an identity
//! map for its lifetime and a list of staged writes.
//!
//! # Flush Rules
//!
//! - Writes are applied in staging order inside one transaction
//! - The transaction commits only when every write succeeded
//! - A failed flush keeps the staged writes so the caller can retry
//! - Delete and multi-id loads report `NotYetSupported`

mod document_session;
mod errors;

pub use document_session::DocumentSession;
pub use errors::{SessionError, SessionResult};
