//! Row decoding for docstash
//!
//! A selector names the columns a query must read and turns each row into
//! one typed value, consulting the identity map through an `IdentityBatch`.
//! Element types pick their selector through `Selectable`:
//!
//! - `Arc<D>` for a registered document `D` reads the payload and id columns
//! - scalar types (and `Option` of them) read a single projected field
//!
//! Includes widen any selector with side-loaded related documents.

mod document;
mod field;
mod include;

use crate::expression::QueryExpression;
use crate::handlers::QueryResult;
use crate::identity::IdentityBatch;
use crate::schema::{DocumentMapping, DOCUMENT_ALIAS};
use crate::storage::{DbValue, Row};

pub use document::DocumentSelector;
pub use field::FieldSelector;
pub use include::{with_includes, Include, IncludeJoin, IncludeSelector};

/// Decodes rows of one result set into `T`
pub trait Selector<T>: Send + Sync {
    /// Selected column expressions, in row order
    fn select_fields(&self) -> Vec<String>;

    /// Join clauses appended after the from clause
    fn joins(&self) -> Vec<String> {
        Vec::new()
    }

    /// Decodes one row
    fn resolve(&self, row: &mut Row, batch: &mut IdentityBatch<'_>) -> QueryResult<T>;

    /// `select <fields> from <table> as d [joins]`
    fn to_select_clause(&self, mapping: &DocumentMapping) -> String {
        let mut sql = format!(
            "select {} from {} as {}",
            self.select_fields().join(", "),
            mapping.qualified_table_name(),
            DOCUMENT_ALIAS
        );
        for join in self.joins() {
            sql.push(' ');
            sql.push_str(&join);
        }
        sql
    }
}

/// Element types a query can return
pub trait Selectable: Sized + Send + 'static {
    /// Builds the selector used by list and one-result handlers
    fn build_selector(
        mapping: &DocumentMapping,
        query: &QueryExpression,
    ) -> QueryResult<Box<dyn Selector<Self>>>;

    /// Reads one scalar column. `None` means the column was null.
    fn from_db_value(value: DbValue) -> QueryResult<Option<Self>>;
}
