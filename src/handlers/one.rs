//! First / Single handler
//!
//! Runs the list query with a row cap: one row for the First variants, two
//! for the Single variants so a second match can be detected.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::expression::{ChoiceOperator, QueryExpression};
use crate::identity::{IdentityBatch, IdentityMap};
use crate::schema::DocumentSchema;
use crate::selector::{IncludeJoin, Selectable};
use crate::storage::{Command, RowCursor};

use super::errors::{QueryError, QueryResult};
use super::list::ListHandler;

/// Row policy of a one-result query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnePolicy {
    /// Fail when more than one row matches
    pub unique: bool,
    /// Return `None` instead of failing when no row matches
    pub or_default: bool,
}

impl OnePolicy {
    /// Policy for a choice operator; `None` for operators handled elsewhere
    pub fn for_choice(choice: ChoiceOperator) -> Option<Self> {
        let (unique, or_default) = match choice {
            ChoiceOperator::First => (false, false),
            ChoiceOperator::FirstOrDefault => (false, true),
            ChoiceOperator::Single => (true, false),
            ChoiceOperator::SingleOrDefault => (true, true),
            _ => return None,
        };
        Some(Self { unique, or_default })
    }

    /// Rows fetched to decide the outcome
    pub fn row_cap(&self) -> usize {
        if self.unique {
            2
        } else {
            1
        }
    }
}

pub struct OneResultHandler<T> {
    inner: ListHandler<T>,
    policy: OnePolicy,
    limit: Option<u64>,
}

impl<T: Selectable> OneResultHandler<T> {
    pub fn new(
        schema: &DocumentSchema,
        query: &QueryExpression,
        includes: &[Arc<dyn IncludeJoin>],
    ) -> QueryResult<Self> {
        let policy = query
            .choice()
            .and_then(OnePolicy::for_choice)
            .ok_or_else(|| {
                QueryError::InvalidExpression(
                    "one-result handler needs a First or Single operator".into(),
                )
            })?;

        Ok(Self {
            inner: ListHandler::new(schema, query, includes)?,
            policy,
            limit: query.limit,
        })
    }

    pub fn policy(&self) -> OnePolicy {
        self.policy
    }

    pub fn configure_command(&self) -> Command {
        let cap = self.policy.row_cap() as u64;
        let limit = self.limit.map_or(cap, |limit| limit.min(cap));
        self.inner.configure_with_limit(Some(limit))
    }

    pub fn handle(&self, rows: &mut dyn RowCursor, map: &mut dyn IdentityMap) -> QueryResult<Option<T>> {
        let mut batch = IdentityBatch::new(map);
        let items = self.inner.read(rows, &mut batch, self.policy.row_cap())?;
        let result = self.choose(items)?;
        batch.commit();
        Ok(result)
    }

    pub async fn handle_async(
        &self,
        rows: &mut dyn RowCursor,
        map: &mut dyn IdentityMap,
        cancel: &CancellationToken,
    ) -> QueryResult<Option<T>> {
        let mut batch = IdentityBatch::new(map);
        let items = self
            .inner
            .read_async(rows, &mut batch, self.policy.row_cap(), cancel)
            .await?;
        let result = self.choose(items)?;
        batch.commit();
        Ok(result)
    }

    fn choose(&self, items: Vec<T>) -> QueryResult<Option<T>> {
        let document = self.inner.document_name();
        if self.policy.unique && items.len() > 1 {
            return Err(QueryError::Cardinality { document });
        }
        match items.into_iter().next() {
            Some(item) => Ok(Some(item)),
            None if self.policy.or_default => Ok(None),
            None => Err(QueryError::NotFound { document }),
        }
    }
}
