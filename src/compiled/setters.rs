//! Parameter setter discovery
//!
//! Setters are derived once per template type from the configured command:
//! every parameter slot tagged with a template member gets one setter. The
//! static member walk over the expression must agree with the slot order,
//! otherwise the command was not built from that expression.

use std::fmt;

use crate::expression::{MemberCollector, QueryExpression};
use crate::handlers::{QueryError, QueryResult};
use crate::expression::CompareOp;
use crate::storage::{Command, DbValue};

use super::template::CompiledQuery;

/// Copies one template member into one command slot
pub struct ParameterSetter<Q> {
    member: &'static str,
    slot: usize,
    like_operand: bool,
    read: fn(&Q) -> DbValue,
}

impl<Q: CompiledQuery> ParameterSetter<Q> {
    /// Derives the ordered setters for `command`, built from `query`
    pub fn discover(query: &QueryExpression, command: &Command) -> QueryResult<Vec<Self>> {
        let referenced = MemberCollector::collect(query);
        let slots: Vec<(usize, &'static str, bool)> = command
            .parameters()
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| p.member.map(|member| (slot, member, p.like_operand)))
            .collect();

        let in_order = referenced.len() == slots.len()
            && referenced.iter().zip(&slots).all(|(a, (_, b, _))| a == b);
        if !in_order {
            return Err(QueryError::internal(format!(
                "command parameters of {} do not follow its expression members",
                std::any::type_name::<Q>()
            )));
        }

        let members = Q::members();
        slots
            .into_iter()
            .map(|(slot, name, like_operand)| {
                let member = members.iter().find(|m| m.name == name).ok_or_else(|| {
                    QueryError::InvalidExpression(format!(
                        "{} has no template member '{}'",
                        std::any::type_name::<Q>(),
                        name
                    ))
                })?;
                Ok(Self {
                    member: name,
                    slot,
                    like_operand,
                    read: member.read,
                })
            })
            .collect()
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Writes the live template's value into the command.
    ///
    /// A null value is rejected: the cached text compares with `=`, which
    /// never matches null.
    pub fn apply(&self, template: &Q, command: &mut Command) -> QueryResult<()> {
        let value = match (self.read)(template) {
            DbValue::Null => {
                return Err(QueryError::InvalidExpression(format!(
                    "template member '{}' of {} is null; use is_null or is_not_null filters",
                    self.member,
                    std::any::type_name::<Q>()
                )))
            }
            DbValue::Text(text) if self.like_operand => DbValue::Text(CompareOp::escape_like(&text)),
            value => value,
        };
        command.set_parameter_value(self.slot, value)?;
        Ok(())
    }
}

impl<Q> fmt::Debug for ParameterSetter<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSetter")
            .field("member", &self.member)
            .field("slot", &self.slot)
            .field("like_operand", &self.like_operand)
            .finish()
    }
}
