//! Static traversal over query expressions
//!
//! Traversal order is depth-first, left to right, which is the same order in
//! which the where-fragment builder appends command parameters.

use super::ast::{Filter, Operand, QueryExpression};

/// Visitor over the parts of a query expression that can carry operands
pub trait ExpressionVisitor {
    fn visit_filter(&mut self, filter: &Filter) {
        walk_filter(self, filter);
    }

    fn visit_operand(&mut self, _field: &str, _operand: &Operand) {}
}

/// Visits the filter tree of an expression
pub fn walk_expression<V: ExpressionVisitor + ?Sized>(visitor: &mut V, query: &QueryExpression) {
    if let Some(filter) = &query.filter {
        visitor.visit_filter(filter);
    }
}

/// Visits the children of a filter node
pub fn walk_filter<V: ExpressionVisitor + ?Sized>(visitor: &mut V, filter: &Filter) {
    match filter {
        Filter::Compare { field, operand, .. } => visitor.visit_operand(field, operand),
        Filter::IsNull(_) | Filter::IsNotNull(_) => {}
        Filter::And(parts) | Filter::Or(parts) => {
            for part in parts {
                visitor.visit_filter(part);
            }
        }
        Filter::Not(inner) => visitor.visit_filter(inner),
    }
}

/// Collects template member references in traversal order
#[derive(Debug, Default)]
pub struct MemberCollector {
    members: Vec<&'static str>,
}

impl MemberCollector {
    pub fn collect(query: &QueryExpression) -> Vec<&'static str> {
        let mut collector = Self::default();
        walk_expression(&mut collector, query);
        collector.members
    }
}

impl ExpressionVisitor for MemberCollector {
    fn visit_operand(&mut self, _field: &str, operand: &Operand) {
        if let Operand::Member { name, .. } = operand {
            self.members.push(name);
        }
    }
}
