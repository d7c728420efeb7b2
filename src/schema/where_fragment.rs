//! Filter tree to where clause translation
//!
//! Parameters are appended to the command in depth-first, left to right
//! order, matching `MemberCollector`.

use crate::expression::{CompareOp, Filter, Operand};
use crate::storage::{Command, DbType, DbValue};

use super::mapping::DocumentMapping;

/// Where clause builder for one filter tree against one mapping
pub struct WhereFragment<'a> {
    mapping: &'a DocumentMapping,
    filter: &'a Filter,
}

impl<'a> WhereFragment<'a> {
    pub fn new(mapping: &'a DocumentMapping, filter: &'a Filter) -> Self {
        Self { mapping, filter }
    }

    /// Renders the predicate, without the `where` keyword, registering
    /// parameters on `command`
    pub fn to_sql(&self, command: &mut Command) -> String {
        self.render(self.filter, command)
    }

    fn render(&self, filter: &Filter, command: &mut Command) -> String {
        match filter {
            Filter::Compare { field, op, operand } => self.compare(field, *op, operand, command),
            Filter::IsNull(field) => {
                format!("{} is null", self.mapping.field_locator(field, DbType::Text))
            }
            Filter::IsNotNull(field) => {
                format!("{} is not null", self.mapping.field_locator(field, DbType::Text))
            }
            Filter::And(parts) => self.join(parts, " and ", "true", command),
            Filter::Or(parts) => self.join(parts, " or ", "false", command),
            Filter::Not(inner) => format!("not ({})", self.render(inner, command)),
        }
    }

    /// An empty list renders the connective's identity: `true` for and,
    /// `false` for or
    fn join(&self, parts: &[Filter], separator: &str, empty: &str, command: &mut Command) -> String {
        match parts {
            [] => empty.to_string(),
            [single] => self.render(single, command),
            _ => {
                let rendered: Vec<String> = parts.iter().map(|p| self.render(p, command)).collect();
                format!("({})", rendered.join(separator))
            }
        }
    }

    fn compare(&self, field: &str, op: CompareOp, operand: &Operand, command: &mut Command) -> String {
        if let Operand::Constant(DbValue::Null) = operand {
            let locator = self.mapping.field_locator(field, DbType::Text);
            match op {
                CompareOp::Eq => return format!("{} is null", locator),
                CompareOp::NotEq => return format!("{} is not null", locator),
                _ => {}
            }
        }

        let db_type = if op.is_text_match() {
            DbType::Text
        } else {
            operand.db_type()
        };
        let locator = self.mapping.field_locator(field, db_type);

        let placeholder = match operand {
            Operand::Constant(DbValue::Text(text)) if op.is_text_match() => {
                command.add_parameter(CompareOp::escape_like(text), db_type)
            }
            Operand::Constant(value) => command.add_parameter(value.clone(), db_type),
            Operand::Member { name, .. } if op.is_text_match() => command.add_like_member_parameter(*name),
            Operand::Member { name, .. } => command.add_member_parameter(*name, db_type),
        };

        format!("{} {} {}", locator, op.sql_operator(), op.like_pattern(&placeholder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::document::{Document, DocumentId};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct User {
        id: i64,
        name: String,
        age: i32,
    }

    impl Document for User {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    fn render(filter: &Filter) -> (String, Command) {
        let mapping = DocumentMapping::for_document::<User>(&StoreOptions::default());
        let mut command = Command::new();
        let sql = WhereFragment::new(&mapping, filter).to_sql(&mut command);
        (sql, command)
    }

    #[test]
    fn test_simple_comparison() {
        let (sql, command) = render(&Filter::eq("name", "Alice"));
        assert_eq!(sql, "d.data ->> 'name' = $1");
        assert_eq!(command.parameters()[0].value, DbValue::Text("Alice".into()));
    }

    #[test]
    fn test_typed_comparison_casts() {
        let (sql, _) = render(&Filter::gt("age", 18));
        assert_eq!(sql, "CAST(d.data ->> 'age' as bigint) > $1");
    }

    #[test]
    fn test_nested_boolean_logic() {
        let filter = Filter::eq("name", "Alice").and(Filter::gt("age", 18).or(Filter::lt("age", 5)));
        let (sql, command) = render(&filter);
        assert_eq!(
            sql,
            "(d.data ->> 'name' = $1 and (CAST(d.data ->> 'age' as bigint) > $2 or CAST(d.data ->> 'age' as bigint) < $3))"
        );
        assert_eq!(command.parameters().len(), 3);
    }

    #[test]
    fn test_null_equality_becomes_is_null() {
        let (sql, command) = render(&Filter::eq("name", DbValue::Null));
        assert_eq!(sql, "d.data ->> 'name' is null");
        assert!(command.parameters().is_empty());

        let (sql, _) = render(&Filter::eq("name", DbValue::Null).not());
        assert_eq!(sql, "not (d.data ->> 'name' is null)");
    }

    #[test]
    fn test_like_operators() {
        let (sql, command) = render(&Filter::contains("name", "li"));
        assert_eq!(sql, r"d.data ->> 'name' like '%' || $1 || '%' escape '\'");
        assert_eq!(command.parameters()[0].value, DbValue::Text("li".into()));
    }

    #[test]
    fn test_like_operand_wildcards_are_escaped() {
        let (_, command) = render(&Filter::contains("name", "50%_off"));
        assert_eq!(command.parameters()[0].value, DbValue::Text(r"50\%\_off".into()));

        let filter = Filter::compare("name", CompareOp::StartsWith, Operand::member("name", DbType::Text));
        let (_, command) = render(&filter);
        assert!(command.parameters()[0].like_operand);
    }

    #[test]
    fn test_empty_connectives_render_identity() {
        let (sql, command) = render(&Filter::Or(vec![]));
        assert_eq!(sql, "false");
        assert!(command.parameters().is_empty());

        let (sql, _) = render(&Filter::And(vec![]));
        assert_eq!(sql, "true");

        let (sql, _) = render(&Filter::Or(vec![]).not());
        assert_eq!(sql, "not (false)");
    }

    #[test]
    fn test_member_operand_registers_member_slot() {
        let filter = Filter::compare("name", CompareOp::Eq, Operand::member("name", DbType::Text));
        let (sql, command) = render(&filter);
        assert_eq!(sql, "d.data ->> 'name' = $1");
        assert_eq!(command.parameters()[0].member, Some("name"));
    }
}
