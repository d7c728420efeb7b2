//! Query expression structures
//!
//! Defines the parsed query representation consumed by the handler factory.

use std::any::TypeId;

use crate::document::Document;
use crate::storage::{DbType, DbValue};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match on text fields
    Contains,
    StartsWith,
    EndsWith,
}

impl CompareOp {
    /// Returns true for the text pattern operators
    pub fn is_text_match(&self) -> bool {
        matches!(
            self,
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith
        )
    }

    /// Returns the SQL operator
    pub fn sql_operator(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => "like",
        }
    }

    /// Builds the like pattern around a placeholder by concatenation, so the
    /// same text works for constants and template members
    pub fn like_pattern(&self, placeholder: &str) -> String {
        match self {
            CompareOp::Contains => format!("'%' || {} || '%' escape '\\'", placeholder),
            CompareOp::StartsWith => format!("{} || '%' escape '\\'", placeholder),
            CompareOp::EndsWith => format!("'%' || {} escape '\\'", placeholder),
            _ => placeholder.to_string(),
        }
    }

    /// Escapes `\`, `%` and `_` so a like operand matches literally
    pub fn escape_like(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '\\' | '%' | '_') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal value
    Constant(DbValue),
    /// A compiled-query template member, read from the live template per call
    Member { name: &'static str, db_type: DbType },
}

impl Operand {
    pub fn constant(value: impl Into<DbValue>) -> Self {
        Operand::Constant(value.into())
    }

    /// Template member operand. The member must never read as null: the
    /// command text is fixed at first use, so a null cannot become
    /// `is null`. Use `Filter::is_null` or `Filter::is_not_null` instead.
    pub fn member(name: &'static str, db_type: DbType) -> Self {
        Operand::Member { name, db_type }
    }

    /// Type used to cast the compared field
    pub fn db_type(&self) -> DbType {
        match self {
            Operand::Constant(value) => value.db_type(),
            Operand::Member { db_type, .. } => *db_type,
        }
    }
}

/// Filter predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        operand: Operand,
    },
    IsNull(String),
    IsNotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: CompareOp, operand: Operand) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            operand,
        }
    }

    /// Equality against a constant
    pub fn eq(field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::compare(field, CompareOp::Eq, Operand::constant(value))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::compare(field, CompareOp::NotEq, Operand::constant(value))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::compare(field, CompareOp::Gt, Operand::constant(value))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::compare(field, CompareOp::Gte, Operand::constant(value))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::compare(field, CompareOp::Lt, Operand::constant(value))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::compare(field, CompareOp::Lte, Operand::constant(value))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Contains, Operand::Constant(DbValue::Text(value.into())))
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::StartsWith, Operand::Constant(DbValue::Text(value.into())))
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::EndsWith, Operand::Constant(DbValue::Text(value.into())))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Filter::IsNotNull(field.into())
    }

    /// Conjunction, flattening nested ands
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested ors
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One ordering clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
    /// Type the field is compared as (default: text)
    pub db_type: DbType,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
            db_type: DbType::Text,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
            db_type: DbType::Text,
        }
    }

    /// Sorts by the field cast to `db_type`
    pub fn typed(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }
}

/// Terminal operators that pick one value out of the result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceOperator {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    Min,
    Max,
}

impl ChoiceOperator {
    /// True for the `OrDefault` variants
    pub fn returns_default_when_empty(&self) -> bool {
        matches!(
            self,
            ChoiceOperator::FirstOrDefault
                | ChoiceOperator::SingleOrDefault
                | ChoiceOperator::LastOrDefault
        )
    }
}

/// Operators that reduce the result set to a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOperator {
    Count,
    LongCount,
    Sum,
    Average,
    Any,
}

/// A terminal result operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOperator {
    Choice(ChoiceOperator),
    Aggregate(AggregateOperator),
}

/// Single-field projection replacing the whole document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Field path, dot separated for nested fields
    pub field: String,
    /// Type the field is read as
    pub db_type: DbType,
}

/// Parsed query over one document type
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpression {
    document_type: TypeId,
    document_name: &'static str,
    /// Filter predicate tree
    pub filter: Option<Filter>,
    /// Ordering clauses, applied in order
    pub ordering: Vec<SortSpec>,
    /// Maximum number of rows
    pub limit: Option<u64>,
    /// Rows to skip
    pub offset: Option<u64>,
    /// Optional single-field projection
    pub projection: Option<Projection>,
    /// Terminal result operators
    pub operators: Vec<ResultOperator>,
}

impl QueryExpression {
    /// Creates an unfiltered query over document type `D`
    pub fn for_document<D: Document>() -> Self {
        Self {
            document_type: TypeId::of::<D>(),
            document_name: std::any::type_name::<D>(),
            filter: None,
            ordering: Vec::new(),
            limit: None,
            offset: None,
            projection: None,
            operators: Vec::new(),
        }
    }

    /// Source document type
    pub fn document_type(&self) -> TypeId {
        self.document_type
    }

    /// Source document type name, for messages
    pub fn document_name(&self) -> &'static str {
        self.document_name
    }

    /// Adds a filter, and-ed with any existing one
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.ordering.push(SortSpec::asc(field));
        self
    }

    pub fn order_by_descending(mut self, field: impl Into<String>) -> Self {
        self.ordering.push(SortSpec::desc(field));
        self
    }

    /// Adds an explicit ordering clause
    pub fn order(mut self, spec: SortSpec) -> Self {
        self.ordering.push(spec);
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Projects a single field instead of the whole document
    pub fn select(mut self, field: impl Into<String>, db_type: DbType) -> Self {
        self.projection = Some(Projection {
            field: field.into(),
            db_type,
        });
        self
    }

    pub fn with_operator(mut self, operator: ResultOperator) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn count(self) -> Self {
        self.with_operator(ResultOperator::Aggregate(AggregateOperator::Count))
    }

    pub fn long_count(self) -> Self {
        self.with_operator(ResultOperator::Aggregate(AggregateOperator::LongCount))
    }

    pub fn sum(self) -> Self {
        self.with_operator(ResultOperator::Aggregate(AggregateOperator::Sum))
    }

    pub fn average(self) -> Self {
        self.with_operator(ResultOperator::Aggregate(AggregateOperator::Average))
    }

    pub fn any(self) -> Self {
        self.with_operator(ResultOperator::Aggregate(AggregateOperator::Any))
    }

    pub fn first(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::First))
    }

    pub fn first_or_default(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::FirstOrDefault))
    }

    pub fn single(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::Single))
    }

    pub fn single_or_default(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::SingleOrDefault))
    }

    pub fn last(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::Last))
    }

    pub fn last_or_default(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::LastOrDefault))
    }

    pub fn min(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::Min))
    }

    pub fn max(self) -> Self {
        self.with_operator(ResultOperator::Choice(ChoiceOperator::Max))
    }

    /// Returns true if the given aggregate operator is present
    pub fn has_aggregate(&self, operator: AggregateOperator) -> bool {
        self.operators
            .iter()
            .any(|op| *op == ResultOperator::Aggregate(operator))
    }

    /// Returns the aggregate operator, if any
    pub fn aggregate(&self) -> Option<AggregateOperator> {
        self.operators.iter().find_map(|op| match op {
            ResultOperator::Aggregate(agg) => Some(*agg),
            ResultOperator::Choice(_) => None,
        })
    }

    /// Returns the choice operator, if any
    pub fn choice(&self) -> Option<ChoiceOperator> {
        self.operators.iter().find_map(|op| match op {
            ResultOperator::Choice(choice) => Some(*choice),
            ResultOperator::Aggregate(_) => None,
        })
    }

    /// Checks the structural rules: at most one choice and one aggregate
    /// operator, and a projection wherever a field aggregate needs one.
    pub fn validate(&self) -> Result<(), String> {
        let choices = self
            .operators
            .iter()
            .filter(|op| matches!(op, ResultOperator::Choice(_)))
            .count();
        if choices > 1 {
            return Err(format!("query has {} choice operators, at most one allowed", choices));
        }

        let aggregates = self.operators.len() - choices;
        if aggregates > 1 {
            return Err(format!(
                "query has {} aggregate operators, at most one allowed",
                aggregates
            ));
        }

        let needs_projection = matches!(
            self.aggregate(),
            Some(AggregateOperator::Sum | AggregateOperator::Average)
        ) || matches!(self.choice(), Some(ChoiceOperator::Min | ChoiceOperator::Max));

        if needs_projection && self.projection.is_none() {
            return Err("sum, average, min and max require a selected field".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct User {
        id: i64,
        name: String,
    }

    impl Document for User {
        const ID_TYPE: DbType = DbType::BigInt;

        fn document_id(&self) -> DocumentId {
            DocumentId::Int(self.id)
        }
    }

    #[test]
    fn test_query_builder() {
        let query = QueryExpression::for_document::<User>()
            .filter(Filter::eq("name", "Alice"))
            .order_by("name")
            .take(2)
            .skip(1);

        assert_eq!(query.document_type(), TypeId::of::<User>());
        assert_eq!(query.ordering, vec![SortSpec::asc("name")]);
        assert_eq!(query.limit, Some(2));
        assert_eq!(query.offset, Some(1));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_filters_are_anded() {
        let query = QueryExpression::for_document::<User>()
            .filter(Filter::eq("name", "Alice"))
            .filter(Filter::gt("age", 18))
            .filter(Filter::lt("age", 65));

        match query.filter {
            Some(Filter::And(parts)) => assert_eq!(parts.len(), 3),
            other => panic!("expected flattened and, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_lookup() {
        let query = QueryExpression::for_document::<User>().count();
        assert_eq!(query.aggregate(), Some(AggregateOperator::Count));
        assert_eq!(query.choice(), None);
        assert!(query.has_aggregate(AggregateOperator::Count));

        let query = QueryExpression::for_document::<User>().single_or_default();
        assert_eq!(query.choice(), Some(ChoiceOperator::SingleOrDefault));
        assert!(ChoiceOperator::SingleOrDefault.returns_default_when_empty());
        assert!(!ChoiceOperator::Single.returns_default_when_empty());
    }

    #[test]
    fn test_validate_rejects_two_choices() {
        let query = QueryExpression::for_document::<User>().first().single();
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_validate_requires_projection_for_sum() {
        let query = QueryExpression::for_document::<User>().sum();
        assert!(query.validate().is_err());

        let query = QueryExpression::for_document::<User>()
            .select("age", DbType::Integer)
            .sum();
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_like_patterns() {
        assert_eq!(CompareOp::Contains.like_pattern("$1"), r"'%' || $1 || '%' escape '\'");
        assert_eq!(CompareOp::StartsWith.like_pattern("$1"), r"$1 || '%' escape '\'");
        assert_eq!(CompareOp::EndsWith.like_pattern("$2"), r"'%' || $2 escape '\'");
        assert_eq!(CompareOp::Eq.like_pattern("$1"), "$1");
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(CompareOp::escape_like("50%"), r"50\%");
        assert_eq!(CompareOp::escape_like("a_b"), r"a\_b");
        assert_eq!(CompareOp::escape_like(r"c:\tmp"), r"c:\\tmp");
        assert_eq!(CompareOp::escape_like("plain"), "plain");
    }
}
