//! Compiled query tests
//!
//! A template type is translated once per store; later executions only copy
//! member values into the cached command.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{scalar_row, store, user, user_row, User};
use docstash::{
    CompareOp, CompiledQuery, DbType, DbValue, Filter, Operand, QueryError, QueryExpression,
    ResultShape, TemplateMember,
};

static OLDER_THAN_TRANSLATIONS: AtomicUsize = AtomicUsize::new(0);

struct UsersOlderThan {
    min_age: i32,
}

impl CompiledQuery for UsersOlderThan {
    type Document = User;
    type Output = Arc<User>;
    const SHAPE: ResultShape = ResultShape::List;

    fn query_is() -> QueryExpression {
        OLDER_THAN_TRANSLATIONS.fetch_add(1, Ordering::SeqCst);
        QueryExpression::for_document::<User>()
            .filter(Filter::compare(
                "age",
                CompareOp::Gt,
                Operand::member("min_age", DbType::Integer),
            ))
            .order_by("name")
    }

    fn members() -> Vec<TemplateMember<Self>> {
        vec![TemplateMember::new("min_age", |q: &Self| q.min_age.into())]
    }
}

struct CountNamed {
    name: String,
}

impl CompiledQuery for CountNamed {
    type Document = User;
    type Output = i64;
    const SHAPE: ResultShape = ResultShape::Value;

    fn query_is() -> QueryExpression {
        QueryExpression::for_document::<User>()
            .filter(Filter::compare(
                "name",
                CompareOp::StartsWith,
                Operand::member("name", DbType::Text),
            ))
            .count()
    }

    fn members() -> Vec<TemplateMember<Self>> {
        vec![TemplateMember::new("name", |q: &Self| q.name.clone().into())]
    }
}

/// Refers to a member it never declares
struct Undeclared;

impl CompiledQuery for Undeclared {
    type Document = User;
    type Output = Arc<User>;
    const SHAPE: ResultShape = ResultShape::List;

    fn query_is() -> QueryExpression {
        QueryExpression::for_document::<User>().filter(Filter::compare(
            "age",
            CompareOp::Eq,
            Operand::member("age", DbType::Integer),
        ))
    }

    fn members() -> Vec<TemplateMember<Self>> {
        Vec::new()
    }
}

// =============================================================================
// CACHE BEHAVIOR
// =============================================================================

#[test]
fn test_template_translated_once_and_rebound_per_call() {
    let (store, backend) = store();
    backend.push_rows(vec![user_row(&user(1, "ann", 41))]);
    backend.push_rows(vec![]);

    let mut session = store.open_session();
    let older_than_30 = session
        .query_compiled(&UsersOlderThan { min_age: 30 })
        .unwrap()
        .into_list()
        .unwrap();
    let older_than_50 = session
        .query_compiled(&UsersOlderThan { min_age: 50 })
        .unwrap()
        .into_list()
        .unwrap();

    assert_eq!(older_than_30.len(), 1);
    assert!(older_than_50.is_empty());
    assert_eq!(OLDER_THAN_TRANSLATIONS.load(Ordering::SeqCst), 1);
    assert_eq!(store.handler_factory().cache().len(), 1);

    let executed = backend.executed_commands();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].sql(), executed[1].sql());
    assert_eq!(executed[0].parameter_values(), vec![&DbValue::Int(30)]);
    assert_eq!(executed[1].parameter_values(), vec![&DbValue::Int(50)]);
}

#[test]
fn test_compiled_scalar_query() {
    let (store, backend) = store();
    backend.push_rows(vec![scalar_row(2i64)]);

    let mut session = store.open_session();
    let count = session
        .query_compiled(&CountNamed { name: "an".into() })
        .unwrap()
        .into_count()
        .unwrap();
    assert_eq!(count, 2);

    let command = &backend.executed_commands()[0];
    assert_eq!(
        command.sql(),
        r"select count(*) from public.mt_doc_user as d where d.data ->> 'name' like $1 || '%' escape '\'"
    );
    assert_eq!(command.parameter_values(), vec![&DbValue::Text("an".into())]);
    assert!(store.handler_factory().cache().contains::<CountNamed>());
}

#[test]
fn test_undeclared_member_fails_and_is_not_cached() {
    let (store, backend) = store();
    let mut session = store.open_session();

    let err = session.query_compiled(&Undeclared).unwrap_err();
    assert!(matches!(
        err.as_query_error(),
        Some(QueryError::InvalidExpression(_))
    ));
    assert!(!store.handler_factory().cache().contains::<Undeclared>());
    assert!(backend.executed_commands().is_empty());
}

#[tokio::test]
async fn test_compiled_query_async() {
    let (store, backend) = store();
    backend.push_rows(vec![scalar_row(0i64)]);

    let cancel = tokio_util::sync::CancellationToken::new();
    let mut session = store.open_session();
    let count = session
        .query_compiled_async(&CountNamed { name: "zed".into() }, &cancel)
        .await
        .unwrap()
        .into_count()
        .unwrap();
    assert_eq!(count, 0);
}

struct UsersNamed {
    name: String,
}

impl CompiledQuery for UsersNamed {
    type Document = User;
    type Output = Arc<User>;
    const SHAPE: ResultShape = ResultShape::List;

    fn query_is() -> QueryExpression {
        QueryExpression::for_document::<User>().filter(Filter::compare(
            "name",
            CompareOp::Eq,
            Operand::member("name", DbType::Text),
        ))
    }

    fn members() -> Vec<TemplateMember<Self>> {
        vec![TemplateMember::new("name", |q: &Self| q.name.clone().into())]
    }
}

#[test]
fn test_concurrent_first_use_keeps_one_entry() {
    let (store, backend) = store();

    std::thread::scope(|scope| {
        for index in 0..8 {
            let store = &store;
            scope.spawn(move || {
                let mut session = store.open_session();
                let found = session
                    .query_compiled(&UsersNamed {
                        name: format!("user-{}", index),
                    })
                    .unwrap()
                    .into_list()
                    .unwrap();
                assert!(found.is_empty());
            });
        }
    });

    assert_eq!(store.handler_factory().cache().len(), 1);

    let mut names: Vec<DbValue> = backend
        .executed_commands()
        .iter()
        .map(|c| c.parameter_values()[0].clone())
        .collect();
    names.sort_by_key(|v| format!("{:?}", v));
    let expected: Vec<DbValue> = (0..8).map(|i| DbValue::Text(format!("user-{}", i))).collect();
    assert_eq!(names, expected);
}

struct UsersNickNamed {
    nickname: Option<String>,
}

impl CompiledQuery for UsersNickNamed {
    type Document = User;
    type Output = Arc<User>;
    const SHAPE: ResultShape = ResultShape::List;

    fn query_is() -> QueryExpression {
        QueryExpression::for_document::<User>().filter(Filter::compare(
            "name",
            CompareOp::Eq,
            Operand::member("nickname", DbType::Text),
        ))
    }

    fn members() -> Vec<TemplateMember<Self>> {
        vec![TemplateMember::new("nickname", |q: &Self| q.nickname.clone().into())]
    }
}

// =============================================================================
// MEMBER VALUES
// =============================================================================

#[test]
fn test_null_member_value_is_rejected() {
    let (store, backend) = store();
    let mut session = store.open_session();

    let err = session
        .query_compiled(&UsersNickNamed { nickname: None })
        .unwrap_err();
    assert!(matches!(
        err.as_query_error(),
        Some(QueryError::InvalidExpression(message)) if message.contains("nickname")
    ));
    assert!(backend.executed_commands().is_empty());

    // The cached entry still serves non-null values
    let found = session
        .query_compiled(&UsersNickNamed {
            nickname: Some("ann".into()),
        })
        .unwrap()
        .into_list()
        .unwrap();
    assert!(found.is_empty());
    assert_eq!(
        backend.executed_commands()[0].parameter_values(),
        vec![&DbValue::Text("ann".into())]
    );
}

#[test]
fn test_like_member_wildcards_match_literally() {
    let (store, backend) = store();
    backend.push_rows(vec![scalar_row(0i64)]);

    let mut session = store.open_session();
    session
        .query_compiled(&CountNamed { name: "a_b%".into() })
        .unwrap()
        .into_count()
        .unwrap();

    assert_eq!(
        backend.executed_commands()[0].parameter_values(),
        vec![&DbValue::Text(r"a\_b\%".into())]
    );
}
