//! Unit of work tests
//!
//! Staged writes, transactional flushes, point loads and cancellation.

mod common;

use std::sync::Arc;

use common::{scalar_row, store, store_with, user, user_row, User};
use docstash::{
    DbValue, QueryError, QueryExpression, SessionError, StoreBuilder, StoreOptions,
};
use docstash::storage::scripted::ScriptedConnectionFactory;
use tokio_util::sync::CancellationToken;

// =============================================================================
// SAVE CHANGES
// =============================================================================

#[test]
fn test_save_changes_commits_in_staging_order() {
    let (store, backend) = store();
    let mut session = store.open_session();

    session.store(user(1, "ann", 30));
    session.store(user(2, "bob", 41));
    assert_eq!(session.pending_changes(), 2);

    session.save_changes().unwrap();
    assert_eq!(session.pending_changes(), 0);

    let committed = backend.committed_commands();
    assert_eq!(committed.len(), 2);
    assert!(committed[0]
        .sql()
        .starts_with("insert into public.mt_doc_user (id, data, mt_last_modified)"));
    assert_eq!(committed[0].parameter_values()[0], &DbValue::Int(1));
    assert_eq!(committed[1].parameter_values()[0], &DbValue::Int(2));
    assert_eq!(backend.commits(), 1);
    assert_eq!(backend.open_connections(), 0);
}

#[test]
fn test_save_changes_without_staged_writes_is_a_no_op() {
    let (store, backend) = store();
    let mut session = store.open_session();

    session.save_changes().unwrap();
    assert_eq!(backend.connections_created(), 0);
}

#[test]
fn test_failed_write_rolls_back_the_whole_batch() {
    let (store, backend) = store();
    let mut session = store.open_session();
    session.store(user(1, "ann", 30));
    session.store(user(2, "bob", 41));
    session.store(user(3, "cy", 29));

    backend.fail_write(2);
    let err = session.save_changes().unwrap_err();

    match &err {
        SessionError::TransactionAborted {
            staged, executed, ..
        } => {
            assert_eq!(*staged, 3);
            assert_eq!(*executed, 1);
        }
        other => panic!("expected an aborted transaction, got {:?}", other),
    }
    assert_eq!(err.code(), "DOC_SESSION_TRANSACTION_ABORTED");
    assert!(backend.committed_commands().is_empty());
    assert_eq!(backend.commits(), 0);
    assert_eq!(backend.rollbacks(), 1);

    // The third write never reached the backend
    assert_eq!(backend.executed_commands().len(), 2);

    // Staged writes survive for a retry
    assert_eq!(session.pending_changes(), 3);
    session.save_changes().unwrap();
    assert_eq!(backend.committed_commands().len(), 3);
}

#[tokio::test]
async fn test_save_changes_async_commits() {
    let (store, backend) = store();
    let mut session = store.open_session();
    session.store(user(4, "dee", 33));

    session
        .save_changes_async(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(backend.committed_commands().len(), 1);
}

#[tokio::test]
async fn test_cancelled_save_changes_commits_nothing() {
    let (store, backend) = store();
    let mut session = store.open_session();
    session.store(user(4, "dee", 33));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = session.save_changes_async(&cancel).await.unwrap_err();

    assert_eq!(err.as_query_error(), Some(&QueryError::Cancelled));
    assert!(backend.committed_commands().is_empty());
    assert_eq!(session.pending_changes(), 1);
}

// =============================================================================
// LOAD
// =============================================================================

#[test]
fn test_load_decodes_and_tracks() {
    let (store, backend) = store();
    let ann = user(1, "ann", 30);
    backend.push_rows(vec![scalar_row(serde_json::to_string(&ann).unwrap())]);

    let mut session = store.open_session();
    let loaded = session.load::<User>(1i64).unwrap().unwrap();
    assert_eq!(*loaded, ann);

    let command = &backend.executed_commands()[0];
    assert_eq!(
        command.sql(),
        "select data from public.mt_doc_user as d where id = $1"
    );
    assert_eq!(command.parameter_values(), vec![&DbValue::Int(1)]);

    // Second load is served from the identity map
    let again = session.load::<User>(1i64).unwrap().unwrap();
    assert!(Arc::ptr_eq(&loaded, &again));
    assert_eq!(backend.executed_commands().len(), 1);
}

#[test]
fn test_load_missing_document_returns_none() {
    let (store, _backend) = store();
    let mut session = store.open_session();
    assert!(session.load::<User>(99i32).unwrap().is_none());
    assert!(session.identity_map().is_empty());
}

#[test]
fn test_load_without_identity_map_reads_every_time() {
    let options = StoreOptions {
        use_identity_map: false,
        ..StoreOptions::default()
    };
    let (store, backend) = store_with(options);
    let ann = user(1, "ann", 30);
    backend.push_rows(vec![user_row(&ann)]);
    backend.push_rows(vec![user_row(&ann)]);

    let mut session = store.open_session();
    let first = session.load::<User>(1i64).unwrap().unwrap();
    let second = session.load::<User>(1i64).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(backend.executed_commands().len(), 2);
}

#[test]
fn test_load_unregistered_type_fails() {
    let backend = ScriptedConnectionFactory::new();
    let store = StoreBuilder::new(StoreOptions::default())
        .build(backend.clone())
        .unwrap();

    let mut session = store.open_session();
    let err = session.load::<User>(1i64).unwrap_err();
    assert!(matches!(err, SessionError::Schema(_)));
    assert!(backend.executed_commands().is_empty());
}

#[tokio::test]
async fn test_load_async() {
    let (store, backend) = store();
    backend.push_rows(vec![user_row(&user(5, "eve", 27))]);

    let mut session = store.open_session();
    let eve = session
        .load_async::<User>(5i64, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(eve.name, "eve");
}

// =============================================================================
// NOT YET SUPPORTED
// =============================================================================

#[test]
fn test_unimplemented_operations_report_not_yet_supported() {
    let (store, backend) = store();
    let mut session = store.open_session();
    let ann = user(1, "ann", 30);

    let errors = vec![
        session.delete(&ann).unwrap_err(),
        session.delete_by_id::<User>(1i64).unwrap_err(),
        session.delete_by_string::<User>("ann").unwrap_err(),
        session.load_by_string::<User>("ann").unwrap_err(),
        session.load_many::<User, i64>(vec![1, 2]).unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, SessionError::NotYetSupported(_)));
        assert_eq!(err.code(), "DOC_SESSION_NOT_YET_SUPPORTED");
    }
    assert_eq!(backend.connections_created(), 0);
    assert_eq!(session.pending_changes(), 0);
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[tokio::test]
async fn test_cancelled_query_tracks_nothing() {
    let (store, backend) = store();
    backend.push_rows(vec![user_row(&user(1, "ann", 30))]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut session = store.open_session();
    let err = session
        .to_list_async::<Arc<User>>(&QueryExpression::for_document::<User>(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.as_query_error(), Some(&QueryError::Cancelled));
    assert!(session.identity_map().is_empty());
    assert_eq!(backend.open_connections(), 0);
}

#[tokio::test]
async fn test_async_list_matches_blocking_list() {
    let (store, backend) = store();
    backend.push_rows(vec![user_row(&user(1, "ann", 30)), user_row(&user(2, "bob", 41))]);

    let mut session = store.open_session();
    let found = session
        .to_list_async::<Arc<User>>(
            &QueryExpression::for_document::<User>(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(session.identity_map().len(), 2);
}
