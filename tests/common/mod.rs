//! Shared documents and store setup for the integration suites

#![allow(dead_code)]

use docstash::storage::scripted::ScriptedConnectionFactory;
use docstash::{
    DbType, DbValue, Document, DocumentId, DocumentStore, Row, StoreBuilder, StoreOptions,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i32,
}

impl Document for User {
    const ID_TYPE: DbType = DbType::BigInt;

    fn document_id(&self) -> DocumentId {
        DocumentId::Int(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub assignee_id: Option<i64>,
}

impl Document for Issue {
    const ID_TYPE: DbType = DbType::Uuid;

    fn document_id(&self) -> DocumentId {
        DocumentId::Uuid(self.id)
    }
}

pub fn user(id: i64, name: &str, age: i32) -> User {
    User {
        id,
        name: name.to_string(),
        age,
    }
}

/// `data, id` row as the document selector reads it
pub fn user_row(user: &User) -> Row {
    Row::new(vec![
        DbValue::Json(serde_json::to_value(user).unwrap()),
        DbValue::Int(user.id),
    ])
}

pub fn scalar_row(value: impl Into<DbValue>) -> Row {
    Row::new(vec![value.into()])
}

pub fn store_with(options: StoreOptions) -> (DocumentStore, ScriptedConnectionFactory) {
    let backend = ScriptedConnectionFactory::new();
    let store = StoreBuilder::new(options)
        .register::<User>()
        .unwrap()
        .register::<Issue>()
        .unwrap()
        .build(backend.clone())
        .unwrap();
    (store, backend)
}

pub fn store() -> (DocumentStore, ScriptedConnectionFactory) {
    store_with(StoreOptions::default())
}
