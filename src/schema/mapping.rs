//! Per-document-type storage mapping
//!
//! A mapping knows the table a document type lives in, how to locate a JSON
//! field inside the payload column, and how to build the point-lookup and
//! upsert commands for that table.
//!
//! Table layout:
//! - `id`: identifier, typed by `Document::ID_TYPE`
//! - `data`: JSON payload (`jsonb`)
//! - `mt_last_modified`: transaction timestamp of the last upsert
//! - one typed column per duplicated field

use std::any::TypeId;

use chrono::DateTime;
use serde_json::Value;
use uuid::Uuid;

use crate::config::StoreOptions;
use crate::document::{Document, DocumentId};
use crate::expression::QueryExpression;
use crate::handlers::QueryResult;
use crate::selector::{Selectable, Selector};
use crate::storage::{Command, DbType, DbValue};

use super::errors::{SchemaError, SchemaResult};
use super::where_fragment::WhereFragment;

/// Alias of the document table in every generated query
pub const DOCUMENT_ALIAS: &str = "d";

/// A JSON field duplicated into its own typed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatedField {
    /// Dot separated JSON path
    pub field: String,
    /// Column name
    pub column: String,
    /// Column type
    pub db_type: DbType,
}

/// Storage mapping for one document type
#[derive(Debug, Clone)]
pub struct DocumentMapping {
    doc_type: TypeId,
    type_name: &'static str,
    alias: String,
    schema_name: String,
    table_name: String,
    id_type: DbType,
    duplicated: Vec<DuplicatedField>,
}

impl DocumentMapping {
    /// Derives the mapping for `D` under the configured schema and prefix
    pub fn for_document<D: Document>(options: &StoreOptions) -> Self {
        let alias = D::alias();
        Self {
            doc_type: TypeId::of::<D>(),
            type_name: std::any::type_name::<D>(),
            table_name: format!("{}{}", options.table_prefix, alias),
            schema_name: options.database_schema_name.clone(),
            alias,
            id_type: D::ID_TYPE,
            duplicated: Vec::new(),
        }
    }

    /// Duplicates a JSON field into a typed column used by filters and ordering
    pub fn duplicate_field(&mut self, field: &str, db_type: DbType) -> SchemaResult<&mut Self> {
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(SchemaError::invalid_field(field, "empty path segment"));
        }
        if db_type == DbType::Jsonb {
            return Err(SchemaError::invalid_field(field, "jsonb fields cannot be duplicated"));
        }
        if self.duplicated.iter().any(|d| d.field == field) {
            return Err(SchemaError::invalid_field(field, "already duplicated"));
        }

        let column = field.replace('.', "_").to_lowercase();
        if matches!(column.as_str(), "id" | "data" | "mt_last_modified") {
            return Err(SchemaError::invalid_field(field, "collides with a reserved column"));
        }

        self.duplicated.push(DuplicatedField {
            field: field.to_string(),
            column,
            db_type,
        });
        Ok(self)
    }

    pub fn doc_type(&self) -> TypeId {
        self.doc_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns `schema.table`
    pub fn qualified_table_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    pub fn id_type(&self) -> DbType {
        self.id_type
    }

    pub fn duplicated_fields(&self) -> &[DuplicatedField] {
        &self.duplicated
    }

    /// Columns read by a whole-document selector, in read order
    pub fn select_fields(&self) -> Vec<String> {
        vec![
            format!("{}.data", DOCUMENT_ALIAS),
            format!("{}.id", DOCUMENT_ALIAS),
        ]
    }

    /// Locates a field for comparison or ordering, cast to `db_type`
    pub fn field_locator(&self, field: &str, db_type: DbType) -> String {
        self.field_locator_for(DOCUMENT_ALIAS, field, db_type)
    }

    /// Same as `field_locator` but against another table alias
    pub fn field_locator_for(&self, table_alias: &str, field: &str, db_type: DbType) -> String {
        if let Some(dup) = self.duplicated.iter().find(|d| d.field == field) {
            return format!("{}.{}", table_alias, dup.column);
        }

        if db_type == DbType::Jsonb {
            return json_path(table_alias, field, "->");
        }

        let raw = json_path(table_alias, field, "->>");
        if db_type.needs_cast() {
            format!("CAST({} as {})", raw, db_type.pg_name())
        } else {
            raw
        }
    }

    /// Renders the expression's filter against this mapping, if it has one
    pub fn build_where_fragment(&self, query: &QueryExpression, command: &mut Command) -> Option<String> {
        query
            .filter
            .as_ref()
            .map(|filter| WhereFragment::new(self, filter).to_sql(command))
    }

    /// Builds the row decoder for element type `T`
    pub fn build_selector<T: Selectable>(&self, query: &QueryExpression) -> QueryResult<Box<dyn Selector<T>>> {
        T::build_selector(self, query)
    }

    /// Point lookup of the payload by identifier
    pub fn loader_command(&self, id: &DocumentId) -> Command {
        let mut command = Command::new();
        let placeholder = command.add_parameter(id.to_db_value(), self.id_type);
        command.append_query(&format!(
            "select data from {} as {} where id = {}",
            self.qualified_table_name(),
            DOCUMENT_ALIAS,
            placeholder
        ));
        command
    }

    /// Insert-or-replace of one document
    pub fn upsert_command(&self, id: &DocumentId, json: &str) -> SchemaResult<Command> {
        let mut command = Command::new();
        let id_param = command.add_parameter(id.to_db_value(), self.id_type);
        let data_param = command.add_parameter(json, DbType::Jsonb);

        let mut columns = vec!["id".to_string(), "data".to_string(), "mt_last_modified".to_string()];
        let mut values = vec![id_param, data_param, "transaction_timestamp()".to_string()];
        let mut updates = vec![
            "data = excluded.data".to_string(),
            "mt_last_modified = excluded.mt_last_modified".to_string(),
        ];

        if !self.duplicated.is_empty() {
            let document: Value = serde_json::from_str(json)
                .map_err(|e| SchemaError::invalid_field("data", e.to_string()))?;

            for dup in &self.duplicated {
                let value = lookup_path(&document, &dup.field)
                    .map(|v| json_to_db_value(v, dup.db_type, &dup.field))
                    .transpose()?
                    .unwrap_or(DbValue::Null);
                values.push(command.add_parameter(value, dup.db_type));
                updates.push(format!("{0} = excluded.{0}", dup.column));
                columns.push(dup.column.clone());
            }
        }

        command.append_query(&format!(
            "insert into {} ({}) values ({}) on conflict (id) do update set {}",
            self.qualified_table_name(),
            columns.join(", "),
            values.join(", "),
            updates.join(", ")
        ));
        Ok(command)
    }

    /// `create table` statement for this mapping
    pub fn table_ddl(&self) -> String {
        let mut columns = vec![
            format!("id {} not null primary key", self.id_type.pg_name()),
            "data jsonb not null".to_string(),
            "mt_last_modified timestamp with time zone default transaction_timestamp()".to_string(),
        ];
        for dup in &self.duplicated {
            columns.push(format!("{} {}", dup.column, dup.db_type.pg_name()));
        }

        format!(
            "create table if not exists {} ({})",
            self.qualified_table_name(),
            columns.join(", ")
        )
    }
}

/// `d.data -> 'a' ->> 'b'` for `a.b` with `last_op = "->>"`
fn json_path(table_alias: &str, field: &str, last_op: &str) -> String {
    let segments: Vec<&str> = field.split('.').collect();
    let mut path = format!("{}.data", table_alias);
    for (i, segment) in segments.iter().enumerate() {
        let op = if i + 1 == segments.len() { last_op } else { "->" };
        path.push_str(&format!(" {} '{}'", op, segment.replace('\'', "''")));
    }
    path
}

fn lookup_path<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(document, |value, segment| value.get(segment))
        .filter(|v| !v.is_null())
}

fn json_to_db_value(value: &Value, db_type: DbType, field: &str) -> SchemaResult<DbValue> {
    let mismatch = || SchemaError::invalid_field(field, format!("value {} is not {}", value, db_type));

    let converted = match db_type {
        DbType::Text => match value {
            Value::String(s) => DbValue::Text(s.clone()),
            other => DbValue::Text(other.to_string()),
        },
        DbType::Integer | DbType::BigInt => DbValue::Int(value.as_i64().ok_or_else(mismatch)?),
        DbType::Double => DbValue::Float(value.as_f64().ok_or_else(mismatch)?),
        DbType::Boolean => DbValue::Bool(value.as_bool().ok_or_else(mismatch)?),
        DbType::Uuid => {
            let text = value.as_str().ok_or_else(mismatch)?;
            DbValue::Uuid(Uuid::parse_str(text).map_err(|_| mismatch())?)
        }
        DbType::Timestamp => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|_| mismatch())?;
            DbValue::Timestamp(parsed.into())
        }
        DbType::Jsonb => DbValue::Json(value.clone()),
    };
    Ok(converted)
}
