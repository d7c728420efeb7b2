//! Commands, typed parameters and rows
//!
//! A command is statement text plus ordered typed parameters. Placeholders
//! are positional (`$1`, `$2`, ...) and are handed out by `add_parameter` in
//! the order parameters are appended.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::errors::{StorageError, StorageResult};

/// Column and parameter types understood by the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Text,
    Integer,
    BigInt,
    Double,
    Boolean,
    Uuid,
    Timestamp,
    Jsonb,
}

impl DbType {
    /// Returns the type name used in casts and DDL
    pub fn pg_name(&self) -> &'static str {
        match self {
            DbType::Text => "varchar",
            DbType::Integer => "integer",
            DbType::BigInt => "bigint",
            DbType::Double => "double precision",
            DbType::Boolean => "boolean",
            DbType::Uuid => "uuid",
            DbType::Timestamp => "timestamp with time zone",
            DbType::Jsonb => "jsonb",
        }
    }

    /// Text values are read from JSON with `->>` and need no cast
    pub fn needs_cast(&self) -> bool {
        !matches!(self, DbType::Text | DbType::Jsonb)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pg_name())
    }
}

/// A single parameter or column value
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl DbValue {
    /// Returns the natural parameter type for this value
    pub fn db_type(&self) -> DbType {
        match self {
            DbValue::Null | DbValue::Text(_) => DbType::Text,
            DbValue::Bool(_) => DbType::Boolean,
            DbValue::Int(_) => DbType::BigInt,
            DbValue::Float(_) => DbType::Double,
            DbValue::Json(_) => DbType::Jsonb,
            DbValue::Uuid(_) => DbType::Uuid,
            DbValue::Timestamp(_) => DbType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Int(v) => Some(*v),
            DbValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            DbValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(v) => Some(*v),
            DbValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Converts the value into its JSON representation.
    ///
    /// Timestamps become RFC 3339 strings and uuids their hyphenated form, which
    /// is what their serde implementations read back.
    pub fn into_json(self) -> Value {
        match self {
            DbValue::Null => Value::Null,
            DbValue::Bool(v) => Value::Bool(v),
            DbValue::Int(v) => Value::from(v),
            DbValue::Float(v) => Value::from(v),
            DbValue::Text(v) => Value::String(v),
            DbValue::Json(v) => v,
            DbValue::Uuid(v) => Value::String(v.to_string()),
            DbValue::Timestamp(v) => Value::String(v.to_rfc3339()),
        }
    }

    /// Reads a JSON payload column, accepting both text and json encodings
    pub fn into_json_payload(self, index: usize) -> StorageResult<Option<Value>> {
        match self {
            DbValue::Null => Ok(None),
            DbValue::Json(v) => Ok(Some(v)),
            DbValue::Text(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StorageError::decode(index, e.to_string())),
            other => Err(StorageError::decode(
                index,
                format!("expected a json payload, found {:?}", other.db_type()),
            )),
        }
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int(i64::from(v))
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<u32> for DbValue {
    fn from(v: u32) -> Self {
        DbValue::Int(i64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Float(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<Uuid> for DbValue {
    fn from(v: Uuid) -> Self {
        DbValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for DbValue {
    fn from(v: DateTime<Utc>) -> Self {
        DbValue::Timestamp(v)
    }
}

impl From<Value> for DbValue {
    fn from(v: Value) -> Self {
        DbValue::Json(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// One positional parameter of a command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandParameter {
    /// Bound value
    pub value: DbValue,
    /// Declared parameter type
    pub db_type: DbType,
    /// Compiled-query template member feeding this slot, if any
    pub member: Option<&'static str>,
    /// Operand of a like pattern; live text values must be wildcard-escaped
    pub like_operand: bool,
}

/// Statement text plus ordered typed parameters.
///
/// Commands carry no connection or transaction; callers hand them to a
/// `Connection` or `Transaction` at execution time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    sql: String,
    parameters: Vec<CommandParameter>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a command with the given statement and no parameters
    pub fn with_sql(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    /// Returns the statement text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the parameters in placeholder order
    pub fn parameters(&self) -> &[CommandParameter] {
        &self.parameters
    }

    /// Returns the bound parameter values in placeholder order
    pub fn parameter_values(&self) -> Vec<&DbValue> {
        self.parameters.iter().map(|p| &p.value).collect()
    }

    /// Appends statement text
    pub fn append_query(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Adds a parameter and returns its placeholder
    pub fn add_parameter(&mut self, value: impl Into<DbValue>, db_type: DbType) -> String {
        self.push_parameter(CommandParameter {
            value: value.into(),
            db_type,
            member: None,
            like_operand: false,
        })
    }

    /// Adds a parameter slot fed by a compiled-query template member.
    ///
    /// The slot starts out null; a parameter setter writes the live value.
    pub fn add_member_parameter(&mut self, member: &'static str, db_type: DbType) -> String {
        self.push_parameter(CommandParameter {
            value: DbValue::Null,
            db_type,
            member: Some(member),
            like_operand: false,
        })
    }

    /// Same as `add_member_parameter` for the operand of a like pattern
    pub fn add_like_member_parameter(&mut self, member: &'static str) -> String {
        self.push_parameter(CommandParameter {
            value: DbValue::Null,
            db_type: DbType::Text,
            member: Some(member),
            like_operand: true,
        })
    }

    /// Overwrites the value bound at `slot`
    pub fn set_parameter_value(&mut self, slot: usize, value: DbValue) -> StorageResult<()> {
        let len = self.parameters.len();
        let parameter = self.parameters.get_mut(slot).ok_or_else(|| {
            StorageError::command(
                self.sql.clone(),
                format!("parameter slot {} out of range ({} parameters)", slot, len),
            )
        })?;
        parameter.value = value;
        Ok(())
    }

    fn push_parameter(&mut self, parameter: CommandParameter) -> String {
        self.parameters.push(parameter);
        format!("${}", self.parameters.len())
    }
}

/// One row read from a cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<DbValue>,
}

impl Row {
    pub fn new(values: Vec<DbValue>) -> Self {
        Self { values }
    }

    /// Returns the column at `index`
    pub fn get(&self, index: usize) -> StorageResult<&DbValue> {
        self.values
            .get(index)
            .ok_or_else(|| StorageError::decode(index, format!("row has {} columns", self.values.len())))
    }

    /// Takes the column at `index`, leaving null behind
    pub fn take(&mut self, index: usize) -> StorageResult<DbValue> {
        let len = self.values.len();
        self.values
            .get_mut(index)
            .map(std::mem::take)
            .ok_or_else(|| StorageError::decode(index, format!("row has {} columns", len)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for DbValue {
    fn default() -> Self {
        DbValue::Null
    }
}

impl From<Vec<DbValue>> for Row {
    fn from(values: Vec<DbValue>) -> Self {
        Self::new(values)
    }
}
