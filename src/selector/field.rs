//! Single-field projection selector and scalar element types

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::expression::QueryExpression;
use crate::handlers::{QueryError, QueryResult};
use crate::identity::IdentityBatch;
use crate::schema::DocumentMapping;
use crate::storage::{DbValue, Row};

use super::{Selectable, Selector};

/// Reads the projected field as the first column
pub struct FieldSelector<T> {
    field: String,
    locator: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Selectable> FieldSelector<T> {
    /// Fails unless the expression projects a field
    pub fn new(mapping: &DocumentMapping, query: &QueryExpression) -> QueryResult<Self> {
        let projection = query.projection.as_ref().ok_or_else(|| {
            QueryError::InvalidExpression(format!(
                "selecting {} requires a projected field",
                std::any::type_name::<T>()
            ))
        })?;

        Ok(Self {
            field: projection.field.clone(),
            locator: mapping.field_locator(&projection.field, projection.db_type),
            _marker: PhantomData,
        })
    }

    pub fn boxed(mapping: &DocumentMapping, query: &QueryExpression) -> QueryResult<Box<dyn Selector<T>>> {
        Ok(Box::new(Self::new(mapping, query)?))
    }
}

impl<T: Selectable> Selector<T> for FieldSelector<T> {
    fn select_fields(&self) -> Vec<String> {
        vec![self.locator.clone()]
    }

    fn resolve(&self, row: &mut Row, _batch: &mut IdentityBatch<'_>) -> QueryResult<T> {
        T::from_db_value(row.take(0)?)?.ok_or_else(|| {
            QueryError::decode(format!(
                "null value in projected field '{}'; select an Option to allow nulls",
                self.field
            ))
        })
    }
}

fn mismatch<T>(value: &DbValue) -> QueryError {
    QueryError::decode(format!(
        "cannot read {:?} as {}",
        value,
        std::any::type_name::<T>()
    ))
}

fn read_i64(value: &DbValue) -> Option<i64> {
    match value {
        DbValue::Json(json) => json.as_i64(),
        other => other.as_i64(),
    }
}

fn read_f64(value: &DbValue) -> Option<f64> {
    match value {
        DbValue::Float(v) => Some(*v),
        DbValue::Int(v) => Some(*v as f64),
        DbValue::Text(s) => s.parse().ok(),
        DbValue::Json(json) => json.as_f64(),
        _ => None,
    }
}

fn read_bool(value: &DbValue) -> Option<bool> {
    match value {
        DbValue::Text(s) => s.parse().ok(),
        DbValue::Json(json) => json.as_bool(),
        other => other.as_bool(),
    }
}

fn read_string(value: &DbValue) -> Option<String> {
    match value {
        DbValue::Text(s) => Some(s.clone()),
        DbValue::Json(Value::String(s)) => Some(s.clone()),
        other => Some(other.clone().into_json().to_string()),
    }
}

fn read_uuid(value: &DbValue) -> Option<Uuid> {
    match value {
        DbValue::Uuid(v) => Some(*v),
        DbValue::Text(s) | DbValue::Json(Value::String(s)) => Uuid::parse_str(s).ok(),
        _ => None,
    }
}

fn read_timestamp(value: &DbValue) -> Option<DateTime<Utc>> {
    match value {
        DbValue::Timestamp(v) => Some(*v),
        DbValue::Text(s) | DbValue::Json(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

fn read_json(value: &DbValue) -> Option<Value> {
    match value {
        DbValue::Text(s) => Some(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))),
        other => Some(other.clone().into_json()),
    }
}

macro_rules! field_selectable {
    ($($ty:ty => $read:expr),+ $(,)?) => {
        $(
            impl Selectable for $ty {
                fn build_selector(
                    mapping: &DocumentMapping,
                    query: &QueryExpression,
                ) -> QueryResult<Box<dyn Selector<Self>>> {
                    FieldSelector::<Self>::boxed(mapping, query)
                }

                fn from_db_value(value: DbValue) -> QueryResult<Option<Self>> {
                    if value.is_null() {
                        return Ok(None);
                    }
                    let read: fn(&DbValue) -> Option<$ty> = $read;
                    read(&value).map(Some).ok_or_else(|| mismatch::<$ty>(&value))
                }
            }
        )+
    };
}

field_selectable! {
    i64 => read_i64,
    i32 => |v| read_i64(v).and_then(|n| i32::try_from(n).ok()),
    f64 => read_f64,
    bool => read_bool,
    String => read_string,
    Uuid => read_uuid,
    DateTime<Utc> => read_timestamp,
    Value => read_json,
}

/// Nullable projections
impl<T: Selectable> Selectable for Option<T> {
    fn build_selector(
        mapping: &DocumentMapping,
        query: &QueryExpression,
    ) -> QueryResult<Box<dyn Selector<Self>>> {
        FieldSelector::<Self>::boxed(mapping, query)
    }

    fn from_db_value(value: DbValue) -> QueryResult<Option<Self>> {
        if value.is_null() {
            return Ok(Some(None));
        }
        Ok(Some(T::from_db_value(value)?))
    }
}
