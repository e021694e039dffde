//! Column values exchanged between entities and store adapters.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;

/// A single typed column value.
///
/// Optional columns keep their type when empty so adapters can bind a typed
/// `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uuid(Uuid),
    OptUuid(Option<Uuid>),
    Text(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    OptTimestamp(Option<DateTime<Utc>>),
}

/// Column name to value map for one row.
pub type Row = BTreeMap<&'static str, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::OptUuid(None) | Value::OptTimestamp(None))
    }

    /// Orders two values of the same kind. Mixed kinds and nulls do not compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.non_null(), other.non_null()) {
            (Some(Value::Uuid(a)), Some(Value::Uuid(b))) => Some(a.cmp(b)),
            (Some(Value::OptUuid(Some(a))), Some(Value::Uuid(b)))
            | (Some(Value::Uuid(a)), Some(Value::OptUuid(Some(b))))
            | (Some(Value::OptUuid(Some(a))), Some(Value::OptUuid(Some(b)))) => Some(a.cmp(b)),
            (Some(Value::Text(a)), Some(Value::Text(b))) => Some(a.cmp(b)),
            (Some(Value::Int(a)), Some(Value::Int(b))) => Some(a.cmp(b)),
            (Some(Value::Decimal(a)), Some(Value::Decimal(b))) => Some(a.cmp(b)),
            (Some(Value::Bool(a)), Some(Value::Bool(b))) => Some(a.cmp(b)),
            (Some(Value::Timestamp(a)), Some(Value::Timestamp(b))) => Some(a.cmp(b)),
            (Some(Value::OptTimestamp(Some(a))), Some(Value::Timestamp(b)))
            | (Some(Value::Timestamp(a)), Some(Value::OptTimestamp(Some(b))))
            | (Some(Value::OptTimestamp(Some(a))), Some(Value::OptTimestamp(Some(b)))) => {
                Some(a.cmp(b))
            }
            _ => None,
        }
    }

    fn non_null(&self) -> Option<&Value> {
        if self.is_null() { None } else { Some(self) }
    }

    /// `self + other` for numeric values.
    pub fn checked_add(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int),
            (Value::Decimal(a), Value::Decimal(b)) => a.checked_add(*b).map(Value::Decimal),
            _ => None,
        }
    }

    /// `self - other` for numeric values.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int),
            (Value::Decimal(a), Value::Decimal(b)) => a.checked_sub(*b).map(Value::Decimal),
            _ => None,
        }
    }

    /// Text form used for substring search.
    pub fn as_search_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<Option<Uuid>> for Value {
    fn from(v: Option<Uuid>) -> Self {
        Value::OptUuid(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        Value::OptTimestamp(v)
    }
}

fn field<'a>(row: &'a Row, column: &'static str) -> Result<&'a Value, AppError> {
    row.get(column).ok_or_else(|| {
        AppError::internal("Row is missing a column", json!({ "column": column }))
    })
}

fn mismatch(column: &'static str, expected: &'static str) -> AppError {
    AppError::internal(
        "Row column has an unexpected type",
        json!({ "column": column, "expected": expected }),
    )
}

/// Typed accessors used by entities to rebuild themselves from a [`Row`].
pub trait RowExt {
    fn uuid(&self, column: &'static str) -> Result<Uuid, AppError>;
    fn opt_uuid(&self, column: &'static str) -> Result<Option<Uuid>, AppError>;
    fn text(&self, column: &'static str) -> Result<String, AppError>;
    fn int(&self, column: &'static str) -> Result<i64, AppError>;
    fn decimal(&self, column: &'static str) -> Result<Decimal, AppError>;
    fn boolean(&self, column: &'static str) -> Result<bool, AppError>;
    fn timestamp(&self, column: &'static str) -> Result<DateTime<Utc>, AppError>;
    fn opt_timestamp(&self, column: &'static str) -> Result<Option<DateTime<Utc>>, AppError>;
}

impl RowExt for Row {
    fn uuid(&self, column: &'static str) -> Result<Uuid, AppError> {
        match field(self, column)? {
            Value::Uuid(v) | Value::OptUuid(Some(v)) => Ok(*v),
            _ => Err(mismatch(column, "uuid")),
        }
    }

    fn opt_uuid(&self, column: &'static str) -> Result<Option<Uuid>, AppError> {
        match field(self, column)? {
            Value::OptUuid(v) => Ok(*v),
            Value::Uuid(v) => Ok(Some(*v)),
            _ => Err(mismatch(column, "uuid")),
        }
    }

    fn text(&self, column: &'static str) -> Result<String, AppError> {
        match field(self, column)? {
            Value::Text(v) => Ok(v.clone()),
            _ => Err(mismatch(column, "text")),
        }
    }

    fn int(&self, column: &'static str) -> Result<i64, AppError> {
        match field(self, column)? {
            Value::Int(v) => Ok(*v),
            _ => Err(mismatch(column, "int")),
        }
    }

    fn decimal(&self, column: &'static str) -> Result<Decimal, AppError> {
        match field(self, column)? {
            Value::Decimal(v) => Ok(*v),
            _ => Err(mismatch(column, "decimal")),
        }
    }

    fn boolean(&self, column: &'static str) -> Result<bool, AppError> {
        match field(self, column)? {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch(column, "bool")),
        }
    }

    fn timestamp(&self, column: &'static str) -> Result<DateTime<Utc>, AppError> {
        match field(self, column)? {
            Value::Timestamp(v) | Value::OptTimestamp(Some(v)) => Ok(*v),
            _ => Err(mismatch(column, "timestamp")),
        }
    }

    fn opt_timestamp(&self, column: &'static str) -> Result<Option<DateTime<Utc>>, AppError> {
        match field(self, column)? {
            Value::OptTimestamp(v) => Ok(*v),
            Value::Timestamp(v) => Ok(Some(*v)),
            _ => Err(mismatch(column, "timestamp")),
        }
    }
}
