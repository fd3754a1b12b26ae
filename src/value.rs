//! Column values and declared column types
//!
//! Every cell in a [`RowData`](crate::row::RowData) is a [`Value`]. Each column
//! declares a [`ColumnType`], which decides which values it accepts and how raw
//! text (from editors or import files) is cast into it.

use crate::{Error, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Surrogate id or a foreign key to one
    Id,
    Integer,
    Real,
    Text,
    Boolean,
    /// Milliseconds since the Unix epoch
    Timestamp,
}

impl ColumnType {
    /// Get the string representation of the column type
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Id => "id",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }

    /// SQLite storage class used in DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Id | ColumnType::Integer | ColumnType::Boolean | ColumnType::Timestamp => {
                "INTEGER"
            }
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Coerce a value into this type.
    ///
    /// Integers widen to reals and 0/1 integers narrow to booleans, since that is
    /// how SQLite and JSON hand them back. Anything else must already match.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Id | ColumnType::Integer | ColumnType::Timestamp, v @ Value::Integer(_)) => {
                Ok(v)
            }
            (ColumnType::Real, v @ Value::Real(_)) => Ok(v),
            (ColumnType::Real, Value::Integer(i)) => Ok(Value::Real(i as f64)),
            (ColumnType::Text, v @ Value::Text(_)) => Ok(v),
            (ColumnType::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (ColumnType::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
            (ColumnType::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
            (ty, v) => Err(Error::Type(format!("{} is not a valid {} value", v, ty))),
        }
    }

    /// Cast raw text into a value of this type. Blank input is null.
    pub fn parse(&self, raw: &str) -> Result<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        match self {
            ColumnType::Id | ColumnType::Integer | ColumnType::Timestamp => raw
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| Error::Type(format!("'{}' is not a whole number", raw))),
            ColumnType::Real => match raw.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Real(f)),
                _ => Err(Error::Type(format!("'{}' is not a number", raw))),
            },
            ColumnType::Text => Ok(Value::Text(raw.to_string())),
            ColumnType::Boolean => match raw.to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Value::Boolean(true)),
                "false" | "no" | "n" | "0" => Ok(Value::Boolean(false)),
                _ => Err(Error::Type(format!("'{}' is not a boolean", raw))),
            },
        }
    }

    /// Read column `idx` of a result row as this type
    pub fn read(&self, row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Value> {
        let value: Value = row.get(idx)?;
        self.coerce(value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "id" => Ok(ColumnType::Id),
            "integer" | "int" => Ok(ColumnType::Integer),
            "real" | "float" | "double" => Ok(ColumnType::Real),
            "text" | "string" => Ok(ColumnType::Text),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "timestamp" => Ok(ColumnType::Timestamp),
            _ => Err(Error::Type(format!("Unknown column type: {}", s))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single column value.
///
/// Reals compare and hash by bit pattern so values can key maps and sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Real(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Integer(i)),
            ValueRef::Real(f) => Ok(Value::Real(f)),
            ValueRef::Text(t) => std::str::from_utf8(t)
                .map(|s| Value::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Rust types that can be stored in a column, used by typed column handles
pub trait ColumnValue: Sized + Into<Value> {
    fn from_value(value: &Value) -> Option<Self>;
}

impl ColumnValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl ColumnValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl ColumnValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ColumnValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_type() {
        assert_eq!(ColumnType::Integer.parse("42").unwrap(), Value::Integer(42));
        assert_eq!(ColumnType::Real.parse(" 2.5 ").unwrap(), Value::Real(2.5));
        assert_eq!(ColumnType::Boolean.parse("Yes").unwrap(), Value::Boolean(true));
        assert_eq!(ColumnType::Text.parse("oats").unwrap(), Value::from("oats"));
        assert_eq!(ColumnType::Real.parse("").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(ColumnType::Integer.parse("4.5"), Err(Error::Type(_))));
        assert!(matches!(ColumnType::Real.parse("abc"), Err(Error::Type(_))));
        assert!(matches!(ColumnType::Real.parse("NaN"), Err(Error::Type(_))));
        assert!(matches!(ColumnType::Boolean.parse("maybe"), Err(Error::Type(_))));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(ColumnType::Real.coerce(Value::Integer(3)).unwrap(), Value::Real(3.0));
        assert_eq!(ColumnType::Boolean.coerce(Value::Integer(1)).unwrap(), Value::Boolean(true));
        assert!(ColumnType::Integer.coerce(Value::from("3")).is_err());
        assert!(ColumnType::Text.coerce(Value::Null).unwrap().is_null());
    }

    #[test]
    fn test_column_type_roundtrip() {
        for ty in [
            ColumnType::Id,
            ColumnType::Integer,
            ColumnType::Real,
            ColumnType::Text,
            ColumnType::Boolean,
            ColumnType::Timestamp,
        ] {
            let parsed: ColumnType = ty.as_str().parse().unwrap();
            assert_eq!(ty, parsed);
        }
    }

    #[test]
    fn test_real_values_usable_as_keys() {
        let mut set = std::collections::HashSet::new();
        set.insert(Value::Real(1.5));
        set.insert(Value::Real(1.5));
        set.insert(Value::Integer(1));
        assert_eq!(set.len(), 2);
    }
}
