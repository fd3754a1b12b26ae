//! Row Container - typed column values for one entity instance
//!
//! A [`RowData`] starts mutable, is filled by a builder or reader, and is
//! frozen when an entity is constructed from it. It is the only place raw
//! values live; entities read through it.

use crate::schema::{Col, Column, Table};
use crate::value::{ColumnValue, Value};
use crate::{Error, Result};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Sentinel id for rows that have not been persisted yet
pub const NO_ID: i64 = -1;

/// Column values for a single row of one table
#[derive(Debug, Clone)]
pub struct RowData {
    table: &'static Table,
    values: Vec<Value>,
    frozen: bool,
}

impl RowData {
    /// Create a row populated with column defaults
    pub fn new(table: &'static Table) -> Self {
        let values = table
            .columns()
            .iter()
            .map(|c| c.default().cloned().unwrap_or(Value::Null))
            .collect();
        Self {
            table,
            values,
            frozen: false,
        }
    }

    /// Create a row with every column null, ignoring defaults
    pub fn empty(table: &'static Table) -> Self {
        Self {
            table,
            values: vec![Value::Null; table.columns().len()],
            frozen: false,
        }
    }

    pub fn table(&self) -> &'static Table {
        self.table
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.table.column(column).map(|c| &self.values[c.index()])
    }

    pub fn value(&self, column: &Column) -> &Value {
        &self.values[column.index()]
    }

    /// Typed read through a column handle
    pub fn get_as<T: ColumnValue>(&self, col: Col<T>) -> Option<T> {
        debug_assert_eq!(
            self.table.columns()[col.index()].name(),
            col.name(),
            "column handle does not belong to table {}",
            self.table.name()
        );
        T::from_value(&self.values[col.index()])
    }

    /// Set a column by name, casting the value to the column's declared type
    pub fn put(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        if self.frozen {
            return Err(Error::Integrity(format!(
                "cannot set {}.{} on a frozen row",
                self.table.name(),
                column
            )));
        }
        let col = self.table.require_column(column)?;
        let value = col.column_type().coerce(value.into()).map_err(|e| match e {
            Error::Type(msg) => Error::Type(format!("{}.{}: {}", self.table.name(), column, msg)),
            other => other,
        })?;
        self.values[col.index()] = value;
        Ok(())
    }

    /// Typed write through a column handle
    pub fn set<T: ColumnValue>(&mut self, col: Col<T>, value: T) -> Result<()> {
        self.put(col.name(), value)
    }

    /// Typed write of an optional value; `None` stores null
    pub fn set_opt<T: ColumnValue>(&mut self, col: Col<T>, value: Option<T>) -> Result<()> {
        self.put(col.name(), Value::from(value))
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Mutable copy keeping id and timestamps
    pub fn copy_full(&self) -> Self {
        Self {
            table: self.table,
            values: self.values.clone(),
            frozen: false,
        }
    }

    /// Mutable copy with id set to [`NO_ID`] and timestamps cleared,
    /// for deriving a new entity from an existing one
    pub fn copy_stripped(&self) -> Self {
        let mut values = self.values.clone();
        values[0] = Value::Integer(NO_ID);
        values[1] = Value::Null;
        values[2] = Value::Null;
        Self {
            table: self.table,
            values,
            frozen: false,
        }
    }

    /// The row's id, if it has a real one
    pub fn id(&self) -> Option<i64> {
        match self.values[0] {
            Value::Integer(id) if id != NO_ID => Some(id),
            _ => None,
        }
    }

    pub fn has_id(&self) -> bool {
        self.id().is_some()
    }

    pub fn create_time(&self) -> Option<i64> {
        self.values[1].as_i64()
    }

    pub fn modify_time(&self) -> Option<i64> {
        self.values[2].as_i64()
    }

    /// Columns paired with their values, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&Column, &Value)> {
        self.table.columns().iter().zip(self.values.iter())
    }

    /// Non-nullable columns (other than the reserved three) that hold null
    pub fn missing_required(&self) -> Vec<&Column> {
        self.iter()
            .skip(3)
            .filter(|(c, v)| !c.is_nullable() && v.is_null())
            .map(|(c, _)| c)
            .collect()
    }

    /// Read a full row from a `SELECT *`-ordered result row
    pub fn from_sql_row(table: &'static Table, row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let values = table
            .columns()
            .iter()
            .map(|c| c.column_type().read(row, c.index()))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Self {
            table,
            values,
            frozen: false,
        })
    }

    /// Column→value map of the non-null columns, leaving out `skip`
    pub fn to_json_map(&self, skip: &[&str]) -> Result<Map<String, JsonValue>> {
        let mut map = Map::new();
        for (col, value) in self.iter() {
            if value.is_null() || skip.contains(&col.name()) {
                continue;
            }
            map.insert(col.name().to_string(), serde_json::to_value(value)?);
        }
        Ok(map)
    }

    /// Build a row from a column→value map, casting each value to its column's type.
    /// Unknown keys are rejected so typos in input files surface.
    pub fn from_json_map(table: &'static Table, map: &Map<String, JsonValue>) -> Result<Self> {
        let mut row = Self::new(table);
        for (key, json) in map {
            let value: Value = serde_json::from_value(json.clone())
                .map_err(|_| Error::Type(format!("{}.{}: unsupported value {}", table.name(), key, json)))?;
            row.put(key, value)?;
        }
        Ok(row)
    }
}

impl PartialEq for RowData {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.values == other.values
    }
}

impl Eq for RowData {}

impl Hash for RowData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.name().hash(state);
        self.values.hash(state);
    }
}

impl fmt::Display for RowData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.table.name())?;
        let mut first = true;
        for (col, value) in self.iter().filter(|(_, v)| !v.is_null()) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", col.name(), value)?;
            first = false;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{food, serving};

    fn sample_food() -> RowData {
        let mut row = RowData::new(food::table());
        row.set(food::INDEX_NAME, "oats".to_string()).unwrap();
        row.set(food::NAME, "Rolled Oats".to_string()).unwrap();
        row
    }

    #[test]
    fn test_new_applies_defaults() {
        let row = RowData::new(serving::table());
        assert_eq!(row.get_as(serving::UNIT), Some("g".to_string()));
        assert_eq!(row.get_as(serving::IS_DEFAULT), Some(false));
        assert!(row.get("id").unwrap().is_null());
        assert!(!row.has_id());
    }

    #[test]
    fn test_put_casts_and_validates_types() {
        let mut row = RowData::new(serving::table());
        row.put("quantity", 30i64).unwrap();
        assert_eq!(row.get("quantity"), Some(&Value::Real(30.0)));

        assert!(matches!(row.put("quantity", "thirty"), Err(Error::Type(_))));
        assert!(matches!(row.put("weight", 1.0), Err(Error::Schema(_))));
    }

    #[test]
    fn test_frozen_row_rejects_writes() {
        let mut row = sample_food();
        row.freeze();
        assert!(matches!(row.put("name", "Oats"), Err(Error::Integrity(_))));

        let mut copy = row.copy_full();
        assert!(!copy.is_frozen());
        copy.put("name", "Oats").unwrap();
    }

    #[test]
    fn test_copies() {
        let mut row = sample_food();
        row.put("id", 7i64).unwrap();
        row.put("create_time", 1_000i64).unwrap();
        row.put("modify_time", 2_000i64).unwrap();

        let full = row.copy_full();
        assert_eq!(full, row);
        assert_eq!(full.id(), Some(7));

        let stripped = row.copy_stripped();
        assert_ne!(stripped, row);
        assert_eq!(stripped.get("id"), Some(&Value::Integer(NO_ID)));
        assert_eq!(stripped.id(), None);
        assert_eq!(stripped.create_time(), None);
        assert_eq!(stripped.get_as(food::NAME), Some("Rolled Oats".to_string()));
    }

    #[test]
    fn test_missing_required() {
        let row = RowData::new(food::table());
        let missing: Vec<&str> = row.missing_required().iter().map(|c| c.name()).collect();
        assert_eq!(missing, vec!["index_name", "name"]);
        assert!(sample_food().missing_required().is_empty());
    }

    #[test]
    fn test_json_map() {
        let row = sample_food();
        let map = row.to_json_map(&["id"]).unwrap();
        assert_eq!(map["index_name"], "oats");
        assert!(!map.contains_key("brand"));

        let back = RowData::from_json_map(food::table(), &map).unwrap();
        assert_eq!(back, row);

        let mut bad = map.clone();
        bad.insert("colour".into(), "beige".into());
        assert!(RowData::from_json_map(food::table(), &bad).is_err());
    }
}
