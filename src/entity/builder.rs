//! Row builder for interactive editing
//!
//! Raw input is cast per column and problems are collected rather than
//! raised, so an editor can show them next to the offending field without
//! losing what the user typed.

use crate::row::RowData;
use crate::schema::Table;
use crate::value::Value;
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;

/// Validation problems keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.errors.get(column).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn set(&mut self, column: &str, message: impl Into<String>) {
        self.errors.insert(column.to_string(), message.into());
    }

    fn clear(&mut self, column: &str) {
        self.errors.remove(column);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(c, m)| format!("{}: {}", c, m)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Collects user input for one row
#[derive(Debug, Clone)]
pub struct RowBuilder {
    row: RowData,
    errors: ValidationErrors,
}

impl RowBuilder {
    /// Start a new row with column defaults
    pub fn new(table: &'static Table) -> Self {
        Self {
            row: RowData::new(table),
            errors: ValidationErrors::default(),
        }
    }

    /// Start from an existing row, keeping its id and timestamps
    pub fn editing(existing: &RowData) -> Self {
        Self {
            row: existing.copy_full(),
            errors: ValidationErrors::default(),
        }
    }

    /// Set a column from raw text input
    pub fn set_raw(&mut self, column: &str, raw: &str) -> &mut Self {
        let table = self.row.table();
        let Some(col) = table.column(column) else {
            self.errors.set(column, "unknown field");
            return self;
        };
        if !col.is_editable() {
            self.errors.set(column, "field cannot be edited");
            return self;
        }
        match col.column_type().parse(raw) {
            Ok(Value::Null) if !col.is_nullable() => {
                self.store(column, Value::Null);
                self.errors.set(column, "required");
            }
            Ok(value) => {
                self.store(column, value);
            }
            Err(Error::Type(msg)) => self.errors.set(column, msg),
            Err(e) => self.errors.set(column, e.to_string()),
        }
        self
    }

    /// Set a column from an already typed value
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.store(column, value.into());
        self
    }

    fn store(&mut self, column: &str, value: Value) {
        match self.row.put(column, value) {
            Ok(()) => self.errors.clear(column),
            Err(e) => self.errors.set(column, e.to_string()),
        }
    }

    /// The in-progress row, including any partially valid input
    pub fn row(&self) -> &RowData {
        &self.row
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Finish the row, or return every problem found so far plus any
    /// required fields still empty
    pub fn build(mut self) -> std::result::Result<RowData, ValidationErrors> {
        let missing: Vec<String> = self
            .row
            .missing_required()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        for name in missing {
            if self.errors.get(&name).is_none() {
                self.errors.set(&name, "required");
            }
        }
        if self.errors.is_empty() {
            Ok(self.row)
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{food, serving};

    #[test]
    fn test_collects_errors_per_column() {
        let mut builder = RowBuilder::new(serving::table());
        builder
            .set_raw("name", "  ")
            .set_raw("quantity", "lots")
            .set_raw("id", "4")
            .set_raw("colour", "red");

        let errors = builder.errors();
        assert_eq!(errors.get("name"), Some("required"));
        assert!(errors.get("quantity").is_some());
        assert_eq!(errors.get("id"), Some("field cannot be edited"));
        assert_eq!(errors.get("colour"), Some("unknown field"));

        let errors = builder.build().unwrap_err();
        assert_eq!(errors.get("food_id"), Some("required"));
    }

    #[test]
    fn test_correcting_input_clears_error() {
        let mut builder = RowBuilder::new(food::table());
        builder.set_raw("index_name", "oats").set_raw("name", "");
        assert!(builder.errors().get("name").is_some());

        builder.set_raw("name", "Oats");
        assert!(builder.errors().is_empty());

        let row = builder.build().unwrap();
        assert_eq!(row.get_as(food::NAME), Some("Oats".to_string()));
    }

    #[test]
    fn test_editing_keeps_id() {
        let mut row = RowData::new(food::table());
        row.put("id", 9i64).unwrap();
        row.put("index_name", "oats").unwrap();
        row.put("name", "Oats").unwrap();
        row.freeze();

        let mut builder = RowBuilder::editing(&row);
        builder.set_raw("brand", "Acme");
        let edited = builder.build().unwrap();
        assert_eq!(edited.id(), Some(9));
        assert_eq!(edited.get_as(food::BRAND), Some("Acme".to_string()));
    }
}
