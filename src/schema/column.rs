//! Column metadata and typed column handles

use crate::value::{ColumnType, ColumnValue, Value};
use std::fmt;
use std::marker::PhantomData;

/// Reference from a foreign key column to the column it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Parent table name
    pub table: String,
    /// Parent column name (usually `id`)
    pub column: String,
}

/// Metadata for one column of a table.
///
/// Columns are declared with a small builder chain and receive their
/// position when the owning table is registered.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    index: usize,
    column_type: ColumnType,
    nullable: bool,
    unique: bool,
    editable: bool,
    secondary_key: bool,
    default: Option<Value>,
    foreign_key: Option<ForeignKey>,
}

impl Column {
    /// Create a nullable, non-unique, editable column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            index: 0,
            column_type,
            nullable: true,
            unique: false,
            editable: true,
            secondary_key: false,
            default: None,
            foreign_key: None,
        }
    }

    /// Create a foreign key column referencing `table.column`
    pub fn foreign_key(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        let mut col = Self::new(name, ColumnType::Id);
        col.foreign_key = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        col.secondary_key = true;
        col
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column unique. A unique non-id column is the table's natural key.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    /// Mark the column as used for lookups (indexed)
    pub fn secondary_key(mut self) -> Self {
        self.secondary_key = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the column in its table
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_secondary_key(&self) -> bool {
        self.secondary_key
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn references(&self) -> Option<&ForeignKey> {
        self.foreign_key.as_ref()
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }

    /// Column definition fragment for CREATE TABLE
    pub fn sql_definition(&self) -> String {
        let mut def = format!("{} {}", self.name, self.column_type.sql_type());
        if self.index == 0 {
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
            return def;
        }
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        match &self.default {
            Some(Value::Text(s)) => def.push_str(&format!(" DEFAULT '{}'", s.replace('\'', "''"))),
            Some(Value::Boolean(b)) => def.push_str(&format!(" DEFAULT {}", *b as i64)),
            Some(Value::Null) | None => {}
            Some(other) => def.push_str(&format!(" DEFAULT {}", other)),
        }
        if let Some(fk) = &self.foreign_key {
            def.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
        }
        def
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.column_type)
    }
}

/// Compile-time typed handle to a column of a known table.
///
/// Ties the Rust type of a column to the value read out of a row:
/// `row.get_as(food::NAME)` yields an `Option<String>`.
pub struct Col<T> {
    index: usize,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ColumnValue> Col<T> {
    pub const fn new(index: usize, name: &'static str) -> Self {
        Self {
            index,
            name,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Col<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Col<T> {}

impl<T> fmt::Debug for Col<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Col({}@{})", self.name, self.index)
    }
}
