//! Table metadata, validated at registration time

use super::column::Column;
use crate::value::ColumnType;
use crate::{Error, Result};
use std::collections::HashMap;

/// Reserved names of the first three columns of every table
pub const ID: &str = "id";
pub const CREATE_TIME: &str = "create_time";
pub const MODIFY_TIME: &str = "modify_time";

/// Immutable table metadata.
///
/// The first three columns are always `id`, `create_time` and `modify_time`.
/// At most one other column is unique; that column is the natural key.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    fk_columns: Vec<usize>,
    secondary_key_columns: Vec<usize>,
    natural_key: Option<usize>,
}

impl Table {
    /// The three reserved leading columns, ready to prepend to a column list
    pub fn standard_columns() -> Vec<Column> {
        vec![
            Column::new(ID, ColumnType::Id).read_only(),
            Column::new(CREATE_TIME, ColumnType::Timestamp).read_only(),
            Column::new(MODIFY_TIME, ColumnType::Timestamp).read_only(),
        ]
    }

    /// Register a table from its ordered column list
    pub fn register(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        let reserved = [
            (ID, ColumnType::Id),
            (CREATE_TIME, ColumnType::Timestamp),
            (MODIFY_TIME, ColumnType::Timestamp),
        ];
        for (i, (expected, ty)) in reserved.iter().enumerate() {
            match columns.get(i) {
                Some(col) if col.name() == *expected && col.column_type() == *ty => {}
                Some(col) => {
                    return Err(Error::Schema(format!(
                        "table {}: column {} must be {} ({}), found {}",
                        name, i, expected, ty, col
                    )));
                }
                None => {
                    return Err(Error::Schema(format!(
                        "table {}: missing reserved column {}",
                        name, expected
                    )));
                }
            }
        }

        let mut by_name = HashMap::new();
        let mut fk_columns = Vec::new();
        let mut secondary_key_columns = Vec::new();
        let mut natural_key: Option<usize> = None;
        let mut indexed = Vec::with_capacity(columns.len());

        for (i, col) in columns.into_iter().enumerate() {
            let col = col.with_index(i);
            if by_name.insert(col.name().to_string(), i).is_some() {
                return Err(Error::Schema(format!(
                    "table {}: duplicate column {}",
                    name,
                    col.name()
                )));
            }
            if col.is_foreign_key() {
                if col.column_type() != ColumnType::Id {
                    return Err(Error::Schema(format!(
                        "table {}: foreign key {} must have id type",
                        name,
                        col.name()
                    )));
                }
                fk_columns.push(i);
            }
            if col.is_secondary_key() {
                secondary_key_columns.push(i);
            }
            if i > 0 && col.is_unique() {
                if let Some(existing) = natural_key {
                    return Err(Error::Schema(format!(
                        "table {}: two natural keys declared ({} and {})",
                        name,
                        indexed_name(&indexed, existing),
                        col.name()
                    )));
                }
                natural_key = Some(i);
            }
            indexed.push(col);
        }

        Ok(Self {
            name,
            columns: indexed,
            by_name,
            fk_columns,
            secondary_key_columns,
            natural_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn id_column(&self) -> &Column {
        &self.columns[0]
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    /// Look up a column, failing with a schema error if it does not exist
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::Schema(format!("table {} has no column {}", self.name, name)))
    }

    pub fn fk_columns(&self) -> impl Iterator<Item = &Column> {
        self.fk_columns.iter().map(|&i| &self.columns[i])
    }

    pub fn secondary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.secondary_key_columns.iter().map(|&i| &self.columns[i])
    }

    pub fn natural_key_column(&self) -> Option<&Column> {
        self.natural_key.map(|i| &self.columns[i])
    }

    /// CREATE TABLE statement for this table
    pub fn create_sql(&self) -> String {
        let defs: Vec<String> = self.columns.iter().map(Column::sql_definition).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            defs.join(",\n    ")
        )
    }

    /// CREATE INDEX statements for the secondary key columns
    pub fn index_sql(&self) -> Vec<String> {
        self.secondary_key_columns()
            .map(|col| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                    self.name,
                    col.name(),
                    self.name,
                    col.name()
                )
            })
            .collect()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn indexed_name(columns: &[Column], index: usize) -> &str {
    columns.get(index).map(Column::name).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_standard(extra: Vec<Column>) -> Vec<Column> {
        let mut cols = Table::standard_columns();
        cols.extend(extra);
        cols
    }

    #[test]
    fn test_register_derives_key_sets() {
        let table = Table::register(
            "serving",
            with_standard(vec![
                Column::foreign_key("food_id", "food", "id").not_null(),
                Column::new("code", ColumnType::Text).unique(),
                Column::new("name", ColumnType::Text).secondary_key(),
            ]),
        )
        .unwrap();

        assert_eq!(table.id_column().name(), ID);
        assert_eq!(table.fk_columns().map(Column::name).collect::<Vec<_>>(), vec!["food_id"]);
        assert_eq!(
            table.secondary_key_columns().map(Column::name).collect::<Vec<_>>(),
            vec!["food_id", "name"]
        );
        assert_eq!(table.natural_key_column().unwrap().name(), "code");
        assert_eq!(table.column("name").unwrap().index(), 5);
    }

    #[test]
    fn test_register_rejects_misordered_reserved_columns() {
        let cols = vec![
            Column::new(CREATE_TIME, ColumnType::Timestamp),
            Column::new(ID, ColumnType::Id),
            Column::new(MODIFY_TIME, ColumnType::Timestamp),
        ];
        assert!(matches!(Table::register("bad", cols), Err(Error::Schema(_))));
        assert!(Table::register("empty", vec![]).is_err());
    }

    #[test]
    fn test_register_rejects_two_natural_keys() {
        let result = Table::register(
            "bad",
            with_standard(vec![
                Column::new("a", ColumnType::Text).unique(),
                Column::new("b", ColumnType::Text).unique(),
            ]),
        );
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("two natural keys")));
    }

    #[test]
    fn test_register_rejects_duplicate_column() {
        let result = Table::register(
            "bad",
            with_standard(vec![
                Column::new("a", ColumnType::Text),
                Column::new("a", ColumnType::Real),
            ]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_create_sql() {
        let table = Table::register(
            "nutrient",
            with_standard(vec![
                Column::new("name", ColumnType::Text).not_null().unique(),
                Column::new("unit", ColumnType::Text).not_null().default_value("g"),
            ]),
        )
        .unwrap();
        let sql = table.create_sql();
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("name TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("unit TEXT NOT NULL DEFAULT 'g'"));
    }
}
