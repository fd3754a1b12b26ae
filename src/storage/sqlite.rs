//! SQLite storage implementation

use std::path::Path;
use rusqlite::{params_from_iter, Connection};
use crate::{Result, Error};
use crate::entity::now_millis;
use crate::row::RowData;
use crate::schema::{self, Table};
use crate::value::Value;
use super::schema as ddl;

/// Default number of values bound in a single IN predicate before a query is split
pub const DEFAULT_IN_CLAUSE_LIMIT: usize = 200;

/// Anything that can run statements: the database itself or an open transaction
pub trait Executor {
    fn connection(&self) -> &Connection;

    /// Largest IN list bound in one statement
    fn in_clause_limit(&self) -> usize;

    /// Run a parameterized select, mapping every result row
    fn select<T, F>(&self, sql: &str, params: &[Value], mut map: F) -> Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        tracing::trace!(sql, params = params.len(), "select");
        let mut stmt = self.connection().prepare_cached(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| map(row))?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Run a parameterized insert/update/delete, returning the number of rows changed
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        tracing::trace!(sql, params = params.len(), "execute");
        let changed = self
            .connection()
            .prepare_cached(sql)?
            .execute(params_from_iter(params.iter()))?;
        Ok(changed)
    }

    /// Run one or more unparameterized statements (administrative use)
    fn execute_raw(&self, sql: &str) -> Result<()> {
        self.connection().execute_batch(sql)?;
        Ok(())
    }

    /// Insert a row, stamping its timestamps. Returns the new id.
    ///
    /// The id column is written only when the row carries a real id
    /// (restored or inbuilt data).
    fn insert(&self, row: &RowData) -> Result<i64> {
        let table = row.table();
        let now = Value::Integer(now_millis());
        let mut names = Vec::new();
        let mut params = Vec::new();
        for (col, value) in row.iter() {
            let value = match col.index() {
                0 if !row.has_id() => continue,
                1 | 2 if value.is_null() => now.clone(),
                _ => value.clone(),
            };
            names.push(col.name());
            params.push(value);
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            names.join(", "),
            placeholders.join(", ")
        );
        self.execute(&sql, &params)?;
        Ok(self.connection().last_insert_rowid())
    }

    /// Update every column of a stored row and bump its modify time
    fn update(&self, row: &RowData) -> Result<()> {
        let table = row.table();
        let id = row.id().ok_or_else(|| {
            Error::Integrity(format!("cannot update {} row without an id", table.name()))
        })?;
        let mut sets = Vec::new();
        let mut params = Vec::new();
        for (col, value) in row.iter().skip(1) {
            let value = if col.index() == 2 {
                Value::Integer(now_millis())
            } else {
                value.clone()
            };
            params.push(value);
            sets.push(format!("{} = ?{}", col.name(), params.len()));
        }
        params.push(Value::Integer(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table.name(),
            sets.join(", "),
            params.len()
        );
        if self.execute(&sql, &params)? == 0 {
            return Err(Error::Integrity(format!("{} has no row with id {}", table.name(), id)));
        }
        Ok(())
    }

    /// Delete one row by id. Returns whether a row was removed.
    fn delete_by_id(&self, table: &Table, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table.name());
        Ok(self.execute(&sql, &[Value::Integer(id)])? > 0)
    }

    /// Count all rows of a table
    fn count(&self, table: &Table) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = self.connection().query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// SQLite-backed database holding the nutrition schema
pub struct Database {
    conn: Connection,
    in_clause_limit: usize,
}

impl Database {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(ddl::CONNECTION_PRAGMAS)?;
        let db = Self {
            conn,
            in_clause_limit: DEFAULT_IN_CLAUSE_LIMIT,
        };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Override the IN-list split threshold
    pub fn with_in_clause_limit(mut self, limit: usize) -> Self {
        self.in_clause_limit = limit.max(1);
        self
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in ddl::all_schema_statements() {
            self.conn.execute(&stmt, [])?;
        }
        tracing::info!("schema initialized");
        Ok(())
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds; rolls back when it fails. A panic inside `f`
    /// drops the transaction, which also rolls back. Runs as a savepoint, so
    /// it nests inside a batch already opened on this connection.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let in_clause_limit = self.in_clause_limit;
        let mut session = Session {
            tx: self.conn.savepoint()?,
            in_clause_limit,
        };
        match f(&session) {
            Ok(value) => {
                session.tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = session.tx.rollback() {
                    tracing::warn!("rollback failed after {}: {}", e, rollback);
                }
                Err(e)
            }
        }
    }

    /// Delete all data, children first, in one transaction
    pub fn clear_all(&mut self) -> Result<()> {
        let statements: String = schema::all_tables()
            .iter()
            .rev()
            .map(|t| format!("DELETE FROM {};", t.name()))
            .collect();
        self.transaction(|tx| tx.execute_raw(&statements))?;
        tracing::info!("all data cleared");
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            foods: self.count(schema::food::table())?,
            servings: self.count(schema::serving::table())?,
            nutrients: self.count(schema::nutrient::table())?,
            nutrient_values: self.count(schema::nutrient_value::table())?,
            ingredients: self.count(schema::ingredient::table())?,
            meals: self.count(schema::meal::table())?,
            portions: self.count(schema::food_portion::table())?,
        })
    }
}

impl Executor for Database {
    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn in_clause_limit(&self) -> usize {
        self.in_clause_limit
    }
}

/// An open transaction. Statements run through it are committed together.
pub struct Session<'a> {
    tx: rusqlite::Savepoint<'a>,
    in_clause_limit: usize,
}

impl Executor for Session<'_> {
    fn connection(&self) -> &Connection {
        &self.tx
    }

    fn in_clause_limit(&self) -> usize {
        self.in_clause_limit
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub foods: usize,
    pub servings: usize,
    pub nutrients: usize,
    pub nutrient_values: usize,
    pub ingredients: usize,
    pub meals: usize,
    pub portions: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Foods: {}", self.foods)?;
        writeln!(f, "  Servings: {}", self.servings)?;
        writeln!(f, "  Nutrients: {}", self.nutrients)?;
        writeln!(f, "  Nutrient values: {}", self.nutrient_values)?;
        writeln!(f, "  Ingredients: {}", self.ingredients)?;
        writeln!(f, "  Meals: {}", self.meals)?;
        writeln!(f, "  Portions: {}", self.portions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::food;

    fn sample_food(index_name: &str) -> RowData {
        let mut row = RowData::new(food::table());
        row.set(food::INDEX_NAME, index_name.to_string()).unwrap();
        row.set(food::NAME, index_name.to_string()).unwrap();
        row
    }

    fn read_food(db: &Database, id: i64) -> RowData {
        db.select("SELECT * FROM food WHERE id = ?1", &[Value::Integer(id)], |row| {
            RowData::from_sql_row(food::table(), row)
        })
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_insert_stamps_timestamps() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert(&sample_food("oats")).unwrap();

        let stored = read_food(&db, id);
        assert_eq!(stored.id(), Some(id));
        assert!(stored.create_time().is_some());
        assert_eq!(stored.get_as(food::FOOD_TYPE), Some("primary".to_string()));
    }

    #[test]
    fn test_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert(&sample_food("oats")).unwrap();

        let mut edited = read_food(&db, id);
        edited.set(food::BRAND, "Acme".to_string()).unwrap();
        db.update(&edited).unwrap();
        assert_eq!(read_food(&db, id).get_as(food::BRAND), Some("Acme".to_string()));

        assert!(db.delete_by_id(food::table(), id).unwrap());
        assert!(!db.delete_by_id(food::table(), id).unwrap());
        assert!(matches!(db.update(&edited), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_unique_natural_key_enforced() {
        let db = Database::open_in_memory().unwrap();
        db.insert(&sample_food("oats")).unwrap();
        assert!(matches!(db.insert(&sample_food("oats")), Err(Error::Sql(_))));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            tx.insert(&sample_food("oats"))?;
            tx.insert(&sample_food("oats"))?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.count(food::table()).unwrap(), 0);

        db.transaction(|tx| {
            tx.insert(&sample_food("oats"))?;
            tx.insert(&sample_food("rice"))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.stats().unwrap().foods, 2);
    }

    #[test]
    fn test_transaction_nests_inside_open_batch() {
        let mut db = Database::open_in_memory().unwrap();
        db.execute_raw("SAVEPOINT batch").unwrap();
        db.transaction(|tx| tx.insert(&sample_food("oats"))).unwrap();
        assert_eq!(db.count(food::table()).unwrap(), 1);
        db.execute_raw("ROLLBACK TO batch; RELEASE batch").unwrap();
        assert_eq!(db.count(food::table()).unwrap(), 0);
    }

    #[test]
    fn test_clear_all_removes_children_first() {
        let mut db = Database::open_in_memory().unwrap();
        let id = db.insert(&sample_food("oats")).unwrap();
        let mut serving = RowData::new(schema::serving::table());
        serving.set(schema::serving::FOOD_ID, id).unwrap();
        serving.set(schema::serving::NAME, "cup".to_string()).unwrap();
        serving.set(schema::serving::QUANTITY, 80.0).unwrap();
        db.insert(&serving).unwrap();

        db.clear_all().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!((stats.foods, stats.servings), (0, 0));
    }

    #[test]
    fn test_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larder.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert(&sample_food("oats")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.count(food::table()).unwrap(), 1);
    }
}
