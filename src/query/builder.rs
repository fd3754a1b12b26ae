//! SQL query builder with transparent IN-list splitting
//!
//! A [`QueryBuilder`] accumulates predicates and clauses for one table and
//! runs in one of four shapes: single column, two columns, many columns or
//! whole rows, and delete. When an IN predicate binds more values than the
//! executor's limit, the query runs once per partition and the results are
//! merged so callers see the same rows a single query would return.

use crate::row::RowData;
use crate::schema::Table;
use crate::storage::Executor;
use crate::value::{ColumnType, Value};
use crate::{Error, Result};
use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone)]
enum Predicate {
    In { column: String, values: Vec<Value> },
    Like { columns: Vec<String>, patterns: Vec<String> },
    Null(String),
    NotNull(String),
}

impl Predicate {
    fn columns(&self) -> Vec<&str> {
        match self {
            Predicate::In { column, .. } | Predicate::Null(column) | Predicate::NotNull(column) => {
                vec![column.as_str()]
            }
            Predicate::Like { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }

    fn render(&self, sql: &mut Vec<String>, params: &mut Vec<Value>) {
        match self {
            Predicate::In { column, values } => match values.len() {
                0 => sql.push("1 = 0".to_string()),
                1 => {
                    sql.push(format!("{} = ?", column));
                    params.push(values[0].clone());
                }
                n => {
                    sql.push(format!("{} IN ({})", column, vec!["?"; n].join(", ")));
                    params.extend(values.iter().cloned());
                }
            },
            Predicate::Like { columns, patterns } => {
                let terms: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
                    .collect();
                sql.push(format!("({})", terms.join(" OR ")));
                params.extend(patterns.iter().map(|p| Value::Text(p.clone())));
            }
            Predicate::Null(column) => sql.push(format!("{} IS NULL", column)),
            Predicate::NotNull(column) => sql.push(format!("{} IS NOT NULL", column)),
        }
    }
}

/// Accumulates a query against one table
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: &'static Table,
    predicates: Vec<Predicate>,
    distinct: bool,
    group_by: Option<String>,
    order_by: Option<String>,
    suffix: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl QueryBuilder {
    pub fn new(table: &'static Table) -> Self {
        Self {
            table,
            predicates: Vec::new(),
            distinct: false,
            group_by: None,
            order_by: None,
            suffix: None,
            limit: None,
            offset: None,
        }
    }

    pub fn table(&self) -> &'static Table {
        self.table
    }

    /// Require `column` to be one of `values`. Duplicate values are bound once.
    pub fn filter_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut seen = HashSet::new();
        let values = values
            .into_iter()
            .map(Into::into)
            .filter(|v: &Value| seen.insert(v.clone()))
            .collect();
        self.predicates.push(Predicate::In {
            column: column.to_string(),
            values,
        });
        self
    }

    pub fn filter_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter_in(column, [value.into()])
    }

    /// Match any of `columns[i] LIKE patterns[i]`. Patterns use `\` as escape.
    pub fn filter_like<S: AsRef<str>>(mut self, columns: &[&str], patterns: &[S]) -> Self {
        self.predicates.push(Predicate::Like {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        });
        self
    }

    pub fn filter_null(mut self, column: &str) -> Self {
        self.predicates.push(Predicate::Null(column.to_string()));
        self
    }

    pub fn filter_not_null(mut self, column: &str) -> Self {
        self.predicates.push(Predicate::NotNull(column.to_string()));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn group_by(mut self, fragment: &str) -> Self {
        self.group_by = Some(fragment.to_string());
        self
    }

    pub fn order_by(mut self, fragment: &str) -> Self {
        self.order_by = Some(fragment.to_string());
        self
    }

    /// Free-form SQL appended after the ordering clause
    pub fn suffix(mut self, fragment: &str) -> Self {
        self.suffix = Some(fragment.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Values of one column for every matching row
    pub fn select_column(&self, db: &impl Executor, column: &str) -> Result<Vec<Value>> {
        let col = self.table.require_column(column)?;
        let ty = col.column_type();
        self.run(db, &[column], true, move |row| ty.read(row, 0))
    }

    /// Pairs of two columns for every matching row
    pub fn select_two_columns(
        &self,
        db: &impl Executor,
        first: &str,
        second: &str,
    ) -> Result<Vec<(Value, Value)>> {
        let a = self.table.require_column(first)?.column_type();
        let b = self.table.require_column(second)?.column_type();
        self.run(db, &[first, second], true, move |row| Ok((a.read(row, 0)?, b.read(row, 1)?)))
    }

    /// Selected columns, in the order given, for every matching row.
    /// An empty column list selects every column.
    pub fn select_columns(&self, db: &impl Executor, columns: &[&str]) -> Result<Vec<Vec<Value>>> {
        let all: Vec<&str>;
        let columns = if columns.is_empty() {
            all = self.table.columns().iter().map(|c| c.name()).collect();
            &all[..]
        } else {
            columns
        };
        let types = columns
            .iter()
            .map(|c| self.table.require_column(c).map(|c| c.column_type()))
            .collect::<Result<Vec<_>>>()?;
        self.run(db, columns, true, move |row| read_all(&types, row))
    }

    /// Raw SQL expressions such as `COUNT(*)`, read as the given types.
    /// Expressions are not checked against the schema, and a query that
    /// selects them is never split.
    pub fn select_expressions(&self, db: &impl Executor, exprs: &[(&str, ColumnType)]) -> Result<Vec<Vec<Value>>> {
        let (columns, types): (Vec<&str>, Vec<ColumnType>) = exprs.iter().copied().unzip();
        self.run(db, &columns, false, move |row| read_all(&types, row))
    }

    /// Whole rows, unfrozen
    pub fn select_rows(&self, db: &impl Executor) -> Result<Vec<RowData>> {
        let table = self.table;
        let columns: Vec<&str> = table.columns().iter().map(|c| c.name()).collect();
        self.run(db, &columns, true, move |row| RowData::from_sql_row(table, row))
    }

    /// Delete matching rows, returning how many were removed
    pub fn delete(&self, db: &impl Executor) -> Result<usize> {
        if self.distinct
            || self.group_by.is_some()
            || self.order_by.is_some()
            || self.limit.is_some()
            || self.offset.is_some()
        {
            return Err(Error::Query(format!(
                "delete from {} cannot carry DISTINCT, GROUP BY, ORDER BY, LIMIT or OFFSET",
                self.table.name()
            )));
        }
        self.validate_columns(&[])?;
        let parts = self.partitions(db.in_clause_limit());
        if parts.len() > 1 {
            if self.suffix.is_some() {
                return Err(Error::Query(format!(
                    "delete from {} with a suffix cannot be split",
                    self.table.name()
                )));
            }
            tracing::debug!(table = self.table.name(), partitions = parts.len(), "splitting delete");
        }
        let mut removed = 0;
        for part in &parts {
            let (sql, params) = part.delete_sql();
            removed += db.execute(&sql, &params)?;
        }
        Ok(removed)
    }

    /// Render the statement as one query, without splitting
    pub fn select_sql(&self, columns: &[&str]) -> Result<(String, Vec<Value>)> {
        self.validate_columns(columns)?;
        Ok(self.render_select(columns, true))
    }

    /// Selected items are checked by the caller. `mergeable` is false when
    /// they include expressions whose value depends on the whole result.
    fn run<T, F>(&self, db: &impl Executor, columns: &[&str], mergeable: bool, mut map: F) -> Result<Vec<T>>
    where
        T: Clone + Eq + Hash,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.validate_columns(&[])?;
        let parts = self.partitions(db.in_clause_limit());
        if parts.len() == 1 {
            let (sql, params) = self.render_select(columns, true);
            return db.select(&sql, &params, map);
        }
        if !mergeable || self.group_by.is_some() || self.order_by.is_some() || self.suffix.is_some() {
            return Err(Error::Query(format!(
                "query on {} needs splitting but its clauses apply to the whole result",
                self.table.name()
            )));
        }
        tracing::debug!(table = self.table.name(), partitions = parts.len(), "splitting IN clause");

        let mut merged = Vec::new();
        for part in &parts {
            let (sql, params) = part.render_select(columns, false);
            merged.extend(db.select(&sql, &params, &mut map)?);
        }
        if self.distinct {
            let mut seen = HashSet::new();
            merged.retain(|item| seen.insert(item.clone()));
        }
        let skipped = merged.into_iter().skip(self.offset.unwrap_or(0));
        Ok(match self.limit {
            Some(limit) => skipped.take(limit).collect(),
            None => skipped.collect(),
        })
    }

    /// Split on the first oversized IN list, recursively, until every
    /// IN list fits within `limit`
    fn partitions(&self, limit: usize) -> Vec<QueryBuilder> {
        let limit = limit.max(1);
        let oversized = self.predicates.iter().position(|p| {
            matches!(p, Predicate::In { values, .. } if values.len() > limit)
        });
        let Some(pos) = oversized else {
            return vec![self.clone()];
        };
        let Predicate::In { column, values } = &self.predicates[pos] else {
            return vec![self.clone()];
        };
        values
            .chunks(limit)
            .flat_map(|chunk| {
                let mut part = self.clone();
                part.predicates[pos] = Predicate::In {
                    column: column.clone(),
                    values: chunk.to_vec(),
                };
                part.partitions(limit)
            })
            .collect()
    }

    fn validate_columns(&self, selected: &[&str]) -> Result<()> {
        for column in selected
            .iter()
            .copied()
            .chain(self.predicates.iter().flat_map(Predicate::columns))
        {
            self.table.require_column(column)?;
        }
        for p in &self.predicates {
            if let Predicate::Like { columns, patterns } = p {
                if columns.len() != patterns.len() {
                    return Err(Error::Query(format!(
                        "{} LIKE columns paired with {} patterns",
                        columns.len(),
                        patterns.len()
                    )));
                }
            }
        }
        Ok(())
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<Value>) {
        if self.predicates.is_empty() {
            return;
        }
        let mut terms = Vec::new();
        for p in &self.predicates {
            p.render(&mut terms, params);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&terms.join(" AND "));
    }

    fn render_select(&self, columns: &[&str], with_window: bool) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            self.table.name()
        );
        self.render_where(&mut sql, &mut params);
        if let Some(group_by) = &self.group_by {
            sql.push_str(&format!(" GROUP BY {}", group_by));
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }
        if let Some(suffix) = &self.suffix {
            sql.push(' ');
            sql.push_str(suffix);
        }
        if with_window {
            match (self.limit, self.offset) {
                (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
                (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
                (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                (None, None) => {}
            }
        }
        (sql, params)
    }

    fn delete_sql(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table.name());
        self.render_where(&mut sql, &mut params);
        if let Some(suffix) = &self.suffix {
            sql.push(' ');
            sql.push_str(suffix);
        }
        (sql, params)
    }
}

fn read_all(types: &[ColumnType], row: &rusqlite::Row<'_>) -> rusqlite::Result<Vec<Value>> {
    types.iter().enumerate().map(|(i, ty)| ty.read(row, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{food, serving};
    use crate::storage::Database;

    fn seeded(limit: usize, count: i64) -> Database {
        let db = Database::open_in_memory().unwrap().with_in_clause_limit(limit);
        for i in 0..count {
            let mut row = RowData::new(food::table());
            row.set(food::INDEX_NAME, format!("food-{}", i)).unwrap();
            row.set(food::NAME, format!("Food {}", i % 3)).unwrap();
            if i % 2 == 0 {
                row.set(food::BRAND, "Acme".to_string()).unwrap();
            }
            db.insert(&row).unwrap();
        }
        db
    }

    fn sorted(mut values: Vec<Value>) -> Vec<i64> {
        values.sort_by_key(|v| v.as_i64());
        values.iter().filter_map(Value::as_i64).collect()
    }

    #[test]
    fn test_render_select() {
        let (sql, params) = QueryBuilder::new(food::table())
            .filter_in("id", [1i64, 2, 2, 3])
            .filter_eq("brand", "Acme")
            .filter_like(&["name", "notes"], &["oat%", "%oat%"])
            .filter_not_null("variety")
            .order_by("name")
            .limit(5)
            .select_sql(&["id"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT id FROM food WHERE id IN (?, ?, ?) AND brand = ? AND \
             (name LIKE ? ESCAPE '\\' OR notes LIKE ? ESCAPE '\\') AND variety IS NOT NULL \
             ORDER BY name LIMIT 5"
        );
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let q = QueryBuilder::new(food::table()).filter_eq("colour", "red");
        assert!(matches!(q.select_sql(&["id"]), Err(Error::Schema(_))));

        let q = QueryBuilder::new(food::table()).filter_like(&["name", "brand"], &["x"]);
        assert!(matches!(q.select_sql(&["id"]), Err(Error::Query(_))));
    }

    #[test]
    fn test_split_matches_single_query() {
        let ids: Vec<i64> = (1..=25).chain(40..=45).collect();
        let single = seeded(1000, 50);
        let split = seeded(4, 50);

        let q = QueryBuilder::new(food::table()).filter_in("id", ids.clone());
        let a = sorted(q.select_column(&single, "id").unwrap());
        let b = sorted(q.select_column(&split, "id").unwrap());
        assert_eq!(a, b);
        assert_eq!(a, ids);

        let rows_a = q.select_rows(&single).unwrap().len();
        let rows_b = q.select_rows(&split).unwrap().len();
        assert_eq!(rows_a, rows_b);
    }

    #[test]
    fn test_split_reapplies_distinct_and_limit() {
        let single = seeded(1000, 30);
        let split = seeded(2, 30);
        let q = QueryBuilder::new(food::table())
            .filter_in("id", 1..=30i64)
            .distinct();

        let mut a = q.select_column(&single, "name").unwrap();
        let mut b = q.select_column(&split, "name").unwrap();
        a.sort_by(|x, y| x.as_str().cmp(&y.as_str()));
        b.sort_by(|x, y| x.as_str().cmp(&y.as_str()));
        assert_eq!(a, b);
        assert_eq!(b.len(), 3);

        let limited = q.clone().limit(2);
        assert_eq!(limited.select_column(&split, "name").unwrap().len(), 2);
        assert_eq!(limited.select_column(&single, "name").unwrap().len(), 2);
    }

    #[test]
    fn test_split_with_two_oversized_lists() {
        let single = seeded(1000, 20);
        let split = seeded(3, 20);
        let q = QueryBuilder::new(food::table())
            .filter_in("id", 1..=20i64)
            .filter_in("name", ["Food 0", "Food 1", "Food 2", "Food 9"]);
        let pairs_a = q.select_two_columns(&single, "id", "name").unwrap().len();
        let pairs_b = q.select_two_columns(&split, "id", "name").unwrap().len();
        assert_eq!(pairs_a, 20);
        assert_eq!(pairs_a, pairs_b);
    }

    #[test]
    fn test_split_rejects_ordered_query() {
        let split = seeded(2, 10);
        let q = QueryBuilder::new(food::table())
            .filter_in("id", 1..=10i64)
            .order_by("name");
        assert!(matches!(q.select_column(&split, "id"), Err(Error::Query(_))));
        assert!(q.select_column(&seeded(200, 10), "id").is_ok());
    }

    #[test]
    fn test_group_by_with_aggregate() {
        let db = seeded(200, 6);
        let q = QueryBuilder::new(food::table()).group_by("name").order_by("name");
        let counts = q
            .select_expressions(&db, &[("name", ColumnType::Text), ("COUNT(*)", ColumnType::Integer)])
            .unwrap();
        assert_eq!(
            counts,
            (0..3)
                .map(|i| vec![Value::Text(format!("Food {}", i)), Value::Integer(2)])
                .collect::<Vec<_>>()
        );

        let total = QueryBuilder::new(food::table())
            .filter_not_null("brand")
            .select_expressions(&db, &[("COUNT(*)", ColumnType::Integer)])
            .unwrap();
        assert_eq!(total, vec![vec![Value::Integer(3)]]);
    }

    #[test]
    fn test_aggregate_is_never_split() {
        let split = seeded(2, 10);
        let q = QueryBuilder::new(food::table()).filter_in("id", 1..=10i64);
        let err = q.select_expressions(&split, &[("COUNT(*)", ColumnType::Integer)]);
        assert!(matches!(err, Err(Error::Query(_))));

        let whole = q.select_expressions(&seeded(200, 10), &[("COUNT(*)", ColumnType::Integer)]);
        assert_eq!(whole.unwrap(), vec![vec![Value::Integer(10)]]);
    }

    #[test]
    fn test_offset_without_limit() {
        let db = seeded(200, 10);
        let q = QueryBuilder::new(food::table()).order_by("id").offset(7);
        let (sql, _) = q.select_sql(&["id"]).unwrap();
        assert!(sql.ends_with("ORDER BY id LIMIT -1 OFFSET 7"));
        assert_eq!(sorted(q.select_column(&db, "id").unwrap()), vec![8, 9, 10]);
    }

    #[test]
    fn test_offset_applies_after_merge() {
        let single = seeded(1000, 10);
        let split = seeded(3, 10);
        let q = QueryBuilder::new(food::table()).filter_in("id", 1..=10i64).offset(4);
        assert_eq!(q.select_column(&split, "id").unwrap().len(), 6);
        assert_eq!(q.select_column(&single, "id").unwrap().len(), 6);

        let window = q.clone().limit(3);
        assert_eq!(window.select_column(&split, "id").unwrap().len(), 3);
        assert_eq!(window.select_column(&single, "id").unwrap().len(), 3);
    }

    #[test]
    fn test_suffix_fragment() {
        let db = seeded(200, 7);
        let busy = QueryBuilder::new(food::table())
            .group_by("name")
            .suffix("HAVING COUNT(*) > 2")
            .select_column(&db, "name")
            .unwrap();
        assert_eq!(busy, vec![Value::Text("Food 0".to_string())]);

        let q = QueryBuilder::new(food::table())
            .filter_in("id", 1..=7i64)
            .suffix("LIMIT 1");
        assert_eq!(q.select_column(&db, "id").unwrap().len(), 1);
        assert!(matches!(q.select_column(&seeded(2, 7), "id"), Err(Error::Query(_))));
    }

    #[test]
    fn test_null_filters_and_columns() {
        let db = seeded(200, 6);
        let branded = QueryBuilder::new(food::table())
            .filter_not_null("brand")
            .select_columns(&db, &["index_name", "brand"])
            .unwrap();
        assert_eq!(branded.len(), 3);
        assert_eq!(branded[0][1], Value::Text("Acme".to_string()));

        let plain = QueryBuilder::new(food::table())
            .filter_null("brand")
            .select_columns(&db, &[])
            .unwrap();
        assert_eq!(plain.len(), 3);
        assert_eq!(plain[0].len(), food::table().columns().len());
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let db = seeded(200, 3);
        let none: Vec<i64> = Vec::new();
        let rows = QueryBuilder::new(food::table())
            .filter_in("id", none)
            .select_rows(&db)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_split_delete() {
        let db = seeded(2, 10);
        let removed = QueryBuilder::new(food::table())
            .filter_in("id", 1..=7i64)
            .delete(&db)
            .unwrap();
        assert_eq!(removed, 7);
        assert_eq!(db.count(food::table()).unwrap(), 3);

        let bad = QueryBuilder::new(serving::table()).limit(1).delete(&db);
        assert!(matches!(bad, Err(Error::Query(_))));

        let suffixed = QueryBuilder::new(food::table())
            .filter_in("id", 8..=10i64)
            .suffix("AND brand IS NULL");
        assert!(matches!(suffixed.delete(&db), Err(Error::Query(_))));
        assert_eq!(db.count(food::table()).unwrap(), 3);
    }
}
