//! Foreign key resolution
//!
//! Objects built from imports reference their parents by natural key
//! because the parents' ids are not known yet. Once the parents are stored,
//! [`complete_foreign_keys`] looks the keys up in batch and rebuilds each
//! object with real ids in its foreign key columns.

use crate::entity::{Entity, Record};
use crate::query::QueryBuilder;
use crate::row::RowData;
use crate::schema::{self, Column, Table};
use crate::storage::Executor;
use crate::value::Value;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Resolve pending references for `fk_columns`, in the order given.
///
/// Parents referenced through column N must already be stored before it is
/// resolved; columns are never reordered. Any missing key or malformed
/// pending state aborts the whole batch.
pub fn complete_foreign_keys<E: Entity>(
    db: &impl Executor,
    objects: Vec<E>,
    fk_columns: &[&str],
) -> Result<Vec<E>> {
    let count = objects.len();
    let result = resolve_all(db, objects, fk_columns);
    match &result {
        Ok(_) => tracing::debug!(
            table = E::table().name(),
            objects = count,
            columns = ?fk_columns,
            "foreign keys resolved"
        ),
        Err(e) => tracing::warn!(table = E::table().name(), objects = count, "batch rejected: {}", e),
    }
    result
}

fn resolve_all<E: Entity>(db: &impl Executor, mut objects: Vec<E>, fk_columns: &[&str]) -> Result<Vec<E>> {
    if objects.is_empty() {
        return Ok(objects);
    }
    let table = E::table();
    for column in fk_columns {
        objects = resolve_column(db, table, objects, column)?;
    }
    for obj in &objects {
        check_foreign_keys(table, obj.data())?;
    }
    Ok(objects)
}

fn resolve_column<E: Entity>(
    db: &impl Executor,
    table: &'static Table,
    objects: Vec<E>,
    column: &str,
) -> Result<Vec<E>> {
    let fk_col = table.require_column(column)?;
    let parent = parent_table(table, fk_col)?;

    let mut keys = Vec::with_capacity(objects.len());
    let mut key_column: Option<&'static Column> = None;
    for obj in &objects {
        let record = obj.record();
        if !record.source().is_pending() {
            return Err(Error::Integrity(format!(
                "{} object from {} cannot have pending references",
                table.name(),
                record.source()
            )));
        }
        let pending = record.pending_fk(column).ok_or_else(|| {
            Error::Integrity(format!("{} object has no pending key for {}", table.name(), column))
        })?;
        let (col, value) = natural_key_of(pending)?;
        match key_column {
            None => key_column = Some(col),
            Some(existing) if existing.name() != col.name() => {
                return Err(Error::Integrity(format!(
                    "pending keys for {}.{} disagree on the natural key column: {} and {}",
                    table.name(),
                    column,
                    existing.name(),
                    col.name()
                )));
            }
            Some(_) => {}
        }
        keys.push(value);
    }
    let Some(key_column) = key_column else {
        return Ok(objects);
    };

    let ids: HashMap<Value, i64> = QueryBuilder::new(parent)
        .filter_in(key_column.name(), keys.iter().cloned())
        .select_two_columns(db, key_column.name(), "id")?
        .into_iter()
        .filter_map(|(key, id)| id.as_i64().map(|id| (key, id)))
        .collect();

    objects
        .into_iter()
        .zip(keys)
        .map(|(obj, key)| {
            let id = *ids
                .get(&key)
                .ok_or_else(|| Error::Integrity(format!("no parent found for key {}", key)))?;
            with_resolved(obj, column, id)
        })
        .collect()
}

/// Rebuild `obj` with `column` set to `id`, carrying other pending keys forward
fn with_resolved<E: Entity>(obj: E, column: &str, id: i64) -> Result<E> {
    let record = obj.into_record();
    let source = record.source();
    let mut pending: BTreeMap<String, RowData> = record.pending_fks().clone();
    pending.remove(column);
    let mut data = record.data().copy_full();
    data.put(column, id)?;
    E::from_record(Record::new(data, source)?.with_pending_fks(pending))
}

/// The single non-null column of a pending parent row. It must be the id or
/// a unique column, so a key names at most one parent.
fn natural_key_of(pending: &RowData) -> Result<(&'static Column, Value)> {
    let table = pending.table();
    let mut set = pending.iter().filter(|(_, v)| !v.is_null());
    match (set.next(), set.next()) {
        (Some((col, value)), None) => {
            let col = table.require_column(col.name())?;
            if !col.is_unique() && col.index() != table.id_column().index() {
                return Err(Error::Integrity(format!(
                    "{}.{} is not a unique key and cannot identify a parent",
                    table.name(),
                    col.name()
                )));
            }
            Ok((col, value.clone()))
        }
        _ => Err(Error::Integrity(format!(
            "pending {} key must set exactly one column: {}",
            table.name(),
            pending
        ))),
    }
}

fn parent_table(table: &Table, fk_col: &Column) -> Result<&'static Table> {
    let fk = fk_col.references().ok_or_else(|| {
        Error::Schema(format!("{}.{} is not a foreign key", table.name(), fk_col.name()))
    })?;
    schema::table(&fk.table).ok_or_else(|| Error::Schema(format!("unknown parent table {}", fk.table)))
}

/// Every non-nullable foreign key must hold a real id
fn check_foreign_keys(table: &Table, data: &RowData) -> Result<()> {
    for col in table.fk_columns().filter(|c| !c.is_nullable()) {
        match data.value(col) {
            Value::Integer(id) if *id != crate::NO_ID => {}
            other => {
                return Err(Error::Integrity(format!(
                    "{}.{} does not hold a valid id: {}",
                    table.name(),
                    col.name(),
                    other
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Ingredient, ObjectSource, Serving};
    use crate::schema::{food, ingredient, serving};
    use crate::storage::Database;

    fn store_food(db: &Database, index_name: &str) -> i64 {
        let mut row = RowData::new(food::table());
        row.set(food::INDEX_NAME, index_name.to_string()).unwrap();
        row.set(food::NAME, index_name.to_string()).unwrap();
        db.insert(&row).unwrap()
    }

    fn pending_serving(food_key: &str) -> Serving {
        let mut row = RowData::new(serving::table());
        row.set(serving::FOOD_ID, crate::NO_ID).unwrap();
        row.set(serving::NAME, "cup".to_string()).unwrap();
        row.set(serving::QUANTITY, 100.0).unwrap();
        Serving::construct(row, ObjectSource::Import)
            .unwrap()
            .with_pending_fk("food_id", food_key)
            .unwrap()
    }

    #[test]
    fn test_resolves_natural_keys() {
        let db = Database::open_in_memory().unwrap();
        let a = store_food(&db, "a");
        let b = store_food(&db, "b");
        assert_eq!((a, b), (1, 2));

        let resolved = complete_foreign_keys(
            &db,
            vec![pending_serving("a"), pending_serving("b"), pending_serving("a")],
            &["food_id"],
        )
        .unwrap();
        let ids: Vec<i64> = resolved.iter().map(Serving::food_id).collect();
        assert_eq!(ids, vec![1, 2, 1]);
        assert!(resolved.iter().all(|s| s.record().pending_fks().is_empty()));
        assert_eq!(resolved[0].source(), ObjectSource::Import);
    }

    fn serving_pending_on(parent: RowData) -> Serving {
        let mut record = pending_serving("unused").into_record();
        record.add_pending_fk_row("food_id", parent).unwrap();
        Serving::from_record(record).unwrap()
    }

    #[test]
    fn test_non_unique_parent_column_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for index_name in ["oats-rolled", "oats-steel-cut"] {
            let mut row = RowData::new(food::table());
            row.set(food::INDEX_NAME, index_name.to_string()).unwrap();
            row.set(food::NAME, "Oats".to_string()).unwrap();
            ids.push(db.insert(&row).unwrap());
        }

        let mut by_name = RowData::empty(food::table());
        by_name.set(food::NAME, "Oats".to_string()).unwrap();
        let err = complete_foreign_keys(&db, vec![serving_pending_on(by_name)], &["food_id"]).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        assert!(err.to_string().contains("food.name is not a unique key"));

        let mut by_id = RowData::empty(food::table());
        by_id.set(food::ID, ids[1]).unwrap();
        let resolved = complete_foreign_keys(&db, vec![serving_pending_on(by_id)], &["food_id"]).unwrap();
        assert_eq!(resolved[0].food_id(), ids[1]);
    }

    #[test]
    fn test_missing_parent_fails_batch() {
        let db = Database::open_in_memory().unwrap();
        store_food(&db, "a");
        store_food(&db, "b");
        let err = complete_foreign_keys(&db, vec![pending_serving("a"), pending_serving("c")], &["food_id"])
            .unwrap_err();
        assert!(err.to_string().contains(r#"no parent found for key "c""#));
    }

    #[test]
    fn test_missing_pending_entry_fails() {
        let db = Database::open_in_memory().unwrap();
        store_food(&db, "a");
        let mut row = RowData::new(serving::table());
        row.set(serving::FOOD_ID, crate::NO_ID).unwrap();
        row.set(serving::NAME, "cup".to_string()).unwrap();
        row.set(serving::QUANTITY, 100.0).unwrap();
        let bare = Serving::construct(row, ObjectSource::Import).unwrap();
        assert!(matches!(
            complete_foreign_keys(&db, vec![bare], &["food_id"]),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn test_unresolved_required_key_fails() {
        let db = Database::open_in_memory().unwrap();
        store_food(&db, "stew");
        store_food(&db, "carrot");

        let mut row = RowData::new(ingredient::table());
        row.set(ingredient::COMPOSITE_FOOD_ID, crate::NO_ID).unwrap();
        row.set(ingredient::FOOD_ID, crate::NO_ID).unwrap();
        row.set(ingredient::QUANTITY, 50.0).unwrap();
        let ing = Ingredient::construct(row, ObjectSource::Import)
            .unwrap()
            .with_pending_fk("composite_food_id", "stew")
            .unwrap()
            .with_pending_fk("food_id", "carrot")
            .unwrap();

        assert!(matches!(
            complete_foreign_keys(&db, vec![ing.clone()], &["composite_food_id"]),
            Err(Error::Integrity(_))
        ));

        let done = complete_foreign_keys(&db, vec![ing], &["composite_food_id", "food_id"]).unwrap();
        assert_eq!(done[0].composite_food_id(), 1);
        assert_eq!(done[0].food_id(), 2);
    }
}
