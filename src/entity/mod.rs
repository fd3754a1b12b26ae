//! Entity / Factory contract
//!
//! Every table has one entity type implementing [`Entity`]. Its associated
//! functions are the table's factory: [`Entity::construct`] freezes a row
//! and checks the id invariant for the object source, [`Entity::deconstruct`]
//! hands the row back for editing or export.

pub mod builder;
pub mod food;
pub mod meal;
pub mod nutrient;
pub mod serving;
pub mod source;

pub use builder::{RowBuilder, ValidationErrors};
pub use food::{Food, FoodKind, HasIngredients, HasNutrientData, Ingredient, NutrientData};
pub use meal::{FoodPortion, Meal};
pub use nutrient::{Nutrient, NutrientValue};
pub use serving::Serving;
pub use source::ObjectSource;

use crate::row::RowData;
use crate::schema::{self, Table};
use crate::value::Value;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// A frozen row plus its provenance and any pending foreign key references
#[derive(Debug, Clone)]
pub struct Record {
    data: RowData,
    source: ObjectSource,
    pending_fks: BTreeMap<String, RowData>,
}

impl Record {
    /// Freeze `data` into a record, checking the id invariant for `source`
    pub fn new(mut data: RowData, source: ObjectSource) -> Result<Self> {
        source.check_id(data.table().name(), data.id())?;
        data.freeze();
        Ok(Self {
            data,
            source,
            pending_fks: BTreeMap::new(),
        })
    }

    pub fn data(&self) -> &RowData {
        &self.data
    }

    pub fn source(&self) -> ObjectSource {
        self.source
    }

    pub fn id(&self) -> Option<i64> {
        self.data.id()
    }

    pub fn create_time(&self) -> Option<i64> {
        self.data.create_time()
    }

    pub fn modify_time(&self) -> Option<i64> {
        self.data.modify_time()
    }

    /// Pending references, keyed by foreign key column name
    pub fn pending_fks(&self) -> &BTreeMap<String, RowData> {
        &self.pending_fks
    }

    pub fn pending_fk(&self, column: &str) -> Option<&RowData> {
        self.pending_fks.get(column)
    }

    /// Declare that `column` references the parent row whose natural key is `key`
    pub fn add_pending_fk(&mut self, column: &str, key: impl Into<Value>) -> Result<()> {
        let parent = self.parent_table(column)?;
        let natural_key = parent.natural_key_column().ok_or_else(|| {
            Error::Schema(format!(
                "{} has no natural key to reference from {}.{}",
                parent.name(),
                self.data.table().name(),
                column
            ))
        })?;
        let mut parent_row = RowData::empty(parent);
        parent_row.put(natural_key.name(), key)?;
        self.add_pending_fk_row(column, parent_row)
    }

    /// Declare a pending reference with an explicit parent key row
    pub fn add_pending_fk_row(&mut self, column: &str, mut parent_row: RowData) -> Result<()> {
        if !self.source.is_pending() {
            return Err(Error::Integrity(format!(
                "{} object from {} cannot hold pending references",
                self.data.table().name(),
                self.source
            )));
        }
        let parent = self.parent_table(column)?;
        if parent_row.table() != parent {
            return Err(Error::Integrity(format!(
                "pending key for {}.{} must be a {} row",
                self.data.table().name(),
                column,
                parent.name()
            )));
        }
        parent_row.freeze();
        self.pending_fks.insert(column.to_string(), parent_row);
        Ok(())
    }

    fn parent_table(&self, column: &str) -> Result<&'static Table> {
        let table = self.data.table();
        let col = table.require_column(column)?;
        let fk = col.references().ok_or_else(|| {
            Error::Schema(format!("{}.{} is not a foreign key", table.name(), column))
        })?;
        schema::table(&fk.table)
            .ok_or_else(|| Error::Schema(format!("unknown parent table {}", fk.table)))
    }

    pub(crate) fn with_pending_fks(mut self, pending_fks: BTreeMap<String, RowData>) -> Self {
        self.pending_fks = pending_fks;
        self
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

/// Typed entity backed by a [`Record`]
pub trait Entity: Sized + Clone {
    /// The table this entity type is stored in
    fn table() -> &'static Table;

    /// Wrap an already validated record
    fn from_record(record: Record) -> Result<Self>;

    fn record(&self) -> &Record;

    fn into_record(self) -> Record;

    /// Factory: freeze `data` into an entity from `source`
    fn construct(data: RowData, source: ObjectSource) -> Result<Self> {
        if data.table() != Self::table() {
            return Err(Error::Integrity(format!(
                "cannot construct {} from a {} row",
                Self::table().name(),
                data.table().name()
            )));
        }
        Self::from_record(Record::new(data, source)?)
    }

    /// Mutable copy of the entity's row, ids and timestamps included
    fn deconstruct(&self) -> RowData {
        self.record().data().copy_full()
    }

    fn data(&self) -> &RowData {
        self.record().data()
    }

    fn id(&self) -> Option<i64> {
        self.record().id()
    }

    fn source(&self) -> ObjectSource {
        self.record().source()
    }

    /// Attach a pending natural-key reference for `column`
    fn with_pending_fk(self, column: &str, key: impl Into<Value>) -> Result<Self> {
        let mut record = self.into_record();
        record.add_pending_fk(column, key)?;
        Self::from_record(record)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{food, serving};

    fn food_row(index_name: &str) -> RowData {
        let mut row = RowData::new(food::table());
        row.set(food::INDEX_NAME, index_name.to_string()).unwrap();
        row.set(food::NAME, index_name.to_uppercase()).unwrap();
        row
    }

    #[test]
    fn test_user_new_with_id_fails() {
        let mut row = food_row("rice");
        row.put("id", 3i64).unwrap();
        assert!(matches!(Food::construct(row, ObjectSource::UserNew), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_database_without_id_fails() {
        let row = food_row("rice");
        assert!(matches!(Food::construct(row, ObjectSource::Database), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_construct_deconstruct_roundtrip() {
        let mut row = food_row("rice");
        row.put("id", 3i64).unwrap();
        row.put("create_time", 10i64).unwrap();
        row.put("modify_time", 20i64).unwrap();

        for source in [ObjectSource::Database, ObjectSource::DbEdit, ObjectSource::Test] {
            let food = Food::construct(row.clone(), source).unwrap();
            assert!(food.data().is_frozen());
            let rebuilt = Food::construct(food.deconstruct(), food.source()).unwrap();
            assert_eq!(rebuilt, food);
        }

        let new_food = Food::construct(food_row("beans"), ObjectSource::Import).unwrap();
        let rebuilt = Food::construct(new_food.deconstruct(), new_food.source()).unwrap();
        assert_eq!(rebuilt, new_food);
    }

    #[test]
    fn test_construct_rejects_wrong_table() {
        let row = RowData::new(serving::table());
        assert!(Food::construct(row, ObjectSource::Test).is_err());
    }

    #[test]
    fn test_pending_fk() {
        let mut row = RowData::new(serving::table());
        row.set(serving::FOOD_ID, crate::row::NO_ID).unwrap();
        row.set(serving::NAME, "cup".to_string()).unwrap();
        row.set(serving::QUANTITY, 80.0).unwrap();

        let s = Serving::construct(row.clone(), ObjectSource::Import)
            .unwrap()
            .with_pending_fk("food_id", "oats")
            .unwrap();
        let key = s.record().pending_fk("food_id").unwrap();
        assert_eq!(key.get_as(food::INDEX_NAME), Some("oats".to_string()));
        assert!(key.get("food_type").unwrap().is_null());

        assert!(Serving::construct(row.clone(), ObjectSource::Import)
            .unwrap()
            .with_pending_fk("name", "oats")
            .is_err());

        row.put("id", 1i64).unwrap();
        let stored = Serving::construct(row, ObjectSource::Database).unwrap();
        assert!(stored.with_pending_fk("food_id", "oats").is_err());
    }
}
