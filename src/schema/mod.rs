//! Schema Model - table, column and foreign key metadata
//!
//! The nutrition schema is made of these tables, listed parents first:
//! - food(index_name, name, variety, brand, notes, food_type, search_relevance)
//! - nutrient(name, unit)
//! - serving(food_id, name, quantity, unit, is_default)
//! - nutrient_value(food_id, nutrient_id, amount)
//! - ingredient(composite_food_id, food_id, quantity, notes)
//! - meal(name, day, notes)
//! - food_portion(meal_id, food_id, quantity, notes)

pub mod column;
pub mod table;
pub mod tables;

pub use column::{Col, Column, ForeignKey};
pub use table::{Table, CREATE_TIME, ID, MODIFY_TIME};
pub use tables::{food, food_portion, ingredient, meal, nutrient, nutrient_value, serving};

use crate::{Error, Result};

/// All built-in tables, parents before children
pub fn all_tables() -> [&'static Table; 7] {
    [
        food::table(),
        nutrient::table(),
        serving::table(),
        nutrient_value::table(),
        ingredient::table(),
        meal::table(),
        food_portion::table(),
    ]
}

/// Look up a built-in table by name
pub fn table(name: &str) -> Option<&'static Table> {
    all_tables().into_iter().find(|t| t.name() == name)
}

/// Check that every foreign key names a table and column in `tables`,
/// and that each table is listed after the tables it references.
pub fn validate(tables: &[&Table]) -> Result<()> {
    for (pos, t) in tables.iter().enumerate() {
        for fk_col in t.fk_columns() {
            let Some(fk) = fk_col.references() else { continue };
            let parent_pos = tables
                .iter()
                .position(|p| p.name() == fk.table)
                .ok_or_else(|| {
                    Error::Schema(format!(
                        "{}.{} references unknown table {}",
                        t.name(),
                        fk_col.name(),
                        fk.table
                    ))
                })?;
            let parent = tables[parent_pos];
            parent.require_column(&fk.column)?;
            if parent_pos > pos {
                return Err(Error::Schema(format!(
                    "{} must be registered after its parent {}",
                    t.name(),
                    parent.name()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ColumnType;

    #[test]
    fn test_builtin_tables_follow_conventions() {
        for t in all_tables() {
            let names: Vec<&str> = t.columns().iter().take(3).map(Column::name).collect();
            assert_eq!(names, vec![ID, CREATE_TIME, MODIFY_TIME], "table {}", t.name());

            let unique_non_id = t.columns().iter().skip(1).filter(|c| c.is_unique()).count();
            assert!(unique_non_id <= 1, "table {}", t.name());
        }
    }

    #[test]
    fn test_builtin_schema_references_resolve() {
        validate(&all_tables()).unwrap();
    }

    #[test]
    fn test_table_lookup() {
        assert_eq!(table("serving").unwrap().name(), "serving");
        assert!(table("recipe").is_none());
        assert_eq!(food::table().natural_key_column().unwrap().name(), "index_name");
        assert!(meal::table().natural_key_column().is_none());
    }

    #[test]
    fn test_validate_rejects_dangling_reference() {
        let mut cols = Table::standard_columns();
        cols.push(Column::foreign_key("owner_id", "owner", "id"));
        let orphan = Table::register("orphan", cols).unwrap();
        assert!(validate(&[&orphan]).is_err());

        let mut cols = Table::standard_columns();
        cols.push(Column::new("label", ColumnType::Text));
        let owner = Table::register("owner", cols).unwrap();
        assert!(validate(&[&orphan, &owner]).is_err());
        validate(&[&owner, &orphan]).unwrap();
    }

    #[test]
    fn test_typed_handles_match_positions() {
        assert_eq!(food::table().columns()[food::INDEX_NAME.index()].name(), food::INDEX_NAME.name());
        assert_eq!(serving::table().columns()[serving::FOOD_ID.index()].name(), "food_id");
        assert_eq!(
            food_portion::table().columns()[food_portion::QUANTITY.index()].name(),
            "quantity"
        );
    }
}
