//! Built-in nutrition tables
//!
//! Each table lives in its own module with a `table()` accessor and typed
//! handles for its columns. Handle positions must match the declared order.

use super::column::{Col, Column};
use super::table::Table;
use crate::value::ColumnType;

fn build(name: &str, extra: Vec<Column>) -> Table {
    let mut columns = Table::standard_columns();
    columns.extend(extra);
    Table::register(name, columns)
        .unwrap_or_else(|e| panic!("invalid built-in table definition: {}", e))
}

pub mod food {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const CREATE_TIME: Col<i64> = Col::new(1, "create_time");
    pub const MODIFY_TIME: Col<i64> = Col::new(2, "modify_time");
    pub const INDEX_NAME: Col<String> = Col::new(3, "index_name");
    pub const NAME: Col<String> = Col::new(4, "name");
    pub const VARIETY: Col<String> = Col::new(5, "variety");
    pub const BRAND: Col<String> = Col::new(6, "brand");
    pub const NOTES: Col<String> = Col::new(7, "notes");
    pub const FOOD_TYPE: Col<String> = Col::new(8, "food_type");
    pub const SEARCH_RELEVANCE: Col<i64> = Col::new(9, "search_relevance");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "food",
                vec![
                    Column::new("index_name", ColumnType::Text).not_null().unique(),
                    Column::new("name", ColumnType::Text).not_null().secondary_key(),
                    Column::new("variety", ColumnType::Text),
                    Column::new("brand", ColumnType::Text),
                    Column::new("notes", ColumnType::Text),
                    Column::new("food_type", ColumnType::Text)
                        .not_null()
                        .default_value("primary"),
                    Column::new("search_relevance", ColumnType::Integer),
                ],
            )
        })
    }
}

pub mod nutrient {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const NAME: Col<String> = Col::new(3, "name");
    pub const UNIT: Col<String> = Col::new(4, "unit");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "nutrient",
                vec![
                    Column::new("name", ColumnType::Text).not_null().unique(),
                    Column::new("unit", ColumnType::Text).not_null().default_value("g"),
                ],
            )
        })
    }
}

pub mod serving {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const FOOD_ID: Col<i64> = Col::new(3, "food_id");
    pub const NAME: Col<String> = Col::new(4, "name");
    pub const QUANTITY: Col<f64> = Col::new(5, "quantity");
    pub const UNIT: Col<String> = Col::new(6, "unit");
    pub const IS_DEFAULT: Col<bool> = Col::new(7, "is_default");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "serving",
                vec![
                    Column::foreign_key("food_id", "food", "id").not_null(),
                    Column::new("name", ColumnType::Text).not_null(),
                    Column::new("quantity", ColumnType::Real).not_null(),
                    Column::new("unit", ColumnType::Text).not_null().default_value("g"),
                    Column::new("is_default", ColumnType::Boolean)
                        .not_null()
                        .default_value(false),
                ],
            )
        })
    }
}

pub mod nutrient_value {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const FOOD_ID: Col<i64> = Col::new(3, "food_id");
    pub const NUTRIENT_ID: Col<i64> = Col::new(4, "nutrient_id");
    /// Amount per 100 g (or 100 ml) of the food
    pub const AMOUNT: Col<f64> = Col::new(5, "amount");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "nutrient_value",
                vec![
                    Column::foreign_key("food_id", "food", "id").not_null(),
                    Column::foreign_key("nutrient_id", "nutrient", "id").not_null(),
                    Column::new("amount", ColumnType::Real).not_null(),
                ],
            )
        })
    }
}

pub mod ingredient {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const COMPOSITE_FOOD_ID: Col<i64> = Col::new(3, "composite_food_id");
    pub const FOOD_ID: Col<i64> = Col::new(4, "food_id");
    /// Grams of the ingredient food in the composite
    pub const QUANTITY: Col<f64> = Col::new(5, "quantity");
    pub const NOTES: Col<String> = Col::new(6, "notes");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "ingredient",
                vec![
                    Column::foreign_key("composite_food_id", "food", "id").not_null(),
                    Column::foreign_key("food_id", "food", "id").not_null(),
                    Column::new("quantity", ColumnType::Real).not_null(),
                    Column::new("notes", ColumnType::Text),
                ],
            )
        })
    }
}

pub mod meal {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const NAME: Col<String> = Col::new(3, "name");
    /// ISO-8601 date the meal was eaten
    pub const DAY: Col<String> = Col::new(4, "day");
    pub const NOTES: Col<String> = Col::new(5, "notes");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "meal",
                vec![
                    Column::new("name", ColumnType::Text).not_null(),
                    Column::new("day", ColumnType::Text).not_null().secondary_key(),
                    Column::new("notes", ColumnType::Text),
                ],
            )
        })
    }
}

pub mod food_portion {
    use super::*;
    use std::sync::OnceLock;

    pub const ID: Col<i64> = Col::new(0, "id");
    pub const MEAL_ID: Col<i64> = Col::new(3, "meal_id");
    pub const FOOD_ID: Col<i64> = Col::new(4, "food_id");
    /// Grams eaten
    pub const QUANTITY: Col<f64> = Col::new(5, "quantity");
    pub const NOTES: Col<String> = Col::new(6, "notes");

    pub fn table() -> &'static Table {
        static TABLE: OnceLock<Table> = OnceLock::new();
        TABLE.get_or_init(|| {
            build(
                "food_portion",
                vec![
                    Column::foreign_key("meal_id", "meal", "id").not_null(),
                    Column::foreign_key("food_id", "food", "id").not_null(),
                    Column::new("quantity", ColumnType::Real).not_null(),
                    Column::new("notes", ColumnType::Text),
                ],
            )
        })
    }
}
