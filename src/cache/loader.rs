//! Batch fetches of foods and meals with their child rows.
//!
//! Entities come back unlinked; the data source links ingredients and
//! portions to cached foods afterwards.

use crate::entity::{Entity, Food, FoodPortion, Ingredient, Meal, NutrientValue, ObjectSource, Serving};
use crate::query::QueryBuilder;
use crate::schema::{food, food_portion, ingredient, meal, nutrient_value, serving};
use crate::storage::Executor;
use crate::Result;
use std::collections::HashMap;

/// Rows of `E` whose `owner_column` is one of `owners`, grouped by owner id
/// and sorted by id
fn fetch_children<E, F>(
    db: &impl Executor,
    owner_column: &str,
    owners: &[i64],
    owner_of: F,
) -> Result<HashMap<i64, Vec<E>>>
where
    E: Entity,
    F: Fn(&E) -> i64,
{
    let rows = QueryBuilder::new(E::table())
        .filter_in(owner_column, owners.iter().copied())
        .select_rows(db)?;
    let mut grouped: HashMap<i64, Vec<E>> = HashMap::new();
    for row in rows {
        let child = E::construct(row, ObjectSource::Database)?;
        grouped.entry(owner_of(&child)).or_default().push(child);
    }
    for children in grouped.values_mut() {
        children.sort_by_key(|c| c.id());
    }
    Ok(grouped)
}

/// Foods with the given ids, with servings, nutrient values and ingredients.
/// Ids without a row are skipped.
pub fn fetch_foods(db: &impl Executor, ids: &[i64]) -> Result<Vec<Food>> {
    let rows = QueryBuilder::new(food::table())
        .filter_in(food::ID.name(), ids.iter().copied())
        .select_rows(db)?;
    let mut servings = fetch_children(db, serving::FOOD_ID.name(), ids, Serving::food_id)?;
    let mut values = fetch_children(db, nutrient_value::FOOD_ID.name(), ids, NutrientValue::food_id)?;
    let mut ingredients = fetch_children(
        db,
        ingredient::COMPOSITE_FOOD_ID.name(),
        ids,
        Ingredient::composite_food_id,
    )?;

    let mut foods = rows
        .into_iter()
        .map(|row| {
            let food = Food::construct(row, ObjectSource::Database)?;
            let id = food.id().unwrap_or(crate::NO_ID);
            food.with_children(
                servings.remove(&id).unwrap_or_default(),
                values.remove(&id).unwrap_or_default(),
                ingredients.remove(&id).unwrap_or_default(),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    foods.sort_by_key(|f| f.id());
    Ok(foods)
}

/// Meals with the given ids, with their portions
pub fn fetch_meals(db: &impl Executor, ids: &[i64]) -> Result<Vec<Meal>> {
    let rows = QueryBuilder::new(meal::table())
        .filter_in(meal::ID.name(), ids.iter().copied())
        .select_rows(db)?;
    let mut portions = fetch_children(db, food_portion::MEAL_ID.name(), ids, FoodPortion::meal_id)?;

    let mut meals = rows
        .into_iter()
        .map(|row| {
            let meal = Meal::construct(row, ObjectSource::Database)?;
            let id = meal.id().unwrap_or(crate::NO_ID);
            meal.with_portions(portions.remove(&id).unwrap_or_default())
        })
        .collect::<Result<Vec<_>>>()?;
    meals.sort_by_key(|m| m.id());
    Ok(meals)
}

/// Every id in a table
pub fn all_ids(db: &impl Executor, table: &'static crate::schema::Table) -> Result<Vec<i64>> {
    let mut ids: Vec<i64> = QueryBuilder::new(table)
        .select_column(db, "id")?
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    ids.sort_unstable();
    Ok(ids)
}
