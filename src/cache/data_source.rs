//! Data source façade
//!
//! Owns the database and the food and meal caches. Reads go through the
//! caches; writes go to the database and then invalidate and refetch every
//! cached entity whose contents they change.

use super::entity_cache::{CacheStats, EntityCache, Snapshot};
use super::loader;
use crate::entity::{
    Entity, Food, FoodKind, FoodPortion, HasIngredients, Ingredient, Meal, Nutrient, NutrientValue, ObjectSource, Serving,
};
use crate::query::{search, OrderedIdSet, QueryBuilder, SearchColumns, SearchRelevance};
use crate::resolve;
use crate::schema::{food, food_portion, ingredient, meal, nutrient, nutrient_value, serving, Table};
use crate::storage::{Database, DbStats, Executor};
use crate::value::ColumnType;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

/// Store a new or edited entity, returning its id.
///
/// Entities without an id are inserted. Restored and inbuilt entities keep
/// their id and are inserted; any other entity with an id is updated.
fn write<E: Entity>(db: &impl Executor, obj: &E) -> Result<i64> {
    let table = E::table().name();
    if !obj.record().pending_fks().is_empty() {
        return Err(Error::Integrity(format!(
            "{} object still has unresolved references: {:?}",
            table,
            obj.record().pending_fks().keys().collect::<Vec<_>>()
        )));
    }
    if let Some(col) = obj.data().missing_required().first() {
        return Err(Error::Integrity(format!("{}.{} is required", table, col.name())));
    }
    match (obj.id(), obj.source()) {
        (Some(_), ObjectSource::Restore | ObjectSource::Inbuilt) | (None, _) => db.insert(obj.data()),
        (Some(id), _) => {
            db.update(obj.data())?;
            Ok(id)
        }
    }
}

/// Whether `food` is, or transitively contains, food `id`
fn depends_on(food: &Food, id: i64) -> bool {
    food.id() == Some(id)
        || food
            .ingredients()
            .iter()
            .any(|i| i.food_id() == id || i.food().is_some_and(|f| depends_on(f, id)))
}

/// Cached, relationship-aware access to foods, meals and nutrients
pub struct DataSource {
    db: Database,
    foods: EntityCache<Food>,
    meals: EntityCache<Meal>,
    paused: bool,
}

impl DataSource {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            foods: EntityCache::new("food"),
            meals: EntityCache::new("meal"),
            paused: false,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    // ----- foods -----

    pub fn get_food(&mut self, id: i64) -> Result<Option<Arc<Food>>> {
        if let Some(food) = self.foods.get(id) {
            return Ok(Some(food));
        }
        self.load_foods(&[id])?;
        Ok(self.foods.peek(id))
    }

    /// Foods in the order requested; ids without a stored food are skipped
    pub fn get_foods(&mut self, ids: &[i64]) -> Result<Vec<Arc<Food>>> {
        let mut misses: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| self.foods.get(*id).is_none())
            .collect();
        misses.sort_unstable();
        misses.dedup();
        self.load_foods(&misses)?;
        Ok(ids.iter().filter_map(|id| self.foods.peek(*id)).collect())
    }

    /// Every stored food, by id
    pub fn get_all_foods(&mut self) -> Result<Vec<Arc<Food>>> {
        if !self.foods.is_all_valid() {
            self.foods.record_fetch();
            let missing: Vec<i64> = loader::all_ids(&self.db, food::table())?
                .into_iter()
                .filter(|id| !self.foods.contains(*id))
                .collect();
            self.load_foods(&missing)?;
            self.foods.set_all_valid();
            self.foods.publish();
        }
        let mut all: Vec<Arc<Food>> = self.foods.values().cloned().collect();
        all.sort_by_key(|f| f.id());
        Ok(all)
    }

    pub fn get_food_by_index_name(&mut self, index_name: &str) -> Result<Option<Arc<Food>>> {
        let cached = self
            .foods
            .values()
            .find(|f| f.index_name() == index_name)
            .and_then(|f| f.id());
        if let Some(id) = cached {
            return self.get_food(id);
        }
        let ids = QueryBuilder::new(food::table())
            .filter_eq(food::INDEX_NAME.name(), index_name)
            .select_column(&self.db, food::ID.name())?;
        match ids.first().and_then(|v| v.as_i64()) {
            Some(id) => self.get_food(id),
            None => Ok(None),
        }
    }

    /// Foods matching `keyword`, best matches first
    pub fn search_foods(
        &mut self,
        keyword: &str,
        max_results: Option<usize>,
        min_relevance: SearchRelevance,
    ) -> Result<Vec<Arc<Food>>> {
        let ids = search::search(&self.db, &SearchColumns::foods(), keyword, max_results, min_relevance)?;
        self.foods_for(ids)
    }

    /// Foods matching all (or any) of `keywords`
    pub fn search_foods_multi(
        &mut self,
        keywords: &[&str],
        match_all: bool,
        max_results: Option<usize>,
        min_relevance: SearchRelevance,
    ) -> Result<Vec<Arc<Food>>> {
        let ids = search::search_multi(
            &self.db,
            &SearchColumns::foods(),
            keywords,
            match_all,
            max_results,
            min_relevance,
        )?;
        self.foods_for(ids)
    }

    fn foods_for(&mut self, ids: OrderedIdSet) -> Result<Vec<Arc<Food>>> {
        self.get_foods(&ids.into_vec())
    }

    /// Insert or update a food row. Child rows are saved separately.
    pub fn save_food(&mut self, food: &Food) -> Result<i64> {
        if let (Some(id), FoodKind::Primary) = (food.id(), food.kind()) {
            let used = QueryBuilder::new(ingredient::table())
                .filter_eq(ingredient::COMPOSITE_FOOD_ID.name(), id)
                .limit(1)
                .select_column(&self.db, ingredient::ID.name())?;
            if !used.is_empty() {
                return Err(Error::Integrity(format!(
                    "food {} has ingredients and cannot become primary",
                    food.index_name()
                )));
            }
        }
        let id = write(&self.db, food)?;
        tracing::debug!(id, index_name = %food.index_name(), "saved food");
        self.foods_changed(&[id])?;
        Ok(id)
    }

    /// Delete a food with its servings, nutrient values and ingredients.
    /// Fails if the food is still used as an ingredient or in a meal.
    pub fn delete_food(&mut self, id: i64) -> Result<bool> {
        let removed = self.db.transaction(|tx| {
            QueryBuilder::new(serving::table())
                .filter_eq(serving::FOOD_ID.name(), id)
                .delete(tx)?;
            QueryBuilder::new(nutrient_value::table())
                .filter_eq(nutrient_value::FOOD_ID.name(), id)
                .delete(tx)?;
            QueryBuilder::new(ingredient::table())
                .filter_eq(ingredient::COMPOSITE_FOOD_ID.name(), id)
                .delete(tx)?;
            tx.delete_by_id(food::table(), id)
        })?;
        if removed {
            self.foods_changed(&[id])?;
        }
        Ok(removed)
    }

    pub fn save_serving(&mut self, serving: &Serving) -> Result<i64> {
        let previous = serving.id().and_then(|sid| {
            self.cached_food_owner(|f| f.servings().iter().any(|s| s.id() == Some(sid)))
        });
        let id = write(&self.db, serving)?;
        self.foods_changed(&owners(serving.food_id(), previous))?;
        Ok(id)
    }

    pub fn delete_serving(&mut self, id: i64) -> Result<bool> {
        self.delete_child(serving::table(), serving::FOOD_ID.name(), id, true)
    }

    /// Replace every nutrient value of a food in one transaction
    pub fn replace_nutrient_values(&mut self, food_id: i64, values: &[NutrientValue]) -> Result<usize> {
        if let Some(v) = values.iter().find(|v| v.food_id() != food_id) {
            return Err(Error::Integrity(format!(
                "nutrient value for food {} passed as a value of food {}",
                v.food_id(),
                food_id
            )));
        }
        let count = self.db.transaction(|tx| {
            QueryBuilder::new(nutrient_value::table())
                .filter_eq(nutrient_value::FOOD_ID.name(), food_id)
                .delete(tx)?;
            for value in values {
                tx.insert(&value.data().copy_stripped())?;
            }
            Ok(values.len())
        })?;
        self.foods_changed(&[food_id])?;
        Ok(count)
    }

    /// Insert or update an ingredient. The owner must be a composite food and
    /// the ingredient may not lead back to it.
    pub fn save_ingredient(&mut self, ingredient: &Ingredient) -> Result<i64> {
        let composite_id = ingredient.composite_food_id();
        let food_id = ingredient.food_id();
        if composite_id == food_id {
            return Err(Error::Integrity(format!("food {} cannot contain itself", food_id)));
        }
        let composite = self
            .get_food(composite_id)?
            .ok_or_else(|| Error::Integrity(format!("no food with id {}", composite_id)))?;
        if !composite.is_composite() {
            return Err(Error::Integrity(format!(
                "{} is a primary food and cannot have ingredients",
                composite.index_name()
            )));
        }
        let target = self
            .get_food(food_id)?
            .ok_or_else(|| Error::Integrity(format!("no food with id {}", food_id)))?;
        if depends_on(&target, composite_id) {
            return Err(Error::Integrity(format!(
                "{} already contains {}",
                target.index_name(),
                composite.index_name()
            )));
        }

        let previous = ingredient.id().and_then(|iid| {
            self.cached_food_owner(|f| f.ingredients().iter().any(|i| i.id() == Some(iid)))
        });
        let id = write(&self.db, ingredient)?;
        self.foods_changed(&owners(composite_id, previous))?;
        Ok(id)
    }

    pub fn delete_ingredient(&mut self, id: i64) -> Result<bool> {
        self.delete_child(ingredient::table(), ingredient::COMPOSITE_FOOD_ID.name(), id, true)
    }

    // ----- meals -----

    pub fn get_meal(&mut self, id: i64) -> Result<Option<Arc<Meal>>> {
        if let Some(meal) = self.meals.get(id) {
            return Ok(Some(meal));
        }
        self.load_meals(&[id])?;
        Ok(self.meals.peek(id))
    }

    pub fn get_all_meals(&mut self) -> Result<Vec<Arc<Meal>>> {
        if !self.meals.is_all_valid() {
            self.meals.record_fetch();
            let missing: Vec<i64> = loader::all_ids(&self.db, meal::table())?
                .into_iter()
                .filter(|id| !self.meals.contains(*id))
                .collect();
            self.load_meals(&missing)?;
            self.meals.set_all_valid();
            self.meals.publish();
        }
        let mut all: Vec<Arc<Meal>> = self.meals.values().cloned().collect();
        all.sort_by_key(|m| m.id());
        Ok(all)
    }

    pub fn save_meal(&mut self, meal: &Meal) -> Result<i64> {
        let id = write(&self.db, meal)?;
        self.meals_changed(&[id])?;
        Ok(id)
    }

    /// Delete a meal and its portions
    pub fn delete_meal(&mut self, id: i64) -> Result<bool> {
        let removed = self.db.transaction(|tx| {
            QueryBuilder::new(food_portion::table())
                .filter_eq(food_portion::MEAL_ID.name(), id)
                .delete(tx)?;
            tx.delete_by_id(meal::table(), id)
        })?;
        if removed {
            self.meals_changed(&[id])?;
        }
        Ok(removed)
    }

    /// Insert or update a portion. Moving a portion to another meal refreshes
    /// both meals.
    pub fn save_food_portion(&mut self, portion: &FoodPortion) -> Result<i64> {
        let previous = portion.id().and_then(|pid| {
            self.meals
                .values()
                .find(|m| m.contains_portion(pid))
                .and_then(|m| m.id())
        });
        let id = write(&self.db, portion)?;
        self.meals_changed(&owners(portion.meal_id(), previous))?;
        Ok(id)
    }

    pub fn delete_food_portion(&mut self, id: i64) -> Result<bool> {
        self.delete_child(food_portion::table(), food_portion::MEAL_ID.name(), id, false)
    }

    // ----- nutrients -----

    pub fn get_all_nutrients(&self) -> Result<Vec<Nutrient>> {
        let mut nutrients = QueryBuilder::new(nutrient::table())
            .select_rows(&self.db)?
            .into_iter()
            .map(|row| Nutrient::construct(row, ObjectSource::Database))
            .collect::<Result<Vec<_>>>()?;
        nutrients.sort_by_key(|n| n.id());
        Ok(nutrients)
    }

    /// Save nutrients in one transaction, returning their ids
    pub fn save_nutrients(&mut self, nutrients: &[Nutrient]) -> Result<Vec<i64>> {
        self.db
            .transaction(|tx| nutrients.iter().map(|n| write(tx, n)).collect())
    }

    // ----- refresh control -----

    /// Queue refreshes instead of running them after each write
    pub fn pause_refreshes(&mut self) {
        self.paused = true;
    }

    /// Refresh every entity queued while paused, once each
    pub fn resume_refreshes(&mut self) -> Result<()> {
        self.paused = false;
        let foods = self.foods.drain_queued();
        let meals = self.meals.drain_queued();
        tracing::debug!(foods = foods.len(), meals = meals.len(), "resuming refreshes");
        self.refresh(foods, meals)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run `f` as one batch. Every write it makes is committed together or
    /// rolled back together. A rolled-back batch drops both caches, since
    /// they may hold rows that no longer exist.
    pub fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let was_paused = self.paused;
        self.db.execute_raw("SAVEPOINT larder_batch")?;
        match f(self) {
            Ok(value) => {
                self.db.execute_raw("RELEASE larder_batch")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.db.execute_raw("ROLLBACK TO larder_batch; RELEASE larder_batch") {
                    tracing::warn!("batch rollback failed after {}: {}", e, rollback);
                }
                self.paused = was_paused;
                self.drop_caches();
                tracing::debug!("batch rolled back");
                Err(e)
            }
        }
    }

    /// Delete every stored row
    pub fn clear_all(&mut self) -> Result<()> {
        self.db.clear_all()?;
        self.drop_caches();
        Ok(())
    }

    // ----- observers & diagnostics -----

    pub fn subscribe_foods(&self) -> watch::Receiver<Snapshot<Food>> {
        self.foods.subscribe()
    }

    pub fn subscribe_meals(&self) -> watch::Receiver<Snapshot<Meal>> {
        self.meals.subscribe()
    }

    pub fn stats(&self) -> Result<DbStats> {
        self.db.stats()
    }

    /// Number of stored foods per `food_type` value
    pub fn food_counts_by_type(&self) -> Result<Vec<(String, i64)>> {
        let rows = QueryBuilder::new(food::table())
            .group_by("food_type")
            .order_by("food_type")
            .select_expressions(&self.db, &[("food_type", ColumnType::Text), ("COUNT(*)", ColumnType::Integer)])?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match (row[0].as_str(), row[1].as_i64()) {
                (Some(kind), Some(n)) => Some((kind.to_string(), n)),
                _ => None,
            })
            .collect())
    }

    pub fn food_cache_stats(&self) -> CacheStats {
        self.foods.stats()
    }

    pub fn meal_cache_stats(&self) -> CacheStats {
        self.meals.stats()
    }

    /// Resolve pending natural-key references against stored parents
    pub fn complete_foreign_keys<E: Entity>(&self, objects: Vec<E>, fk_columns: &[&str]) -> Result<Vec<E>> {
        resolve::complete_foreign_keys(&self.db, objects, fk_columns)
    }

    // ----- invalidation -----

    fn drop_caches(&mut self) {
        self.foods.clear();
        self.meals.clear();
        self.foods.publish();
        self.meals.publish();
    }

    fn cached_food_owner(&self, contains: impl Fn(&Food) -> bool) -> Option<i64> {
        self.foods
            .values()
            .map(Arc::as_ref)
            .find(|f| contains(*f))
            .and_then(|f| f.id())
    }

    /// Delete a child row and refresh its owner, found from the stored row
    fn delete_child(&mut self, table: &'static Table, owner_column: &str, id: i64, food_owned: bool) -> Result<bool> {
        let owner = QueryBuilder::new(table)
            .filter_eq("id", id)
            .select_column(&self.db, owner_column)?
            .first()
            .and_then(|v| v.as_i64());
        let removed = self.db.delete_by_id(table, id)?;
        if let (true, Some(owner)) = (removed, owner) {
            if food_owned {
                self.foods_changed(&[owner])?;
            } else {
                self.meals_changed(&[owner])?;
            }
        }
        Ok(removed)
    }

    fn foods_changed(&mut self, ids: &[i64]) -> Result<()> {
        self.foods.mark_dirty();
        if self.paused {
            ids.iter().for_each(|id| self.foods.queue(*id));
            return Ok(());
        }
        self.refresh(ids.iter().copied().collect(), BTreeSet::new())
    }

    fn meals_changed(&mut self, ids: &[i64]) -> Result<()> {
        self.meals.mark_dirty();
        if self.paused {
            ids.iter().for_each(|id| self.meals.queue(*id));
            return Ok(());
        }
        self.refresh(BTreeSet::new(), ids.iter().copied().collect())
    }

    /// Invalidate and refetch the given foods and meals, plus every cached
    /// composite food and meal that depends on a changed food
    fn refresh(&mut self, food_ids: BTreeSet<i64>, mut meal_ids: BTreeSet<i64>) -> Result<()> {
        let foods = self.dependent_foods(food_ids);
        meal_ids.extend(
            self.meals
                .values()
                .filter(|m| foods.iter().any(|id| m.contains_food(*id)))
                .filter_map(|m| m.id()),
        );
        for id in &foods {
            self.foods.invalidate(*id);
        }
        for id in &meal_ids {
            self.meals.invalidate(*id);
        }
        tracing::debug!(foods = ?foods, meals = ?meal_ids, "invalidated");

        let foods: Vec<i64> = foods.into_iter().collect();
        let meals: Vec<i64> = meal_ids.into_iter().collect();
        self.load_foods(&foods)?;
        self.load_meals(&meals)?;
        self.foods.publish();
        self.meals.publish();
        Ok(())
    }

    /// `seed` plus cached composites that use any of them, transitively
    fn dependent_foods(&self, seed: BTreeSet<i64>) -> BTreeSet<i64> {
        let mut frontier: Vec<i64> = seed.iter().copied().collect();
        let mut result = seed;
        while let Some(id) = frontier.pop() {
            for food in self.foods.values().filter(|f| f.uses_ingredient(id)) {
                if let Some(user) = food.id() {
                    if result.insert(user) {
                        frontier.push(user);
                    }
                }
            }
        }
        result
    }

    /// Fetch foods into the cache and link their ingredients, loading
    /// ingredient foods that are not cached yet
    fn load_foods(&mut self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.foods.record_fetch();
        tracing::debug!(count = ids.len(), "fetching foods");
        let fetched: Vec<Arc<Food>> = loader::fetch_foods(&self.db, ids)?
            .into_iter()
            .map(Arc::new)
            .collect();
        for food in &fetched {
            if let Some(id) = food.id() {
                self.foods.insert(id, food.clone());
            }
        }

        let mut missing: Vec<i64> = fetched
            .iter()
            .flat_map(|f| f.ingredient_food_ids())
            .filter(|id| !self.foods.contains(*id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if let Err(e) = self.load_foods(&missing) {
            for id in fetched.iter().filter_map(|f| f.id()) {
                self.foods.invalidate(id);
            }
            return Err(e);
        }

        for food in &fetched {
            for ing in food.ingredients() {
                if let Some(target) = self.foods.peek(ing.food_id()) {
                    ing.link_food(target)?;
                }
            }
        }
        Ok(())
    }

    /// Fetch meals into the cache and link their portions to foods
    fn load_meals(&mut self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.meals.record_fetch();
        tracing::debug!(count = ids.len(), "fetching meals");
        let fetched = loader::fetch_meals(&self.db, ids)?;

        let mut missing: Vec<i64> = fetched
            .iter()
            .flat_map(|m| m.portions().iter().map(FoodPortion::food_id))
            .filter(|id| !self.foods.contains(*id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        self.load_foods(&missing)?;

        for meal in fetched {
            for portion in meal.portions() {
                if let Some(food) = self.foods.peek(portion.food_id()) {
                    portion.link_food(food)?;
                }
            }
            if let Some(id) = meal.id() {
                self.meals.insert(id, Arc::new(meal));
            }
        }
        Ok(())
    }
}

fn owners(current: i64, previous: Option<i64>) -> Vec<i64> {
    let mut ids = vec![current];
    ids.extend(previous.filter(|p| *p != current));
    ids
}
