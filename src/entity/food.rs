//! Foods and their ingredients
//!
//! A food is either primary (nutrient values recorded directly) or composite
//! (nutrient values aggregated from ingredient foods). The variant is read
//! from the `food_type` column once, at construction.

use super::nutrient::NutrientValue;
use super::serving::Serving;
use super::{Entity, Record};
use crate::query::search::SearchRelevance;
use crate::schema::{food, ingredient, Table};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Food variant, decided by the `food_type` discriminator column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FoodKind {
    Primary,
    Composite,
}

impl FoodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodKind::Primary => "primary",
            FoodKind::Composite => "composite",
        }
    }

    /// Search relevance used when a food has no explicit override
    pub fn default_relevance(&self) -> SearchRelevance {
        match self {
            FoodKind::Primary => SearchRelevance::Normal,
            FoodKind::Composite => SearchRelevance::Low,
        }
    }
}

impl FromStr for FoodKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(FoodKind::Primary),
            "composite" | "recipe" => Ok(FoodKind::Composite),
            _ => Err(Error::Type(format!("Unknown food type: {}", s))),
        }
    }
}

impl std::fmt::Display for FoodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Default relevance bucket for a raw `food_type` value
pub fn default_relevance(food_type: &str) -> SearchRelevance {
    food_type
        .parse::<FoodKind>()
        .map(|k| k.default_relevance())
        .unwrap_or(SearchRelevance::Low)
}

/// Capability of anything that can report nutrient amounts
pub trait HasNutrientData {
    /// Amount of a nutrient per 100 g, `None` when there is no data for it
    fn amount_per_100g(&self, nutrient_id: i64) -> Option<f64>;

    /// Nutrients with data
    fn nutrient_ids(&self) -> BTreeSet<i64>;
}

/// Capability of anything built from ingredient foods
pub trait HasIngredients {
    fn ingredients(&self) -> &[Ingredient];

    /// Ids of the ingredient foods, in ingredient order
    fn ingredient_food_ids(&self) -> Vec<i64> {
        self.ingredients().iter().map(Ingredient::food_id).collect()
    }

    /// Total weight of all ingredients in grams
    fn total_weight(&self) -> f64 {
        self.ingredients().iter().map(Ingredient::quantity).sum()
    }
}

/// Where a food's nutrient data comes from
#[derive(Debug, Clone, Copy)]
pub enum NutrientData<'a> {
    /// Recorded per food
    Direct(&'a [NutrientValue]),
    /// Weighted sum over linked ingredient foods
    Aggregated(&'a [Ingredient]),
}

impl HasNutrientData for NutrientData<'_> {
    fn amount_per_100g(&self, nutrient_id: i64) -> Option<f64> {
        match self {
            NutrientData::Direct(values) => values
                .iter()
                .find(|v| v.nutrient_id() == nutrient_id)
                .map(NutrientValue::amount),
            NutrientData::Aggregated(ingredients) => {
                let total_weight = ingredients.total_weight();
                if total_weight <= 0.0 {
                    return None;
                }
                let mut found = false;
                let mut total = 0.0;
                for ing in ingredients.iter() {
                    if let Some(amount) = ing.food().and_then(|f| f.amount_per_100g(nutrient_id)) {
                        found = true;
                        total += amount * ing.quantity() / 100.0;
                    }
                }
                found.then(|| total * 100.0 / total_weight)
            }
        }
    }

    fn nutrient_ids(&self) -> BTreeSet<i64> {
        match self {
            NutrientData::Direct(values) => values.iter().map(NutrientValue::nutrient_id).collect(),
            NutrientData::Aggregated(ingredients) => ingredients
                .iter()
                .filter_map(Ingredient::food)
                .flat_map(|f| f.nutrient_ids())
                .collect(),
        }
    }
}

/// A food, with its servings, nutrient values and ingredients when loaded
/// from the store
#[derive(Debug, Clone)]
pub struct Food {
    record: Record,
    kind: FoodKind,
    servings: Vec<Serving>,
    nutrient_values: Vec<NutrientValue>,
    ingredients: Vec<Ingredient>,
}

impl Food {
    pub fn index_name(&self) -> String {
        self.record.data().get_as(food::INDEX_NAME).unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.record.data().get_as(food::NAME).unwrap_or_default()
    }

    pub fn variety(&self) -> Option<String> {
        self.record.data().get_as(food::VARIETY)
    }

    pub fn brand(&self) -> Option<String> {
        self.record.data().get_as(food::BRAND)
    }

    pub fn notes(&self) -> Option<String> {
        self.record.data().get_as(food::NOTES)
    }

    pub fn kind(&self) -> FoodKind {
        self.kind
    }

    pub fn is_composite(&self) -> bool {
        self.kind == FoodKind::Composite
    }

    /// Explicit relevance override, if set on the row
    pub fn search_relevance(&self) -> SearchRelevance {
        self.record
            .data()
            .get_as(food::SEARCH_RELEVANCE)
            .map(SearchRelevance::from_level)
            .unwrap_or_else(|| self.kind.default_relevance())
    }

    /// Name with variety and brand, for display
    pub fn display_name(&self) -> String {
        let mut name = self.name();
        if let Some(variety) = self.variety() {
            name.push_str(&format!(", {}", variety));
        }
        if let Some(brand) = self.brand() {
            name.push_str(&format!(" ({})", brand));
        }
        name
    }

    pub fn servings(&self) -> &[Serving] {
        &self.servings
    }

    pub fn default_serving(&self) -> Option<&Serving> {
        self.servings.iter().find(|s| s.is_default())
    }

    pub fn nutrient_values(&self) -> &[NutrientValue] {
        &self.nutrient_values
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    /// Nutrient data source for this food's variant
    pub fn nutrient_data(&self) -> NutrientData<'_> {
        match self.kind {
            FoodKind::Primary => NutrientData::Direct(&self.nutrient_values),
            FoodKind::Composite => NutrientData::Aggregated(&self.ingredients),
        }
    }

    /// Attach child rows. Every child must belong to this food.
    pub fn with_children(
        mut self,
        servings: Vec<Serving>,
        nutrient_values: Vec<NutrientValue>,
        ingredients: Vec<Ingredient>,
    ) -> Result<Self> {
        let id = self.id();
        let foreign = servings.iter().any(|s| Some(s.food_id()) != id)
            || nutrient_values.iter().any(|v| Some(v.food_id()) != id)
            || ingredients.iter().any(|i| Some(i.composite_food_id()) != id);
        if foreign {
            return Err(Error::Integrity(format!(
                "child rows attached to food {:?} belong to another food",
                id
            )));
        }
        if !ingredients.is_empty() && self.kind == FoodKind::Primary {
            return Err(Error::Integrity(format!(
                "primary food {} cannot have ingredients",
                self.index_name()
            )));
        }
        self.servings = servings;
        self.nutrient_values = nutrient_values;
        self.ingredients = ingredients;
        Ok(self)
    }

    /// Whether any ingredient of this food is `food_id`
    pub fn uses_ingredient(&self, food_id: i64) -> bool {
        self.ingredients.iter().any(|i| i.food_id() == food_id)
    }
}

impl HasNutrientData for Food {
    fn amount_per_100g(&self, nutrient_id: i64) -> Option<f64> {
        self.nutrient_data().amount_per_100g(nutrient_id)
    }

    fn nutrient_ids(&self) -> BTreeSet<i64> {
        self.nutrient_data().nutrient_ids()
    }
}

impl HasIngredients for Food {
    fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }
}

impl HasIngredients for [Ingredient] {
    fn ingredients(&self) -> &[Ingredient] {
        self
    }
}

impl Entity for Food {
    fn table() -> &'static Table {
        food::table()
    }

    fn from_record(record: Record) -> Result<Self> {
        let kind = record
            .data()
            .get_as(food::FOOD_TYPE)
            .ok_or_else(|| Error::Type("food_type must be set".to_string()))?
            .parse()?;
        Ok(Self {
            record,
            kind,
            servings: Vec::new(),
            nutrient_values: Vec::new(),
            ingredients: Vec::new(),
        })
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn into_record(self) -> Record {
        self.record
    }
}

impl PartialEq for Food {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

/// An ingredient of a composite food.
///
/// The ingredient food is linked after a batch fetch with [`Ingredient::link_food`],
/// which may only be called once.
#[derive(Debug, Clone)]
pub struct Ingredient {
    record: Record,
    food: OnceLock<Arc<Food>>,
}

impl Ingredient {
    pub fn composite_food_id(&self) -> i64 {
        self.record.data().get_as(ingredient::COMPOSITE_FOOD_ID).unwrap_or(crate::NO_ID)
    }

    pub fn food_id(&self) -> i64 {
        self.record.data().get_as(ingredient::FOOD_ID).unwrap_or(crate::NO_ID)
    }

    /// Grams of the ingredient food
    pub fn quantity(&self) -> f64 {
        self.record.data().get_as(ingredient::QUANTITY).unwrap_or(0.0)
    }

    pub fn notes(&self) -> Option<String> {
        self.record.data().get_as(ingredient::NOTES)
    }

    pub fn food(&self) -> Option<&Arc<Food>> {
        self.food.get()
    }

    /// Link the ingredient food. Fails if already linked or if `food` is not
    /// the food this row references.
    pub fn link_food(&self, food: Arc<Food>) -> Result<()> {
        if food.id() != Some(self.food_id()) {
            return Err(Error::Integrity(format!(
                "ingredient references food {} but was linked to {:?}",
                self.food_id(),
                food.id()
            )));
        }
        self.food.set(food).map_err(|_| {
            Error::Integrity(format!("ingredient {:?} is already linked", self.id()))
        })
    }
}

impl Entity for Ingredient {
    fn table() -> &'static Table {
        ingredient::table()
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(Self {
            record,
            food: OnceLock::new(),
        })
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn into_record(self) -> Record {
        self.record
    }
}

impl PartialEq for Ingredient {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}
