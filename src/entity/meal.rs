//! Meals and the food portions eaten in them

use super::food::{Food, HasNutrientData};
use super::{Entity, Record};
use crate::schema::{food_portion, meal, Table};
use crate::{Error, Result};
use std::sync::{Arc, OnceLock};

/// A meal, with its portions when loaded from the store
#[derive(Debug, Clone)]
pub struct Meal {
    record: Record,
    portions: Vec<FoodPortion>,
}

impl Meal {
    pub fn name(&self) -> String {
        self.record.data().get_as(meal::NAME).unwrap_or_default()
    }

    pub fn day(&self) -> String {
        self.record.data().get_as(meal::DAY).unwrap_or_default()
    }

    pub fn notes(&self) -> Option<String> {
        self.record.data().get_as(meal::NOTES)
    }

    pub fn portions(&self) -> &[FoodPortion] {
        &self.portions
    }

    pub fn contains_portion(&self, portion_id: i64) -> bool {
        self.portions.iter().any(|p| p.id() == Some(portion_id))
    }

    pub fn contains_food(&self, food_id: i64) -> bool {
        self.portions.iter().any(|p| p.food_id() == food_id)
    }

    /// Total amount of a nutrient over all linked portions
    pub fn nutrient_total(&self, nutrient_id: i64) -> f64 {
        self.portions
            .iter()
            .filter_map(|p| {
                p.food()
                    .and_then(|f| f.amount_per_100g(nutrient_id))
                    .map(|amount| amount * p.quantity() / 100.0)
            })
            .sum()
    }

    /// Attach portions. Every portion must belong to this meal.
    pub fn with_portions(mut self, portions: Vec<FoodPortion>) -> Result<Self> {
        if let Some(p) = portions.iter().find(|p| Some(p.meal_id()) != self.id()) {
            return Err(Error::Integrity(format!(
                "portion {:?} of meal {} attached to meal {:?}",
                p.id(),
                p.meal_id(),
                self.id()
            )));
        }
        self.portions = portions;
        Ok(self)
    }
}

impl Entity for Meal {
    fn table() -> &'static Table {
        meal::table()
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(Self {
            record,
            portions: Vec::new(),
        })
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn into_record(self) -> Record {
        self.record
    }
}

impl PartialEq for Meal {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

/// A quantity of one food eaten as part of a meal.
///
/// The food is linked once after a batch fetch.
#[derive(Debug, Clone)]
pub struct FoodPortion {
    record: Record,
    food: OnceLock<Arc<Food>>,
}

impl FoodPortion {
    pub fn meal_id(&self) -> i64 {
        self.record.data().get_as(food_portion::MEAL_ID).unwrap_or(crate::NO_ID)
    }

    pub fn food_id(&self) -> i64 {
        self.record.data().get_as(food_portion::FOOD_ID).unwrap_or(crate::NO_ID)
    }

    /// Grams eaten
    pub fn quantity(&self) -> f64 {
        self.record.data().get_as(food_portion::QUANTITY).unwrap_or(0.0)
    }

    pub fn notes(&self) -> Option<String> {
        self.record.data().get_as(food_portion::NOTES)
    }

    pub fn food(&self) -> Option<&Arc<Food>> {
        self.food.get()
    }

    pub fn link_food(&self, food: Arc<Food>) -> Result<()> {
        if food.id() != Some(self.food_id()) {
            return Err(Error::Integrity(format!(
                "portion references food {} but was linked to {:?}",
                self.food_id(),
                food.id()
            )));
        }
        self.food
            .set(food)
            .map_err(|_| Error::Integrity(format!("portion {:?} is already linked", self.id())))
    }
}

impl Entity for FoodPortion {
    fn table() -> &'static Table {
        food_portion::table()
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

impl PartialEq for FoodPortion {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}
