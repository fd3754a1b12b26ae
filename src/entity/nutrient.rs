//! Nutrients and per-food nutrient values

use super::{Entity, Record};
use crate::schema::{nutrient, nutrient_value, Table};
use crate::Result;

/// A nutrient such as protein or sodium
#[derive(Debug, Clone)]
pub struct Nutrient {
    record: Record,
}

impl Nutrient {
    pub fn name(&self) -> String {
        self.record.data().get_as(nutrient::NAME).unwrap_or_default()
    }

    pub fn unit(&self) -> String {
        self.record.data().get_as(nutrient::UNIT).unwrap_or_default()
    }
}

impl Entity for Nutrient {
    fn table() -> &'static Table {
        nutrient::table()
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(Self { record })
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn into_record(self) -> Record {
        self.record
    }
}

impl PartialEq for Nutrient {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

/// Amount of one nutrient in 100 g of one food
#[derive(Debug, Clone)]
pub struct NutrientValue {
    record: Record,
}

impl NutrientValue {
    pub fn food_id(&self) -> i64 {
        self.record.data().get_as(nutrient_value::FOOD_ID).unwrap_or(crate::NO_ID)
    }

    pub fn nutrient_id(&self) -> i64 {
        self.record.data().get_as(nutrient_value::NUTRIENT_ID).unwrap_or(crate::NO_ID)
    }

    pub fn amount(&self) -> f64 {
        self.record.data().get_as(nutrient_value::AMOUNT).unwrap_or(0.0)
    }
}

impl Entity for NutrientValue {
    fn table() -> &'static Table {
        nutrient_value::table()
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(Self { record })
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn into_record(self) -> Record {
        self.record
    }
}

impl PartialEq for NutrientValue {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}
