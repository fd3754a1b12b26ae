//! Named serving sizes of a food

use super::{Entity, Record};
use crate::schema::{serving, Table};
use crate::Result;

/// A serving size such as "1 cup = 80 g"
#[derive(Debug, Clone)]
pub struct Serving {
    record: Record,
}

impl Serving {
    pub fn food_id(&self) -> i64 {
        self.record.data().get_as(serving::FOOD_ID).unwrap_or(crate::NO_ID)
    }

    pub fn name(&self) -> String {
        self.record.data().get_as(serving::NAME).unwrap_or_default()
    }

    pub fn quantity(&self) -> f64 {
        self.record.data().get_as(serving::QUANTITY).unwrap_or(0.0)
    }

    pub fn unit(&self) -> String {
        self.record.data().get_as(serving::UNIT).unwrap_or_default()
    }

    pub fn is_default(&self) -> bool {
        self.record.data().get_as(serving::IS_DEFAULT).unwrap_or(false)
    }
}

impl Entity for Serving {
    fn table() -> &'static Table {
        serving::table()
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

impl PartialEq for Serving {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}
