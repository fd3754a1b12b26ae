//! JSON import and export
//!
//! Foods are written with their servings, nutrient amounts and ingredients
//! keyed by natural keys (food index names, nutrient names) so a document
//! can be loaded into a different database. Imported rows are built as
//! `Import` entities and their references resolved by natural key.

use crate::cache::DataSource;
use crate::entity::{Entity, Food, Ingredient, Nutrient, NutrientValue, ObjectSource, Serving};
use crate::row::RowData;
use crate::schema::{food, ingredient, nutrient, nutrient_value, serving, CREATE_TIME, ID, MODIFY_TIME};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

const RESERVED: [&str; 3] = [ID, CREATE_TIME, MODIFY_TIME];

/// Top-level JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub nutrients: Vec<Map<String, JsonValue>>,
    #[serde(default)]
    pub foods: Vec<FoodEntry>,
}

/// One food with its children
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodEntry {
    /// Food columns other than the reserved ones
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servings: Vec<Map<String, JsonValue>>,
    /// Amount per 100 g, keyed by nutrient name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nutrients: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingredients: Vec<IngredientEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientEntry {
    /// Index name of the ingredient food
    pub food: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    pub nutrients: usize,
    pub foods: usize,
    pub servings: usize,
    pub nutrient_values: usize,
    pub ingredients: usize,
    /// Foods and nutrients already present, left untouched
    pub skipped: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Import Stats:")?;
        writeln!(f, "  Nutrients: {}", self.nutrients)?;
        writeln!(f, "  Foods: {}", self.foods)?;
        writeln!(f, "  Servings: {}", self.servings)?;
        writeln!(f, "  Nutrient values: {}", self.nutrient_values)?;
        writeln!(f, "  Ingredients: {}", self.ingredients)?;
        writeln!(f, "  Skipped: {}", self.skipped)
    }
}

pub fn read_document(path: &Path) -> Result<Document> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn write_document(path: &Path, doc: &Document) -> Result<()> {
    let contents = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Build a document holding every nutrient and food
pub fn export(ds: &mut DataSource) -> Result<Document> {
    let nutrients = ds.get_all_nutrients()?;
    let names: HashMap<i64, String> = nutrients
        .iter()
        .filter_map(|n| n.id().map(|id| (id, n.name())))
        .collect();

    let mut doc = Document {
        nutrients: nutrients
            .iter()
            .map(|n| n.data().to_json_map(&RESERVED))
            .collect::<Result<_>>()?,
        foods: Vec::new(),
    };
    for f in ds.get_all_foods()? {
        doc.foods.push(food_entry(&f, &names)?);
    }
    tracing::info!(foods = doc.foods.len(), nutrients = doc.nutrients.len(), "exported");
    Ok(doc)
}

fn food_entry(f: &Food, nutrient_names: &HashMap<i64, String>) -> Result<FoodEntry> {
    let mut serving_skip = RESERVED.to_vec();
    serving_skip.push(serving::FOOD_ID.name());

    let servings = f
        .servings()
        .iter()
        .map(|s| s.data().to_json_map(&serving_skip))
        .collect::<Result<_>>()?;
    let nutrients = f
        .nutrient_values()
        .iter()
        .map(|v| {
            let name = nutrient_names.get(&v.nutrient_id()).ok_or_else(|| {
                Error::Integrity(format!("{} references unknown nutrient {}", f.index_name(), v.nutrient_id()))
            })?;
            Ok((name.clone(), v.amount()))
        })
        .collect::<Result<_>>()?;
    let ingredients = f
        .ingredients()
        .iter()
        .map(|i| {
            let linked = i.food().ok_or_else(|| {
                Error::Integrity(format!("ingredient {} of {} is not linked", i.food_id(), f.index_name()))
            })?;
            Ok(IngredientEntry {
                food: linked.index_name(),
                quantity: i.quantity(),
                notes: i.notes(),
            })
        })
        .collect::<Result<_>>()?;

    Ok(FoodEntry {
        fields: f.data().to_json_map(&RESERVED)?,
        servings,
        nutrients,
        ingredients,
    })
}

/// Load a document in one batch. Foods and nutrients whose natural key already
/// exists are skipped together with their children. Any failure leaves the
/// store as it was.
pub fn import(ds: &mut DataSource, doc: &Document) -> Result<ImportStats> {
    let stats = ds.atomically(|ds| {
        ds.pause_refreshes();
        let result = import_rows(ds, doc);
        let resumed = ds.resume_refreshes();
        let (mut stats, inserted) = result?;
        resumed?;

        let ingredients = ingredient_rows(ds, doc, &inserted)?;
        for ing in &ingredients {
            ds.save_ingredient(ing)?;
        }
        stats.ingredients = ingredients.len();
        Ok(stats)
    })?;
    tracing::info!(foods = stats.foods, skipped = stats.skipped, "import finished");
    Ok(stats)
}

/// Store nutrients, foods, servings and nutrient values. Returns the index
/// names of the foods inserted.
fn import_rows(ds: &mut DataSource, doc: &Document) -> Result<(ImportStats, HashSet<String>)> {
    let mut stats = ImportStats::default();

    let existing: HashSet<String> = ds.get_all_nutrients()?.iter().map(Nutrient::name).collect();
    let mut nutrients = Vec::new();
    for map in &doc.nutrients {
        let n = Nutrient::construct(RowData::from_json_map(nutrient::table(), map)?, ObjectSource::Import)?;
        if existing.contains(&n.name()) {
            stats.skipped += 1;
        } else {
            nutrients.push(n);
        }
    }
    stats.nutrients = ds.save_nutrients(&nutrients)?.len();

    let mut inserted = HashSet::new();
    for entry in &doc.foods {
        let f = Food::construct(RowData::from_json_map(food::table(), &entry.fields)?, ObjectSource::Import)?;
        if ds.get_food_by_index_name(&f.index_name())?.is_some() {
            tracing::debug!(index_name = %f.index_name(), "food exists, skipping");
            stats.skipped += 1;
            continue;
        }
        ds.save_food(&f)?;
        inserted.insert(f.index_name());
        stats.foods += 1;
    }

    let mut servings = Vec::new();
    let mut values = Vec::new();
    for entry in doc.foods.iter().filter(|e| inserted.contains(&entry_key(e))) {
        let key = entry_key(entry);
        for map in &entry.servings {
            let mut row = RowData::from_json_map(serving::table(), map)?;
            row.set(serving::FOOD_ID, crate::NO_ID)?;
            servings.push(Serving::construct(row, ObjectSource::Import)?.with_pending_fk("food_id", key.as_str())?);
        }
        for (name, amount) in &entry.nutrients {
            let mut row = RowData::new(nutrient_value::table());
            row.set(nutrient_value::FOOD_ID, crate::NO_ID)?;
            row.set(nutrient_value::NUTRIENT_ID, crate::NO_ID)?;
            row.set(nutrient_value::AMOUNT, *amount)?;
            values.push(
                NutrientValue::construct(row, ObjectSource::Import)?
                    .with_pending_fk("food_id", key.as_str())?
                    .with_pending_fk("nutrient_id", name.as_str())?,
            );
        }
    }

    for s in ds.complete_foreign_keys(servings, &["food_id"])? {
        ds.save_serving(&s)?;
        stats.servings += 1;
    }

    let mut by_food: BTreeMap<i64, Vec<NutrientValue>> = BTreeMap::new();
    for v in ds.complete_foreign_keys(values, &["food_id", "nutrient_id"])? {
        by_food.entry(v.food_id()).or_default().push(v);
    }
    for (food_id, values) in &by_food {
        stats.nutrient_values += ds.replace_nutrient_values(*food_id, values)?;
    }
    Ok((stats, inserted))
}

/// Ingredient rows for the inserted foods, resolved by index name
fn ingredient_rows(ds: &DataSource, doc: &Document, inserted: &HashSet<String>) -> Result<Vec<Ingredient>> {
    let mut pending = Vec::new();
    for entry in doc.foods.iter().filter(|e| inserted.contains(&entry_key(e))) {
        let key = entry_key(entry);
        for ing in &entry.ingredients {
            let mut row = RowData::new(ingredient::table());
            row.set(ingredient::COMPOSITE_FOOD_ID, crate::NO_ID)?;
            row.set(ingredient::FOOD_ID, crate::NO_ID)?;
            row.set(ingredient::QUANTITY, ing.quantity)?;
            row.set_opt(ingredient::NOTES, ing.notes.clone())?;
            pending.push(
                Ingredient::construct(row, ObjectSource::Import)?
                    .with_pending_fk("composite_food_id", key.as_str())?
                    .with_pending_fk("food_id", ing.food.as_str())?,
            );
        }
    }
    ds.complete_foreign_keys(pending, &["composite_food_id", "food_id"])
}

fn entry_key(entry: &FoodEntry) -> String {
    entry
        .fields
        .get(food::INDEX_NAME.name())
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::HasNutrientData;
    use crate::storage::Database;

    const SAMPLE: &str = r#"{
        "nutrients": [{"name": "protein", "unit": "g"}, {"name": "fat"}],
        "foods": [
            {
                "index_name": "oats",
                "name": "Rolled Oats",
                "servings": [{"name": "cup", "quantity": 80, "is_default": true}],
                "nutrients": {"protein": 13.0, "fat": 7.0}
            },
            {
                "index_name": "milk",
                "name": "Milk",
                "nutrients": {"protein": 3.0}
            },
            {
                "index_name": "porridge",
                "name": "Porridge",
                "food_type": "composite",
                "ingredients": [
                    {"food": "oats", "quantity": 50},
                    {"food": "milk", "quantity": 150, "notes": "warm"}
                ]
            }
        ]
    }"#;

    fn data_source() -> DataSource {
        DataSource::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_import_resolves_references() {
        let mut ds = data_source();
        let doc: Document = serde_json::from_str(SAMPLE).unwrap();
        let stats = import(&mut ds, &doc).unwrap();
        assert_eq!(stats.nutrients, 2);
        assert_eq!(stats.foods, 3);
        assert_eq!(stats.servings, 1);
        assert_eq!(stats.nutrient_values, 3);
        assert_eq!(stats.ingredients, 2);

        let oats = ds.get_food_by_index_name("oats").unwrap().unwrap();
        assert!(oats.default_serving().is_some());
        let porridge = ds.get_food_by_index_name("porridge").unwrap().unwrap();
        let protein = ds.get_all_nutrients().unwrap()[0].id().unwrap();
        // (13 * 0.5 + 3 * 1.5) g in 200 g
        assert_eq!(porridge.amount_per_100g(protein), Some(5.5));
    }

    #[test]
    fn test_import_skips_existing() {
        let mut ds = data_source();
        let doc: Document = serde_json::from_str(SAMPLE).unwrap();
        import(&mut ds, &doc).unwrap();
        let again = import(&mut ds, &doc).unwrap();
        assert_eq!(again.foods, 0);
        assert_eq!(again.skipped, 5);
        assert_eq!(ds.stats().unwrap().servings, 1);
    }

    #[test]
    fn test_unknown_ingredient_fails() {
        let mut ds = data_source();
        let doc: Document = serde_json::from_str(
            r#"{"foods": [{"index_name": "stew", "name": "Stew", "food_type": "composite",
                "ingredients": [{"food": "unicorn", "quantity": 10}]}]}"#,
        )
        .unwrap();
        let err = import(&mut ds, &doc).unwrap_err();
        assert!(err.to_string().contains("no parent found"));
    }

    #[test]
    fn test_failed_import_leaves_store_unchanged() {
        let mut ds = data_source();
        let doc: Document = serde_json::from_str(
            r#"{"nutrients": [{"name": "protein"}],
                "foods": [{"index_name": "stew", "name": "Stew", "food_type": "composite",
                    "nutrients": {"protein": 4.0},
                    "ingredients": [{"food": "unicorn", "quantity": 10}]}]}"#,
        )
        .unwrap();
        assert!(import(&mut ds, &doc).is_err());

        let stats = ds.stats().unwrap();
        assert_eq!(
            (stats.foods, stats.nutrients, stats.nutrient_values, stats.ingredients),
            (0, 0, 0, 0)
        );
        assert!(ds.get_food_by_index_name("stew").unwrap().is_none());
        assert!(!ds.is_paused());

        // the same store still accepts a good document afterwards
        let good: Document = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(import(&mut ds, &good).unwrap().foods, 3);
    }

    #[test]
    fn test_export_roundtrip() {
        let mut ds = data_source();
        let doc: Document = serde_json::from_str(SAMPLE).unwrap();
        import(&mut ds, &doc).unwrap();

        let exported = export(&mut ds).unwrap();
        assert_eq!(exported.foods.len(), 3);
        assert!(!exported.foods[0].fields.contains_key("id"));
        assert_eq!(exported.foods[0].nutrients["protein"], 13.0);
        assert_eq!(exported.foods[2].ingredients[1].notes.as_deref(), Some("warm"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foods.json");
        write_document(&path, &exported).unwrap();

        let mut copy = data_source();
        let stats = import(&mut copy, &read_document(&path).unwrap()).unwrap();
        assert_eq!(stats.foods, 3);
        assert_eq!(stats.ingredients, 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut ds = data_source();
        let doc: Document =
            serde_json::from_str(r#"{"foods": [{"index_name": "kale", "name": "Kale", "colour": "green"}]}"#)
                .unwrap();
        assert!(matches!(import(&mut ds, &doc), Err(Error::Schema(_))));
    }
}
