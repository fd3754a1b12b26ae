use crate::cache::CacheStats;
use crate::entity::{Entity, Food, HasNutrientData, Meal, Nutrient};
use crate::storage::DbStats;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: impl ToString) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Foods", stats.foods);
    builder.add_row("Servings", stats.servings);
    builder.add_row("Nutrients", stats.nutrients);
    builder.add_row("Nutrient values", stats.nutrient_values);
    builder.add_row("Ingredients", stats.ingredients);
    builder.add_row("Meals", stats.meals);
    builder.add_row("Portions", stats.portions);
    builder.build()
}

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Cache")]
    kind: &'static str,
    #[tabled(rename = "Hits")]
    hits: usize,
    #[tabled(rename = "Misses")]
    misses: usize,
    #[tabled(rename = "Fetches")]
    fetches: usize,
}

pub fn cache_table(caches: &[(&'static str, CacheStats)]) -> String {
    let rows: Vec<CacheRow> = caches
        .iter()
        .map(|(kind, s)| CacheRow {
            kind: *kind,
            hits: s.hits,
            misses: s.misses,
            fetches: s.fetches,
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct FoodRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Index name")]
    index_name: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Relevance")]
    relevance: String,
}

pub fn foods_table(foods: &[Arc<Food>]) -> String {
    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id().unwrap_or(crate::NO_ID),
            index_name: f.index_name(),
            name: f.display_name(),
            kind: f.kind().to_string(),
            relevance: f.search_relevance().to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct AmountRow {
    #[tabled(rename = "Nutrient")]
    name: String,
    #[tabled(rename = "Amount")]
    amount: String,
}

fn amount_rows(nutrients: &[Nutrient], amount_of: impl Fn(i64) -> Option<f64>) -> Vec<AmountRow> {
    nutrients
        .iter()
        .filter_map(|n| {
            let amount = amount_of(n.id()?)?;
            Some(AmountRow {
                name: n.name(),
                amount: format!("{:.2} {}", amount, n.unit()),
            })
        })
        .collect()
}

/// Amounts per 100 g for every nutrient the food has data for
pub fn nutrients_table(food: &Food, nutrients: &[Nutrient]) -> String {
    let rows = amount_rows(nutrients, |id| food.amount_per_100g(id));
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Nutrient totals over a meal's portions
pub fn meal_table(meal: &Meal, nutrients: &[Nutrient]) -> String {
    let rows = amount_rows(nutrients, |id| {
        let total = meal.nutrient_total(id);
        (total > 0.0).then_some(total)
    });
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}
