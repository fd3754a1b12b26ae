//! Larder CLI - browse and move nutrition data in a SQLite store

use clap::{Parser, Subcommand, ValueEnum};
use larder::cache::DataSource;
use larder::config::{self, LarderConfig};
use larder::entity::{Entity, Food, HasNutrientData};
use larder::io::json;
use larder::query::SearchRelevance;
use larder::storage::Database;
use larder::ui::{self, Icons};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "larder")]
#[command(version = "0.1.0")]
#[command(about = "Typed persistence for nutrition data")]
#[command(long_about = r#"
Larder keeps foods, nutrients and meals in a local SQLite store:
  • Tiered keyword search over foods
  • Nutrient totals for composite foods and meals
  • JSON import/export keyed by natural names

Example usage:
  larder init
  larder import --file foods.json
  larder search oat milk --all
  larder show porridge
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file (overrides larder.toml)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write larder.toml and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Search foods by keyword
    Search {
        /// Keywords to look for
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Require every keyword to match
        #[arg(long)]
        all: bool,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Least relevant bucket to include (hidden, low, normal, high)
        #[arg(long)]
        min_relevance: Option<SearchRelevance>,
    },

    /// Show a food by index name or id
    Show {
        /// Index name or numeric id
        food: String,
    },

    /// List meals with nutrient totals
    Meals {
        /// Only meals on this day
        #[arg(short, long)]
        day: Option<String>,
    },

    /// Import foods and nutrients from a JSON document
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export foods and nutrients to a JSON document
    Export {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show statistics about the store and its caches
    Stats,

    /// Delete every food, nutrient and meal in the store
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Serialize)]
struct FoodSummary {
    id: i64,
    index_name: String,
    name: String,
    kind: String,
    relevance: SearchRelevance,
}

impl From<&Food> for FoodSummary {
    fn from(food: &Food) -> Self {
        Self {
            id: food.id().unwrap_or(larder::NO_ID),
            index_name: food.index_name(),
            name: food.display_name(),
            kind: food.kind().to_string(),
            relevance: food.search_relevance(),
        }
    }
}

#[derive(Serialize)]
struct FoodDetail {
    #[serde(flatten)]
    summary: FoodSummary,
    servings: Vec<String>,
    ingredients: Vec<String>,
    /// Amount per 100 g, keyed by nutrient name
    nutrients: BTreeMap<String, f64>,
}

#[derive(Serialize)]
struct MealSummary {
    id: i64,
    name: String,
    day: String,
    portions: usize,
    totals: BTreeMap<String, f64>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = config::load_config(Some(&config_path))?.unwrap_or_default();
    let db = cli.db.as_deref();
    let as_json = cli.format == Format::Json;

    match cli.command {
        Commands::Init { force } => {
            init(&config_path, db, force)?;
        }

        Commands::Search { keywords, all, limit, min_relevance } => {
            let mut ds = open_source(&config, db)?;
            let limit = limit.or(config.search_limit);
            let min_relevance = min_relevance
                .or(config.min_relevance)
                .unwrap_or(SearchRelevance::Low);
            let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();
            tracing::debug!(?keywords, all, ?limit, %min_relevance, "searching foods");

            let foods = match keywords.as_slice() {
                [single] => ds.search_foods(single, limit, min_relevance)?,
                many => ds.search_foods_multi(many, all, limit, min_relevance)?,
            };

            if as_json {
                let out: Vec<FoodSummary> = foods.iter().map(|f| FoodSummary::from(f.as_ref())).collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if foods.is_empty() {
                println!("{} No foods found.", Icons::CROSS);
            } else {
                println!("{} Searching for: '{}'", Icons::SEARCH, keywords.join(" "));
                for food in &foods {
                    ui::food_line(food);
                }
            }
        }

        Commands::Show { food } => {
            let mut ds = open_source(&config, db)?;
            let found = match food.parse::<i64>() {
                Ok(id) => ds.get_food(id)?,
                Err(_) => ds.get_food_by_index_name(&food)?,
            };
            let Some(found) = found else {
                anyhow::bail!("no food named {}", food);
            };
            let nutrients = ds.get_all_nutrients()?;

            if as_json {
                let detail = FoodDetail {
                    summary: FoodSummary::from(found.as_ref()),
                    servings: found
                        .servings()
                        .iter()
                        .map(|s| format!("{} ({} {})", s.name(), s.quantity(), s.unit()))
                        .collect(),
                    ingredients: ingredient_lines(&found),
                    nutrients: nutrients
                        .iter()
                        .filter_map(|n| Some((n.name(), found.amount_per_100g(n.id()?)?)))
                        .collect(),
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                ui::food_line(&found);
                if let Some(notes) = found.notes() {
                    println!("  {}", ui::dim(&notes));
                }
                if !found.servings().is_empty() {
                    ui::section("Servings");
                    for s in found.servings() {
                        let marker = if s.is_default() { " *" } else { "" };
                        ui::summary_row(&s.name(), &format!("{} {}{}", s.quantity(), s.unit(), marker));
                    }
                }
                if found.is_composite() {
                    ui::section("Ingredients");
                    for line in ingredient_lines(&found) {
                        println!("  {} {}", Icons::LINK, line);
                    }
                }
                ui::section("Per 100 g");
                let table = ui::nutrients_table(&found, &nutrients);
                if table.is_empty() {
                    println!("  {}", ui::muted("no nutrient data"));
                } else {
                    println!("{}", table);
                }
            }
        }

        Commands::Meals { day } => {
            let mut ds = open_source(&config, db)?;
            let meals = ds.get_all_meals()?;
            let meals: Vec<_> = meals
                .into_iter()
                .filter(|m| day.as_deref().is_none_or(|d| m.day() == d))
                .collect();
            let nutrients = ds.get_all_nutrients()?;

            if as_json {
                let out: Vec<MealSummary> = meals
                    .iter()
                    .map(|m| MealSummary {
                        id: m.id().unwrap_or(larder::NO_ID),
                        name: m.name(),
                        day: m.day(),
                        portions: m.portions().len(),
                        totals: nutrients
                            .iter()
                            .filter_map(|n| Some((n.name(), m.nutrient_total(n.id()?))))
                            .filter(|(_, total)| *total > 0.0)
                            .collect(),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if meals.is_empty() {
                println!("{} No meals found.", Icons::CROSS);
            } else {
                for meal in &meals {
                    ui::section(&format!("{} {} {}", Icons::MEAL, meal.day(), meal.name()));
                    for p in meal.portions() {
                        let name = p
                            .food()
                            .map(|f| f.display_name())
                            .unwrap_or_else(|| format!("food #{}", p.food_id()));
                        ui::summary_row(&format!("{} {}g", Icons::SCALE, p.quantity()), &name);
                    }
                    let table = ui::meal_table(meal, &nutrients);
                    if !table.is_empty() {
                        println!("{}", table);
                    }
                }
            }
        }

        Commands::Import { file } => {
            let mut ds = open_source(&config, db)?;
            tracing::info!("Importing {}", file.display());
            let doc = json::read_document(&file)?;
            let stats = json::import(&mut ds, &doc)?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats);
                if stats.skipped > 0 {
                    ui::warn(&format!("{} existing foods or nutrients left untouched", stats.skipped));
                }
                ui::success("Import complete");
            }
        }

        Commands::Export { file } => {
            let mut ds = open_source(&config, db)?;
            let doc = json::export(&mut ds)?;
            json::write_document(&file, &doc)?;
            if as_json {
                println!("{}", serde_json::json!({ "foods": doc.foods.len(), "nutrients": doc.nutrients.len() }));
            } else {
                ui::status(Icons::PACKAGE, "Foods", &doc.foods.len().to_string());
                ui::status(Icons::PACKAGE, "Nutrients", &doc.nutrients.len().to_string());
                ui::info("Written", &file.display().to_string());
                ui::success("Export complete");
            }
        }

        Commands::Stats => {
            let ds = open_source(&config, db)?;
            let stats = ds.stats()?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{} Larder Statistics", Icons::STATS);
                println!("{}", ui::stats_table(&stats));
                if cli.verbose {
                    ui::section("Foods by type");
                    for (kind, n) in ds.food_counts_by_type()? {
                        ui::summary_row(&kind, &n.to_string());
                    }
                    println!(
                        "{}",
                        ui::cache_table(&[("foods", ds.food_cache_stats()), ("meals", ds.meal_cache_stats())])
                    );
                }
            }
        }

        Commands::Reset { yes } => {
            if !yes {
                ui::warn("This deletes all stored data. Re-run with --yes to confirm.");
                return Ok(());
            }
            let mut ds = open_source(&config, db)?;
            let before = ds.stats()?;
            ds.clear_all()?;
            if as_json {
                println!("{}", serde_json::json!({ "cleared": before }));
            } else {
                ui::status(Icons::PACKAGE, "Foods removed", &before.foods.to_string());
                ui::status(Icons::PACKAGE, "Meals removed", &before.meals.to_string());
                ui::success("Store cleared");
            }
        }
    }

    Ok(())
}

fn init(config_path: &Path, db: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let root = std::env::current_dir()?;
    let db_path = db
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::default_database_path_in(Path::new(".")));

    ui::header("Initializing larder");
    let config = LarderConfig {
        database: Some(db_path.to_string_lossy().to_string()),
        in_clause_limit: Some(larder::storage::DEFAULT_IN_CLAUSE_LIMIT),
        search_limit: Some(20),
        min_relevance: Some(SearchRelevance::Low),
    };
    config::write_config(config_path, &config, force)?;
    config::ensure_db_dir(&db_path)?;
    config::ensure_gitignore(&root)?;
    Database::open(&db_path)?;

    ui::status(Icons::GEAR, "Config", &config_path.display().to_string());
    ui::status(Icons::DATABASE, "Database", &db_path.display().to_string());
    ui::success("Ready");
    Ok(())
}

fn open_source(config: &LarderConfig, db: Option<&Path>) -> anyhow::Result<DataSource> {
    let db_path = match (db, config.database.as_deref()) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => PathBuf::from(path),
        (None, None) => config::default_database_path_in(Path::new(".")),
    };
    config::ensure_db_dir(&db_path)?;
    tracing::debug!("Opening {}", db_path.display());

    let mut database = Database::open(&db_path)?;
    if let Some(limit) = config.in_clause_limit {
        database = database.with_in_clause_limit(limit);
    }
    Ok(DataSource::new(database))
}

fn ingredient_lines(food: &Arc<Food>) -> Vec<String> {
    food.ingredients()
        .iter()
        .map(|i| {
            let name = i
                .food()
                .map(|f| f.display_name())
                .unwrap_or_else(|| format!("food #{}", i.food_id()));
            format!("{}g {}", i.quantity(), name)
        })
        .collect()
}
