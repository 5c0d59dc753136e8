//! Brew Batch Calculator
//!
//! Scales brewing recipes to the kettle they are actually brewed in.

mod calculator;
mod db;
mod extract;
mod models;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::calculator::BatchPlan;

#[derive(Parser)]
#[command(name = "brew-calculator")]
#[command(about = "Batch scaling calculator for all-grain beer brewing")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "brew_recipes.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import recipe JSON files from a directory
    Import {
        /// Path to a directory of recipe files
        source_dir: PathBuf,

        /// Clear existing recipes before importing
        #[arg(long)]
        clear: bool,
    },

    /// Scale a stored recipe to a kettle
    Scale {
        /// Recipe name (e.g. "pale ale")
        recipe: String,

        /// Usable kettle volume, in the recipe's volume unit
        #[arg(short, long)]
        kettle: f64,

        /// Stage whose ingredients displace kettle volume
        #[arg(long, default_value = calculator::DEFAULT_MASH_STAGE)]
        mash_stage: String,

        /// Also report the ratio for a different kettle volume
        #[arg(long)]
        what_if_kettle: Option<f64>,

        /// Show the full scaled ingredient tree
        #[arg(short, long)]
        verbose: bool,
    },

    /// List all recipes in the database
    ListRecipes,

    /// Show a stored recipe at its native batch size
    Show {
        /// Recipe name
        name: String,
    },

    /// Initialize empty database with schema
    Init,

    /// Load sample recipes for testing (without recipe files)
    LoadSample,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Import { source_dir, clear } => {
            if clear {
                println!("Clearing existing recipes...");
                db::clear_recipes(&conn)?;
            }

            let stats = extract::import_to_database(&conn, &source_dir)?;
            println!("\n{}", stats);
        }

        Commands::Scale {
            recipe,
            kettle,
            mash_stage,
            what_if_kettle,
            verbose,
        } => {
            if let Some(stored) = db::get_recipe(&conn, &recipe)? {
                let plan = BatchPlan::for_recipe(&stored, kettle, &mash_stage)?;

                if verbose {
                    println!("Scaled ingredients:\n");
                    let scaled = plan.scaled_ingredients(plan.ratio());
                    println!("{}", calculator::format_stages(&scaled, 0));
                }

                let summary = calculator::summarize_batch(&plan, &stored.name);
                println!("{}", summary);

                if let Some(other_kettle) = what_if_kettle {
                    let ratio = plan.ratio_with(None, Some(other_kettle), None)?;
                    println!(
                        "With a {:.1} kettle the ratio would be {:.4}",
                        other_kettle, ratio
                    );
                }
            } else {
                println!(
                    "Recipe '{}' not found. Run 'import' or 'load-sample' first.",
                    recipe
                );
            }
        }

        Commands::ListRecipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<30} {:>12} {:>16}", "Recipe", "Beer vol", "Sparging water");
                println!("{}", "-".repeat(60));
                for (name, beer_volume, sparging_volume) in recipes {
                    println!("{:<30} {:>12.1} {:>16.1}", name, beer_volume, sparging_volume);
                }
            }
        }

        Commands::Show { name } => {
            if let Some(recipe) = db::get_recipe(&conn, &name)? {
                println!("Recipe: {}", recipe.name);
                println!("  Resulting beer volume: {:.1}", recipe.resulting_beer_volume);
                println!("  Sparging water volume: {:.1}", recipe.sparging_water_volume);
                println!("  Ingredients:");
                print!("{}", calculator::format_stages(&recipe.ingredients, 2));
            } else {
                println!("Recipe '{}' not found", name);
            }
        }

        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample recipes loaded successfully!");
        }
    }

    Ok(())
}

/// Load sample recipes for testing without recipe files
fn load_sample_data(conn: &Connection) -> Result<()> {
    use std::collections::BTreeMap;

    use crate::models::{InfoMap, Ingredient, Recipe, Stage, StageMap};

    // Pale ale: flat mash, nested hop phase with grouped boil additions
    let mut mash_info = InfoMap::new();
    mash_info.insert("temperature".to_string(), "67C".to_string());
    mash_info.insert("duration".to_string(), "60 min".to_string());

    let mut boil_groups = BTreeMap::new();
    boil_groups.insert(
        "60 min".to_string(),
        vec![Ingredient::new("Magnum", "Hops", 30.0)],
    );
    boil_groups.insert(
        "10 min".to_string(),
        vec![Ingredient::new("Citra", "Hops", 50.0)],
    );

    let mut boil_info = InfoMap::new();
    boil_info.insert("duration".to_string(), "60 min".to_string());

    let mut hop_stages = StageMap::new();
    hop_stages.insert(
        "boil".to_string(),
        Stage::Grouped {
            info: boil_info,
            groups: boil_groups,
        },
    );
    hop_stages.insert(
        "whirlpool".to_string(),
        Stage::flat(vec![Ingredient::new("Citra", "Hops", 80.0)]),
    );

    let mut pale_ale_stages = StageMap::new();
    pale_ale_stages.insert(
        "mashing".to_string(),
        Stage::Flat {
            info: mash_info,
            ingredients: vec![
                Ingredient::new("Malt", "Malt", 4420.0),
                Ingredient::new("dextrin", "Malt", 370.0),
            ],
        },
    );
    pale_ale_stages.insert(
        "hops".to_string(),
        Stage::Nested {
            info: InfoMap::new(),
            stages: hop_stages,
        },
    );
    pale_ale_stages.insert(
        "fermentation".to_string(),
        Stage::flat(vec![Ingredient::new("US-05", "Yeast", 11.5)]),
    );

    let pale_ale = Recipe {
        name: "pale ale".to_string(),
        resulting_beer_volume: 23830.0,
        sparging_water_volume: 5870.0,
        ingredients: pale_ale_stages,
    };
    db::upsert_recipe(conn, &pale_ale)?;

    // Bohemian lager: flat stages only
    let mut lager_mash_info = InfoMap::new();
    lager_mash_info.insert("temperature".to_string(), "63C".to_string());

    let mut lager_stages = StageMap::new();
    lager_stages.insert(
        "mashing".to_string(),
        Stage::Flat {
            info: lager_mash_info,
            ingredients: vec![
                Ingredient::new("Pilsner malt", "Malt", 4000.0),
                Ingredient::new("CaraPils", "Malt", 250.0),
            ],
        },
    );
    lager_stages.insert(
        "boil".to_string(),
        Stage::flat(vec![Ingredient::new("Saaz", "Hops", 90.0)]),
    );
    lager_stages.insert(
        "fermentation".to_string(),
        Stage::flat(vec![Ingredient::new("W-34/70", "Yeast", 23.0)]),
    );

    let lager = Recipe {
        name: "bohemian lager".to_string(),
        resulting_beer_volume: 22000.0,
        sparging_water_volume: 6200.0,
        ingredients: lager_stages,
    };
    db::upsert_recipe(conn, &lager)?;

    println!("Loaded {} sample recipes", 2);
    Ok(())
}
