//! Recipe file loading
//!
//! Parses recipe JSON files into the stage tree the calculator works on.
//! Amounts may be plain numbers or unit-suffixed text like "2kg"; the unit is
//! split off and kept as metadata, never converted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::db;
use crate::models::{InfoMap, Ingredient, Recipe, RecipeError, Stage, StageMap};

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z]*)\s*$").expect("amount pattern")
});

/// On-disk recipe layout before the ingredient tree is shaped
#[derive(Debug, Deserialize)]
struct RawRecipe {
    name: String,
    resulting_beer_volume: f64,
    sparging_water_volume: f64,
    ingredients: Value,
}

/// Load a single recipe file
pub fn load_recipe_file(path: &Path) -> Result<Recipe> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let raw: RawRecipe = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let ingredients = stages_from_value(&raw.ingredients)?;

    Ok(Recipe {
        name: raw.name,
        resulting_beer_volume: raw.resulting_beer_volume,
        sparging_water_volume: raw.sparging_water_volume,
        ingredients,
    })
}

/// Shape the raw ingredient mapping into the closed stage tree
pub fn stages_from_value(value: &Value) -> Result<StageMap, RecipeError> {
    let mut path = Vec::new();
    stages_at(value, &mut path)
}

fn stages_at(value: &Value, path: &mut Vec<String>) -> Result<StageMap, RecipeError> {
    let Some(map) = value.as_object() else {
        return Err(malformed(path, "ingredients must be a mapping of stages"));
    };

    let mut stages = StageMap::new();
    for (name, stage_value) in map {
        path.push(name.clone());
        let stage = stage_from_value(stage_value, path)?;
        path.pop();
        stages.insert(name.clone(), stage);
    }
    Ok(stages)
}

/// Discriminate a stage's shape.
///
/// In order: an "ingredients" array makes it flat, an "ingredients" mapping of
/// leaf lists makes it grouped, otherwise every non-info entry must itself be
/// a stage and the result is nested.
fn stage_from_value(value: &Value, path: &mut Vec<String>) -> Result<Stage, RecipeError> {
    let Some(map) = value.as_object() else {
        return Err(malformed(path, "stage must be a mapping"));
    };

    let info = match map.get("info") {
        Some(info_value) => info_from_value(info_value, path)?,
        None => InfoMap::new(),
    };

    if let Some(ingredients_value) = map.get("ingredients") {
        match ingredients_value {
            Value::Array(_) => {
                let ingredients = leaves_from_value(ingredients_value, path)?;
                return Ok(Stage::Flat { info, ingredients });
            }
            Value::Object(groups_map) => {
                let mut groups = std::collections::BTreeMap::new();
                for (label, leaves_value) in groups_map {
                    path.push(label.clone());
                    let leaves = leaves_from_value(leaves_value, path)?;
                    path.pop();
                    groups.insert(label.clone(), leaves);
                }
                return Ok(Stage::Grouped { info, groups });
            }
            _ => return Err(malformed(path, "'ingredients' must be a list or a mapping")),
        }
    }

    // No direct ingredients: every remaining entry must be a sub-stage
    let mut stages = StageMap::new();
    for (name, sub_value) in map {
        if name == "info" {
            continue;
        }
        path.push(name.clone());
        let stage = stage_from_value(sub_value, path)?;
        path.pop();
        stages.insert(name.clone(), stage);
    }

    if stages.is_empty() {
        return Err(malformed(path, "stage has no ingredients or sub-stages"));
    }
    Ok(Stage::Nested { info, stages })
}

fn info_from_value(value: &Value, path: &[String]) -> Result<InfoMap, RecipeError> {
    let Some(map) = value.as_object() else {
        return Err(malformed(path, "'info' must be a mapping"));
    };

    let mut info = InfoMap::new();
    for (key, entry) in map {
        let text = match entry {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(malformed(path, "'info' values must be scalars")),
        };
        info.insert(key.clone(), text);
    }
    Ok(info)
}

fn leaves_from_value(value: &Value, path: &[String]) -> Result<Vec<Ingredient>, RecipeError> {
    let Some(entries) = value.as_array() else {
        return Err(malformed(path, "ingredient list must be an array"));
    };

    let mut leaves = Vec::new();
    for entry in entries {
        let Some(map) = entry.as_object() else {
            return Err(malformed(path, "ingredient must be a mapping"));
        };

        let name = match map.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => return Err(malformed(path, "ingredient is missing 'name'")),
        };

        let Some(amount_value) = map.get("amount") else {
            return Err(malformed(path, &format!("ingredient '{}' is missing 'amount'", name)));
        };
        let (amount, unit) = parse_amount(amount_value, path, &name)?;

        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        leaves.push(Ingredient {
            name,
            kind,
            amount,
            unit,
        });
    }
    Ok(leaves)
}

/// Normalize an amount into (value, unit).
///
/// Accepts a plain non-negative number, or text like "2kg" / "50 g" whose
/// numeric part and unit suffix are split apart.
fn parse_amount(
    value: &Value,
    path: &[String],
    name: &str,
) -> Result<(f64, Option<String>), RecipeError> {
    match value {
        Value::Number(n) => {
            let amount = n.as_f64().unwrap_or(f64::NAN);
            if !amount.is_finite() || amount < 0.0 {
                return Err(malformed(
                    path,
                    &format!("amount of '{}' must be non-negative", name),
                ));
            }
            Ok((amount, None))
        }
        Value::String(text) => {
            let Some(cap) = AMOUNT_RE.captures(text) else {
                return Err(malformed(
                    path,
                    &format!("unparseable amount '{}' for '{}'", text, name),
                ));
            };
            let amount: f64 = cap[1]
                .parse()
                .map_err(|_| malformed(path, &format!("unparseable amount '{}' for '{}'", text, name)))?;
            let unit = match &cap[2] {
                "" => None,
                suffix => Some(suffix.to_string()),
            };
            Ok((amount, unit))
        }
        _ => Err(malformed(
            path,
            &format!("amount of '{}' must be a number or unit-suffixed text", name),
        )),
    }
}

fn malformed(path: &[String], reason: &str) -> RecipeError {
    RecipeError::MalformedRecipe {
        path: path.join("/"),
        reason: reason.to_string(),
    }
}

/// Find all recipe files in a directory tree
pub fn find_recipe_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Import all recipe files under a directory into the database
pub fn import_to_database(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    println!("Scanning {} for recipe files...", dir.display());
    let files = find_recipe_files(dir)?;
    println!("Found {} recipe files", files.len());

    for filepath in &files {
        match load_recipe_file(filepath) {
            Ok(recipe) => {
                db::upsert_recipe(conn, &recipe)?;

                let stages = count_stages(&recipe.ingredients);
                let ingredients = count_leaves(&recipe.ingredients);
                stats.recipes += 1;
                stats.stages += stages;
                stats.ingredients += ingredients;

                println!(
                    "  Imported: {} ({} stages, {} ingredients)",
                    recipe.name, stages, ingredients
                );
            }
            Err(e) => {
                eprintln!("  Error loading {}: {:#}", filepath.display(), e);
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

fn count_stages(stages: &StageMap) -> usize {
    stages
        .values()
        .map(|stage| match stage {
            Stage::Nested { stages, .. } => 1 + count_stages(stages),
            _ => 1,
        })
        .sum()
}

fn count_leaves(stages: &StageMap) -> usize {
    stages
        .values()
        .map(|stage| match stage {
            Stage::Flat { ingredients, .. } => ingredients.len(),
            Stage::Grouped { groups, .. } => groups.values().map(Vec::len).sum(),
            Stage::Nested { stages, .. } => count_leaves(stages),
        })
        .sum()
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub recipes: usize,
    pub stages: usize,
    pub ingredients: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} recipes ({} stages, {} ingredients). Errors: {}",
            self.recipes, self.stages, self.ingredients, self.errors
        )
    }
}
