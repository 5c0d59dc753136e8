//! Database schema and operations

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use rusqlite::Connection;

use crate::models::{InfoMap, Ingredient, Recipe, Stage, StageMap};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Stored recipes at their native batch size
        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            resulting_beer_volume REAL NOT NULL,
            sparging_water_volume REAL NOT NULL
        );

        -- Stage tree, one row per stage, parent_id NULL for top-level stages
        CREATE TABLE IF NOT EXISTS stages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_name TEXT NOT NULL,
            parent_id INTEGER,
            name TEXT NOT NULL,
            shape TEXT NOT NULL
        );

        -- Descriptive stage metadata (temperature, duration, ...)
        CREATE TABLE IF NOT EXISTS stage_info (
            stage_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (stage_id, key)
        );

        -- Ingredient leaves; group_label set only for grouped stages
        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stage_id INTEGER NOT NULL,
            group_label TEXT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount REAL NOT NULL,
            unit TEXT,
            position INTEGER NOT NULL
        );

        -- Create indexes for common lookups
        CREATE INDEX IF NOT EXISTS idx_stages_recipe ON stages(recipe_name);
        CREATE INDEX IF NOT EXISTS idx_ingredients_stage ON ingredients(stage_id);
        "#,
    )?;
    Ok(())
}

/// Insert or replace a recipe, including its whole stage tree
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    delete_recipe(conn, &recipe.name)?;

    conn.execute(
        "INSERT INTO recipes (name, resulting_beer_volume, sparging_water_volume)
         VALUES (?1, ?2, ?3)",
        (
            &recipe.name,
            recipe.resulting_beer_volume,
            recipe.sparging_water_volume,
        ),
    )?;

    insert_stages(conn, &recipe.name, None, &recipe.ingredients)?;
    Ok(())
}

/// Remove a recipe and all of its stage and ingredient rows
pub fn delete_recipe(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM stage_info WHERE stage_id IN (SELECT id FROM stages WHERE recipe_name = ?1)",
        [name],
    )?;
    conn.execute(
        "DELETE FROM ingredients WHERE stage_id IN (SELECT id FROM stages WHERE recipe_name = ?1)",
        [name],
    )?;
    conn.execute("DELETE FROM stages WHERE recipe_name = ?1", [name])?;
    conn.execute("DELETE FROM recipes WHERE name = ?1", [name])?;
    Ok(())
}

fn insert_stages(
    conn: &Connection,
    recipe_name: &str,
    parent_id: Option<i64>,
    stages: &StageMap,
) -> Result<()> {
    for (name, stage) in stages {
        let shape = match stage {
            Stage::Flat { .. } => "flat",
            Stage::Grouped { .. } => "grouped",
            Stage::Nested { .. } => "nested",
        };

        conn.execute(
            "INSERT INTO stages (recipe_name, parent_id, name, shape)
             VALUES (?1, ?2, ?3, ?4)",
            (recipe_name, parent_id, name, shape),
        )?;
        let stage_id = conn.last_insert_rowid();

        for (key, value) in stage.info() {
            conn.execute(
                "INSERT INTO stage_info (stage_id, key, value) VALUES (?1, ?2, ?3)",
                (stage_id, key, value),
            )?;
        }

        match stage {
            Stage::Flat { ingredients, .. } => {
                insert_leaves(conn, stage_id, None, ingredients)?;
            }
            Stage::Grouped { groups, .. } => {
                for (label, leaves) in groups {
                    insert_leaves(conn, stage_id, Some(label.as_str()), leaves)?;
                }
            }
            Stage::Nested { stages, .. } => {
                insert_stages(conn, recipe_name, Some(stage_id), stages)?;
            }
        }
    }
    Ok(())
}

fn insert_leaves(
    conn: &Connection,
    stage_id: i64,
    group_label: Option<&str>,
    leaves: &[Ingredient],
) -> Result<()> {
    for (position, leaf) in leaves.iter().enumerate() {
        conn.execute(
            "INSERT INTO ingredients (stage_id, group_label, name, kind, amount, unit, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                stage_id,
                group_label,
                &leaf.name,
                &leaf.kind,
                leaf.amount,
                &leaf.unit,
                position as i64,
            ),
        )?;
    }
    Ok(())
}

/// Load a recipe and rebuild its stage tree
pub fn get_recipe(conn: &Connection, name: &str) -> Result<Option<Recipe>> {
    let mut stmt = conn.prepare(
        "SELECT resulting_beer_volume, sparging_water_volume FROM recipes WHERE name = ?1",
    )?;
    let mut rows = stmt.query([name])?;

    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let resulting_beer_volume: f64 = row.get(0)?;
    let sparging_water_volume: f64 = row.get(1)?;

    let ingredients = load_stages(conn, name, None)?;

    Ok(Some(Recipe {
        name: name.to_string(),
        resulting_beer_volume,
        sparging_water_volume,
        ingredients,
    }))
}

fn load_stages(conn: &Connection, recipe_name: &str, parent_id: Option<i64>) -> Result<StageMap> {
    let mut stmt = conn.prepare(
        "SELECT id, name, shape FROM stages
         WHERE recipe_name = ?1 AND parent_id IS ?2
         ORDER BY id",
    )?;

    let rows = stmt.query_map((recipe_name, parent_id), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut stage_rows = Vec::new();
    for row in rows {
        stage_rows.push(row?);
    }

    let mut stages = StageMap::new();
    for (stage_id, name, shape) in stage_rows {
        let info = load_info(conn, stage_id)?;

        let stage = match shape.as_str() {
            "flat" => Stage::Flat {
                info,
                ingredients: load_leaves(conn, stage_id)?,
            },
            "grouped" => Stage::Grouped {
                info,
                groups: load_groups(conn, stage_id)?,
            },
            "nested" => Stage::Nested {
                info,
                stages: load_stages(conn, recipe_name, Some(stage_id))?,
            },
            other => return Err(anyhow!("unknown stage shape '{}' in database", other)),
        };

        stages.insert(name, stage);
    }
    Ok(stages)
}

fn load_info(conn: &Connection, stage_id: i64) -> Result<InfoMap> {
    let mut stmt = conn.prepare("SELECT key, value FROM stage_info WHERE stage_id = ?1")?;
    let rows = stmt.query_map([stage_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut info = InfoMap::new();
    for row in rows {
        let (key, value): (String, String) = row?;
        info.insert(key, value);
    }
    Ok(info)
}

fn load_leaves(conn: &Connection, stage_id: i64) -> Result<Vec<Ingredient>> {
    let mut stmt = conn.prepare(
        "SELECT name, kind, amount, unit FROM ingredients
         WHERE stage_id = ?1 AND group_label IS NULL
         ORDER BY position",
    )?;

    let rows = stmt.query_map([stage_id], |row| {
        Ok(Ingredient {
            name: row.get(0)?,
            kind: row.get(1)?,
            amount: row.get(2)?,
            unit: row.get(3)?,
        })
    })?;

    let mut leaves = Vec::new();
    for row in rows {
        leaves.push(row?);
    }
    Ok(leaves)
}

fn load_groups(conn: &Connection, stage_id: i64) -> Result<BTreeMap<String, Vec<Ingredient>>> {
    let mut stmt = conn.prepare(
        "SELECT group_label, name, kind, amount, unit FROM ingredients
         WHERE stage_id = ?1 AND group_label IS NOT NULL
         ORDER BY group_label, position",
    )?;

    let rows = stmt.query_map([stage_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            Ingredient {
                name: row.get(1)?,
                kind: row.get(2)?,
                amount: row.get(3)?,
                unit: row.get(4)?,
            },
        ))
    })?;

    let mut groups: BTreeMap<String, Vec<Ingredient>> = BTreeMap::new();
    for row in rows {
        let (label, leaf) = row?;
        groups.entry(label).or_default().push(leaf);
    }
    Ok(groups)
}

/// List all stored recipes with their native volumes
pub fn list_recipes(conn: &Connection) -> Result<Vec<(String, f64, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT name, resulting_beer_volume, sparging_water_volume FROM recipes ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Clear all stored recipes (for re-import)
pub fn clear_recipes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM ingredients;
        DELETE FROM stage_info;
        DELETE FROM stages;
        DELETE FROM recipes;
        "#,
    )?;
    Ok(())
}
