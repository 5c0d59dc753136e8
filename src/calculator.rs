//! Batch ratio and ingredient scaling logic

use crate::models::{Ingredient, Recipe, RecipeError, Stage, StageMap};

/// Top-level stage whose ingredients displace kettle volume, unless overridden
pub const DEFAULT_MASH_STAGE: &str = "mashing";

/// A recipe fitted to a concrete kettle.
///
/// Construction validates all inputs and computes the derived quantities in
/// dependency order: aggregated ingredient volume, the scale ratio, the
/// sparging water at that ratio, and finally the input water. The plan is
/// immutable afterwards; `ratio_with` answers what-if queries without touching
/// the stored values.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    ingredients: StageMap,
    resulting_beer_volume: f64,
    sparging_water_volume: f64,
    kettle_volume: f64,
    ingredient_volume: f64,
    ratio: f64,
    sparging_water_in_ratio: f64,
    input_water: f64,
}

impl BatchPlan {
    pub fn new(
        ingredients: StageMap,
        resulting_beer_volume: f64,
        sparging_water_volume: f64,
        kettle_volume: f64,
    ) -> Result<Self, RecipeError> {
        Self::with_mash_stage(
            ingredients,
            resulting_beer_volume,
            sparging_water_volume,
            kettle_volume,
            DEFAULT_MASH_STAGE,
        )
    }

    pub fn with_mash_stage(
        ingredients: StageMap,
        resulting_beer_volume: f64,
        sparging_water_volume: f64,
        kettle_volume: f64,
        mash_stage: &str,
    ) -> Result<Self, RecipeError> {
        require_positive("resulting_beer_volume", resulting_beer_volume)?;
        require_positive("sparging_water_volume", sparging_water_volume)?;
        require_positive("kettle_volume", kettle_volume)?;
        validate_amounts(&ingredients)?;

        // Derived chain, in dependency order. Input water may come out
        // negative when the ingredients alone overflow the kettle; that is
        // reported as-is, never clamped.
        let ingredient_volume = mash_volume(&ingredients, mash_stage);
        let ratio = (kettle_volume - ingredient_volume) / resulting_beer_volume;
        let sparging_water_in_ratio = sparging_water_volume * ratio;
        let input_water = kettle_volume - ingredient_volume - sparging_water_in_ratio;

        Ok(BatchPlan {
            ingredients,
            resulting_beer_volume,
            sparging_water_volume,
            kettle_volume,
            ingredient_volume,
            ratio,
            sparging_water_in_ratio,
            input_water,
        })
    }

    /// Fit a stored recipe to the given kettle
    pub fn for_recipe(recipe: &Recipe, kettle_volume: f64, mash_stage: &str) -> Result<Self, RecipeError> {
        Self::with_mash_stage(
            recipe.ingredients.clone(),
            recipe.resulting_beer_volume,
            recipe.sparging_water_volume,
            kettle_volume,
            mash_stage,
        )
    }

    /// Scale ratio computed at construction time
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Recompute the ratio with ad-hoc overrides ("what if I had a different
    /// kettle"). A supplied value must be a finite number; a non-positive
    /// value falls back to the stored default, so zero cannot be passed
    /// explicitly. That limitation is accepted in exchange for one method
    /// serving both the construction-time derivation and what-if queries.
    pub fn ratio_with(
        &self,
        resulting_vol: Option<f64>,
        kettle_vol: Option<f64>,
        ingredient_vol: Option<f64>,
    ) -> Result<f64, RecipeError> {
        let resulting = resolve_override("resulting volume", resulting_vol, self.resulting_beer_volume)?;
        let kettle = resolve_override("kettle volume", kettle_vol, self.kettle_volume)?;
        let ingredient = resolve_override("ingredient volume", ingredient_vol, self.ingredient_volume)?;

        if resulting == 0.0 {
            return Err(RecipeError::DivisionUndefined);
        }
        Ok((kettle - ingredient) / resulting)
    }

    /// The ingredient tree with every amount multiplied by `ratio`
    pub fn scaled_ingredients(&self, ratio: f64) -> StageMap {
        scaled_stages(&self.ingredients, ratio)
    }

    pub fn ingredient_volume(&self) -> f64 {
        self.ingredient_volume
    }

    pub fn sparging_water_in_ratio(&self) -> f64 {
        self.sparging_water_in_ratio
    }

    pub fn input_water(&self) -> f64 {
        self.input_water
    }

    pub fn resulting_beer_volume(&self) -> f64 {
        self.resulting_beer_volume
    }

    pub fn sparging_water_volume(&self) -> f64 {
        self.sparging_water_volume
    }

    pub fn kettle_volume(&self) -> f64 {
        self.kettle_volume
    }
}

fn require_positive(field: &str, value: f64) -> Result<(), RecipeError> {
    if !value.is_finite() {
        return Err(RecipeError::Validation(format!("{field} must be a number")));
    }
    if value <= 0.0 {
        return Err(RecipeError::Validation(format!("{field} must be positive")));
    }
    Ok(())
}

fn resolve_override(name: &str, value: Option<f64>, default: f64) -> Result<f64, RecipeError> {
    match value {
        Some(v) if !v.is_finite() => Err(RecipeError::InvalidArgument(format!(
            "{name} override is not a number"
        ))),
        // Non-positive overrides fall back to the stored value
        Some(v) if v > 0.0 => Ok(v),
        _ => Ok(default),
    }
}

/// Reject leaves whose amount is negative or not a number
fn validate_amounts(stages: &StageMap) -> Result<(), RecipeError> {
    let mut path = Vec::new();
    walk_amounts(stages, &mut path)
}

fn walk_amounts(stages: &StageMap, path: &mut Vec<String>) -> Result<(), RecipeError> {
    for (name, stage) in stages {
        path.push(name.clone());
        match stage {
            Stage::Flat { ingredients, .. } => check_leaves(ingredients, path)?,
            Stage::Grouped { groups, .. } => {
                for (label, leaves) in groups {
                    path.push(label.clone());
                    check_leaves(leaves, path)?;
                    path.pop();
                }
            }
            Stage::Nested { stages, .. } => walk_amounts(stages, path)?,
        }
        path.pop();
    }
    Ok(())
}

fn check_leaves(leaves: &[Ingredient], path: &[String]) -> Result<(), RecipeError> {
    for leaf in leaves {
        if !leaf.amount.is_finite() || leaf.amount < 0.0 {
            return Err(RecipeError::Validation(format!(
                "amount of '{}' at '{}' must be a non-negative number",
                leaf.name,
                path.join("/")
            )));
        }
    }
    Ok(())
}

/// Sum the amounts of all leaves selected by `select`, which sees the path of
/// stage names (and group labels) from the root down to each leaf.
///
/// One accumulating pass; summation order is the map order but the result is
/// a plain commutative sum.
pub fn volume_where<F>(stages: &StageMap, select: &F) -> f64
where
    F: Fn(&[String], &Ingredient) -> bool,
{
    let mut total = 0.0;
    let mut path = Vec::new();
    sum_selected(stages, select, &mut path, &mut total);
    total
}

fn sum_selected<F>(stages: &StageMap, select: &F, path: &mut Vec<String>, total: &mut f64)
where
    F: Fn(&[String], &Ingredient) -> bool,
{
    for (name, stage) in stages {
        path.push(name.clone());
        match stage {
            Stage::Flat { ingredients, .. } => {
                for leaf in ingredients {
                    if select(path, leaf) {
                        *total += leaf.amount;
                    }
                }
            }
            Stage::Grouped { groups, .. } => {
                for (label, leaves) in groups {
                    path.push(label.clone());
                    for leaf in leaves {
                        if select(path, leaf) {
                            *total += leaf.amount;
                        }
                    }
                    path.pop();
                }
            }
            Stage::Nested { stages, .. } => sum_selected(stages, select, path, total),
        }
        path.pop();
    }
}

/// Volume displaced by the mash ingredients: every leaf under the named top
/// stage. An absent stage sums to zero; an all-water batch is legal.
pub fn mash_volume(stages: &StageMap, mash_stage: &str) -> f64 {
    volume_where(stages, &|path: &[String], _: &Ingredient| {
        path.first().map(String::as_str) == Some(mash_stage)
    })
}

/// Copy of the tree with every leaf amount multiplied by `ratio`.
///
/// Names, categories, units and stage info pass through untouched; the source
/// tree is not mutated.
pub fn scaled_stages(stages: &StageMap, ratio: f64) -> StageMap {
    stages
        .iter()
        .map(|(name, stage)| (name.clone(), scaled_stage(stage, ratio)))
        .collect()
}

fn scaled_stage(stage: &Stage, ratio: f64) -> Stage {
    match stage {
        Stage::Flat { info, ingredients } => Stage::Flat {
            info: info.clone(),
            ingredients: scaled_leaves(ingredients, ratio),
        },
        Stage::Grouped { info, groups } => Stage::Grouped {
            info: info.clone(),
            groups: groups
                .iter()
                .map(|(label, leaves)| (label.clone(), scaled_leaves(leaves, ratio)))
                .collect(),
        },
        Stage::Nested { info, stages } => Stage::Nested {
            info: info.clone(),
            stages: scaled_stages(stages, ratio),
        },
    }
}

fn scaled_leaves(leaves: &[Ingredient], ratio: f64) -> Vec<Ingredient> {
    leaves
        .iter()
        .map(|leaf| Ingredient {
            amount: leaf.amount * ratio,
            ..leaf.clone()
        })
        .collect()
}

/// Format an ingredient tree as a readable indented string
pub fn format_stages(stages: &StageMap, indent: usize) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);

    for (name, stage) in stages {
        output.push_str(&format!("{}{}:\n", prefix, name));

        for (key, value) in stage.info() {
            output.push_str(&format!("{}  [{}: {}]\n", prefix, key, value));
        }

        match stage {
            Stage::Flat { ingredients, .. } => {
                for leaf in ingredients {
                    output.push_str(&format_leaf(leaf, &prefix));
                }
            }
            Stage::Grouped { groups, .. } => {
                for (label, leaves) in groups {
                    output.push_str(&format!("{}  {}:\n", prefix, label));
                    for leaf in leaves {
                        output.push_str(&format_leaf(leaf, &format!("{}  ", prefix)));
                    }
                }
            }
            Stage::Nested { stages, .. } => {
                output.push_str(&format_stages(stages, indent + 1));
            }
        }
    }

    output
}

fn format_leaf(leaf: &Ingredient, prefix: &str) -> String {
    let unit = leaf.unit.as_deref().unwrap_or("");
    if leaf.kind.is_empty() {
        format!("{}  {} {:.1}{}\n", prefix, leaf.name, leaf.amount, unit)
    } else {
        format!(
            "{}  {} {:.1}{} ({})\n",
            prefix, leaf.name, leaf.amount, unit, leaf.kind
        )
    }
}

/// Summary of a batch scaling calculation
#[derive(Debug)]
pub struct BatchSummary {
    pub recipe_name: String,
    pub resulting_beer_volume: f64,
    pub sparging_water_volume: f64,
    pub kettle_volume: f64,
    pub ratio: f64,
    pub ingredient_volume: f64,
    pub sparging_water_in_ratio: f64,
    pub input_water: f64,
}

/// Generate a summary of the batch plan for display
pub fn summarize_batch(plan: &BatchPlan, recipe_name: &str) -> BatchSummary {
    BatchSummary {
        recipe_name: recipe_name.to_string(),
        resulting_beer_volume: plan.resulting_beer_volume(),
        sparging_water_volume: plan.sparging_water_volume(),
        kettle_volume: plan.kettle_volume(),
        ratio: plan.ratio(),
        ingredient_volume: plan.ingredient_volume(),
        sparging_water_in_ratio: plan.sparging_water_in_ratio(),
        input_water: plan.input_water(),
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Batch Summary ===")?;
        writeln!(
            f,
            "Recipe: {} (native batch {:.1}, kettle {:.1})",
            self.recipe_name, self.resulting_beer_volume, self.kettle_volume
        )?;
        writeln!(f)?;

        writeln!(f, "Scale ratio: {:.4}", self.ratio)?;
        writeln!(f)?;

        writeln!(f, "Volumes:")?;
        writeln!(f, "  Ingredients:    {:.1}", self.ingredient_volume)?;
        writeln!(
            f,
            "  Sparging water: {:.1} (native {:.1})",
            self.sparging_water_in_ratio, self.sparging_water_volume
        )?;
        writeln!(f, "  Input water:    {:.1}", self.input_water)?;

        if self.input_water < 0.0 {
            writeln!(f)?;
            writeln!(
                f,
                "Warning: ingredients and sparging water exceed the kettle volume"
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InfoMap;
    use std::collections::BTreeMap;

    const TOL: f64 = 1e-9;

    fn mash_only(amounts: &[f64]) -> StageMap {
        let leaves = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Ingredient::new(&format!("grain{}", i), "Malt", *a))
            .collect();
        let mut stages = StageMap::new();
        stages.insert("mashing".to_string(), Stage::flat(leaves));
        stages
    }

    fn example_stages() -> StageMap {
        let mut stages = StageMap::new();
        stages.insert(
            "mashing".to_string(),
            Stage::flat(vec![
                Ingredient::new("Malt", "Malt", 4420.0),
                Ingredient::new("dextrin", "Malt", 370.0),
            ]),
        );
        stages
    }

    #[test]
    fn rejects_non_positive_volumes() {
        for (rbv, swv, kv) in [
            (0.0, 10.0, 20.0),
            (-5.0, 10.0, 20.0),
            (20.0, 0.0, 20.0),
            (20.0, -1.0, 20.0),
            (20.0, 10.0, 0.0),
            (20.0, 10.0, -1.0),
        ] {
            let result = BatchPlan::new(StageMap::new(), rbv, swv, kv);
            assert!(
                matches!(result, Err(RecipeError::Validation(_))),
                "expected validation failure for ({}, {}, {})",
                rbv,
                swv,
                kv
            );
        }
    }

    #[test]
    fn rejects_non_finite_volumes() {
        let result = BatchPlan::new(StageMap::new(), f64::NAN, 10.0, 20.0);
        assert!(matches!(result, Err(RecipeError::Validation(_))));

        let result = BatchPlan::new(StageMap::new(), 20.0, 10.0, f64::INFINITY);
        assert!(matches!(result, Err(RecipeError::Validation(_))));
    }

    #[test]
    fn rejects_negative_amount_with_path() {
        let stages = mash_only(&[100.0, -3.0]);
        let err = BatchPlan::new(stages, 20.0, 10.0, 40.0).unwrap_err();
        match err {
            RecipeError::Validation(msg) => {
                assert!(msg.contains("mashing"), "path missing from '{}'", msg);
                assert!(msg.contains("grain1"), "leaf name missing from '{}'", msg);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_nan_amount() {
        let stages = mash_only(&[f64::NAN]);
        let result = BatchPlan::new(stages, 20.0, 10.0, 40.0);
        assert!(matches!(result, Err(RecipeError::Validation(_))));
    }

    #[test]
    fn ratio_defaults_to_kettle_over_native() {
        // No mash stage at all: ingredient volume is zero, not an error
        let plan = BatchPlan::new(StageMap::new(), 25.0, 10.0, 40.0).unwrap();
        assert_eq!(plan.ingredient_volume(), 0.0);
        assert!((plan.ratio() - 40.0 / 25.0).abs() < TOL);
    }

    #[test]
    fn ratio_with_no_overrides_matches_construction_ratio() {
        let plan = BatchPlan::new(example_stages(), 23830.0, 5870.0, 43500.0).unwrap();
        let recomputed = plan.ratio_with(None, None, None).unwrap();
        assert!((recomputed - plan.ratio()).abs() < TOL);
    }

    #[test]
    fn non_positive_override_falls_back_to_stored_default() {
        let plan = BatchPlan::new(StageMap::new(), 25.0, 10.0, 40.0).unwrap();

        let with_negative = plan.ratio_with(Some(10.0), Some(-20.0), None).unwrap();
        let with_default = plan.ratio_with(Some(10.0), None, None).unwrap();
        assert!((with_negative - with_default).abs() < TOL);

        let with_zero = plan.ratio_with(Some(0.0), Some(20.0), None).unwrap();
        assert!((with_zero - 20.0 / 25.0).abs() < TOL);
    }

    #[test]
    fn non_finite_override_is_rejected() {
        let plan = BatchPlan::new(StageMap::new(), 25.0, 10.0, 40.0).unwrap();
        let result = plan.ratio_with(Some(f64::NAN), None, None);
        assert!(matches!(result, Err(RecipeError::InvalidArgument(_))));

        let result = plan.ratio_with(None, Some(f64::INFINITY), None);
        assert!(matches!(result, Err(RecipeError::InvalidArgument(_))));
    }

    #[test]
    fn scaling_is_linear_and_identity_at_one() {
        let stages = example_stages();
        let identity = scaled_stages(&stages, 1.0);
        assert_eq!(identity, stages);

        let doubled = scaled_stages(&stages, 2.5);
        match &doubled["mashing"] {
            Stage::Flat { ingredients, .. } => {
                assert!((ingredients[0].amount - 4420.0 * 2.5).abs() < TOL);
                assert!((ingredients[1].amount - 370.0 * 2.5).abs() < TOL);
            }
            other => panic!("shape changed by scaling: {:?}", other),
        }
    }

    #[test]
    fn scaling_passes_metadata_through() {
        let mut info = InfoMap::new();
        info.insert("temperature".to_string(), "67C".to_string());
        let mut groups = BTreeMap::new();
        groups.insert(
            "10 min".to_string(),
            vec![Ingredient {
                name: "Citra".to_string(),
                kind: "Hops".to_string(),
                amount: 50.0,
                unit: Some("g".to_string()),
            }],
        );
        let mut stages = StageMap::new();
        stages.insert("hops".to_string(), Stage::Grouped { info, groups });

        let scaled = scaled_stages(&stages, 2.0);
        match &scaled["hops"] {
            Stage::Grouped { info, groups } => {
                assert_eq!(info["temperature"], "67C");
                let leaf = &groups["10 min"][0];
                assert_eq!(leaf.name, "Citra");
                assert_eq!(leaf.kind, "Hops");
                assert_eq!(leaf.unit.as_deref(), Some("g"));
                assert!((leaf.amount - 100.0).abs() < TOL);
            }
            other => panic!("shape changed by scaling: {:?}", other),
        }
    }

    #[test]
    fn aggregation_is_independent_of_nesting() {
        let flat = mash_only(&[4420.0, 370.0]);

        let mut groups = BTreeMap::new();
        groups.insert(
            "base".to_string(),
            vec![Ingredient::new("Malt", "Malt", 4420.0)],
        );
        groups.insert(
            "specialty".to_string(),
            vec![Ingredient::new("dextrin", "Malt", 370.0)],
        );
        let mut grouped = StageMap::new();
        grouped.insert(
            "mashing".to_string(),
            Stage::Grouped {
                info: InfoMap::new(),
                groups,
            },
        );

        let mut inner = StageMap::new();
        inner.insert(
            "first step".to_string(),
            Stage::flat(vec![Ingredient::new("Malt", "Malt", 4420.0)]),
        );
        inner.insert(
            "second step".to_string(),
            Stage::flat(vec![Ingredient::new("dextrin", "Malt", 370.0)]),
        );
        let mut nested = StageMap::new();
        nested.insert(
            "mashing".to_string(),
            Stage::Nested {
                info: InfoMap::new(),
                stages: inner,
            },
        );

        let expected = 4790.0;
        for stages in [flat, grouped, nested] {
            assert!((mash_volume(&stages, "mashing") - expected).abs() < TOL);
        }
    }

    #[test]
    fn non_mash_stages_do_not_displace_volume() {
        let mut stages = example_stages();
        stages.insert(
            "hops".to_string(),
            Stage::flat(vec![Ingredient::new("Saaz", "Hops", 90.0)]),
        );
        assert!((mash_volume(&stages, "mashing") - 4790.0).abs() < TOL);
    }

    #[test]
    fn custom_volume_predicate() {
        let mut stages = example_stages();
        stages.insert(
            "fermentation".to_string(),
            Stage::flat(vec![Ingredient::new("yeast", "Yeast", 11.5)]),
        );

        let total = volume_where(&stages, &|_: &[String], leaf: &Ingredient| {
            leaf.kind == "Malt"
        });
        assert!((total - 4790.0).abs() < TOL);
    }

    #[test]
    fn derived_water_volumes_are_consistent() {
        let plan = BatchPlan::new(example_stages(), 23830.0, 5870.0, 43500.0).unwrap();
        let total = plan.input_water() + plan.ingredient_volume() + plan.sparging_water_in_ratio();
        assert!((total - plan.kettle_volume()).abs() < TOL);
    }

    #[test]
    fn example_scenario() {
        let plan = BatchPlan::new(example_stages(), 23830.0, 5870.0, 43500.0).unwrap();

        assert!((plan.ingredient_volume() - 4790.0).abs() < TOL);

        let expected_ratio = (43500.0 - 4790.0) / 23830.0;
        assert!((plan.ratio() - expected_ratio).abs() < TOL);

        let expected_sparging = 5870.0 * expected_ratio;
        assert!((plan.sparging_water_in_ratio() - expected_sparging).abs() < TOL);

        let expected_input = 43500.0 - 4790.0 - expected_sparging;
        assert!((plan.input_water() - expected_input).abs() < TOL);
    }

    #[test]
    fn negative_input_water_is_observable() {
        // Mash volume exceeds the kettle: physically nonsensical, still a
        // valid plan whose derived values the caller can inspect
        let plan = BatchPlan::new(mash_only(&[50.0]), 20.0, 10.0, 40.0).unwrap();
        assert!(plan.input_water() < 0.0);
        let total = plan.input_water() + plan.ingredient_volume() + plan.sparging_water_in_ratio();
        assert!((total - plan.kettle_volume()).abs() < TOL);
    }

    #[test]
    fn summary_reports_plan_values() {
        let plan = BatchPlan::new(example_stages(), 23830.0, 5870.0, 43500.0).unwrap();
        let summary = summarize_batch(&plan, "house pale ale");
        assert_eq!(summary.recipe_name, "house pale ale");
        assert!((summary.ratio - plan.ratio()).abs() < TOL);

        let text = summary.to_string();
        assert!(text.contains("house pale ale"));
        assert!(text.contains("4790.0"));
        assert!(!text.contains("Warning"));
    }

    #[test]
    fn summary_warns_on_negative_input_water() {
        let plan = BatchPlan::new(mash_only(&[50.0]), 20.0, 10.0, 40.0).unwrap();
        let text = summarize_batch(&plan, "overfull").to_string();
        assert!(text.contains("Warning"));
    }

    #[test]
    fn format_renders_all_shapes() {
        let mut info = InfoMap::new();
        info.insert("duration".to_string(), "60 min".to_string());
        let mut groups = BTreeMap::new();
        groups.insert(
            "60 min".to_string(),
            vec![Ingredient::new("Magnum", "Hops", 30.0)],
        );
        let mut inner = StageMap::new();
        inner.insert("boil".to_string(), Stage::Grouped { info, groups });

        let mut stages = example_stages();
        stages.insert(
            "hops".to_string(),
            Stage::Nested {
                info: InfoMap::new(),
                stages: inner,
            },
        );

        let text = format_stages(&stages, 0);
        assert!(text.contains("mashing:"));
        assert!(text.contains("Malt 4420.0 (Malt)"));
        assert!(text.contains("hops:"));
        assert!(text.contains("boil:"));
        assert!(text.contains("[duration: 60 min]"));
        assert!(text.contains("60 min:"));
        assert!(text.contains("Magnum 30.0 (Hops)"));
    }
}
