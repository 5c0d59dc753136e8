//! Data models for brewing recipes

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors raised by recipe construction, traversal and scaling
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecipeError {
    /// A required numeric field is non-positive or non-finite
    #[error("invalid recipe: {0}")]
    Validation(String),

    /// A stage or leaf does not match any recognized shape
    #[error("malformed recipe at '{path}': {reason}")]
    MalformedRecipe { path: String, reason: String },

    /// A ratio override was supplied but is not a usable number
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The effective ratio denominator resolved to zero
    #[error("ratio is undefined: resulting beer volume resolved to zero")]
    DivisionUndefined,
}

/// Descriptive stage metadata (temperature, duration, ...). Opaque to scaling.
pub type InfoMap = BTreeMap<String, String>;

/// Stage name -> stage. Sorted map so display order is deterministic.
pub type StageMap = BTreeMap<String, Stage>;

/// A single named, typed, quantified addition
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    /// Free-form category label ("Malt", "Hops", ...), informational only.
    /// Written as "type" in recipe files.
    pub kind: String,
    /// Quantity to be scaled. Always a plain number in the model; the loader
    /// normalizes unit-suffixed text like "2kg" before it gets here.
    pub amount: f64,
    /// Unit recorded by the loader, carried through unconverted
    pub unit: Option<String>,
}

impl Ingredient {
    pub fn new(name: &str, kind: &str, amount: f64) -> Self {
        Ingredient {
            name: name.to_string(),
            kind: kind.to_string(),
            amount,
            unit: None,
        }
    }
}

/// One named phase of the brewing process.
///
/// The three shapes are structurally distinct: a flat stage holds its leaves
/// directly, a grouped stage keys leaf lists by a sub-label such as a boil
/// time, and a nested stage holds further stages. Any shape may carry an
/// `info` map of descriptive metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Flat {
        info: InfoMap,
        ingredients: Vec<Ingredient>,
    },
    Grouped {
        info: InfoMap,
        groups: BTreeMap<String, Vec<Ingredient>>,
    },
    Nested {
        info: InfoMap,
        stages: StageMap,
    },
}

impl Stage {
    pub fn info(&self) -> &InfoMap {
        match self {
            Stage::Flat { info, .. } | Stage::Grouped { info, .. } | Stage::Nested { info, .. } => {
                info
            }
        }
    }

    /// Flat stage without metadata
    pub fn flat(ingredients: Vec<Ingredient>) -> Self {
        Stage::Flat {
            info: InfoMap::new(),
            ingredients,
        }
    }
}

/// A stored recipe at its native batch size.
///
/// The kettle volume is deliberately absent: it belongs to whoever brews the
/// recipe and is supplied at scale time, not stored with the recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub name: String,
    pub resulting_beer_volume: f64,
    pub sparging_water_volume: f64,
    pub ingredients: StageMap,
}
