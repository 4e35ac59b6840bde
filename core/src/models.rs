use std::fmt;
use std::ops::{AddAssign, SubAssign};
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Enumerations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

pub const MEAL_TYPES: &[MealType] = &[
    MealType::Breakfast,
    MealType::Lunch,
    MealType::Dinner,
    MealType::Snack,
];

impl MealType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_meal_type(s)
    }
}

pub fn validate_meal_type(meal: &str) -> Result<MealType> {
    match meal.trim().to_lowercase().as_str() {
        "breakfast" => Ok(MealType::Breakfast),
        "lunch" => Ok(MealType::Lunch),
        "dinner" => Ok(MealType::Dinner),
        "snack" => Ok(MealType::Snack),
        _ => bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Where a logged entry's nutrition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[serde(alias = "catalogIngredient", alias = "ingredient")]
    CatalogIngredient,
    Recipe,
    Scanned,
    Manual,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CatalogIngredient => "catalog_ingredient",
            Self::Recipe => "recipe",
            Self::Scanned => "scanned",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "catalog_ingredient" | "catalogingredient" | "ingredient" => {
                Ok(Self::CatalogIngredient)
            }
            "recipe" => Ok(Self::Recipe),
            "scanned" => Ok(Self::Scanned),
            "manual" => Ok(Self::Manual),
            _ => bail!(
                "Invalid source kind '{s}'. Must be one of: catalog_ingredient, recipe, scanned, manual"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::Active => 1.725,
            Self::VeryActive => 1.9,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sedentary => "sedentary",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Active => "active",
            Self::VeryActive => "very_active",
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "sedentary" => Ok(Self::Sedentary),
            "light" => Ok(Self::Light),
            "moderate" => Ok(Self::Moderate),
            "active" => Ok(Self::Active),
            "very_active" => Ok(Self::VeryActive),
            _ => bail!(
                "Invalid activity level '{s}'. Must be one of: sedentary, light, moderate, active, very_active"
            ),
        }
    }
}

// --- Nutrition values ---

/// Full nutrition snapshot carried by an entry or a catalog item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nutrition {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

impl Nutrition {
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
            fiber: self.fiber * factor,
            sugar: self.sugar * factor,
            sodium: self.sodium * factor,
        }
    }

    /// The five fields a ledger aggregates.
    #[must_use]
    pub fn macros(&self) -> MacroTotals {
        MacroTotals {
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            fiber: self.fiber,
        }
    }
}

/// Aggregate totals kept on a ledger, a meal plan, and each planned meal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
}

impl MacroTotals {
    pub const ZERO: Self = Self {
        calories: 0.0,
        protein: 0.0,
        carbs: 0.0,
        fat: 0.0,
        fiber: 0.0,
    };

    #[must_use]
    pub fn sum<'a>(items: impl IntoIterator<Item = &'a MacroTotals>) -> Self {
        items.into_iter().fold(Self::ZERO, |mut acc, t| {
            acc += *t;
            acc
        })
    }

    /// `self - other` per field, floored at zero.
    #[must_use]
    pub fn remaining_after(&self, consumed: &MacroTotals) -> Self {
        Self {
            calories: (self.calories - consumed.calories).max(0.0),
            protein: (self.protein - consumed.protein).max(0.0),
            carbs: (self.carbs - consumed.carbs).max(0.0),
            fat: (self.fat - consumed.fat).max(0.0),
            fiber: (self.fiber - consumed.fiber).max(0.0),
        }
    }
}

impl AddAssign for MacroTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.calories += rhs.calories;
        self.protein += rhs.protein;
        self.carbs += rhs.carbs;
        self.fat += rhs.fat;
        self.fiber += rhs.fiber;
    }
}

impl SubAssign for MacroTotals {
    fn sub_assign(&mut self, rhs: Self) {
        self.calories -= rhs.calories;
        self.protein -= rhs.protein;
        self.carbs -= rhs.carbs;
        self.fat -= rhs.fat;
        self.fiber -= rhs.fiber;
    }
}

// --- Ledger ---

#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub id: String,
    pub source_kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub quantity: f64,
    pub meal_type: MealType,
    pub nutrition: Nutrition,
    pub logged_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ledger {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub entries: Vec<Entry>,
    pub totals: MacroTotals,
    pub created_at: String,
    pub updated_at: String,
}

impl Ledger {
    #[must_use]
    pub fn entry_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Sum of the entries logged under one meal slot.
    #[must_use]
    pub fn meal_totals(&self, meal_type: MealType) -> MacroTotals {
        let macros: Vec<MacroTotals> = self
            .entries
            .iter()
            .filter(|e| e.meal_type == meal_type)
            .map(|e| e.nutrition.macros())
            .collect();
        MacroTotals::sum(&macros)
    }
}

/// A food-logging request before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct LogRequest {
    pub source_kind: SourceKind,
    #[serde(default)]
    pub source_ref: Option<String>,
    pub quantity: f64,
    pub meal_type: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub raw_nutrition: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddEntryOutcome {
    pub ledger: Ledger,
    pub entry: Entry,
}

// --- Goals ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Goal {
    pub calories: Option<i64>,
    pub protein: Option<i64>,
    pub carbs: Option<i64>,
    pub fat: Option<i64>,
    pub fiber: Option<i64>,
    pub use_manual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualGoalPayload {
    pub calories: i64,
    #[serde(default)]
    pub protein: Option<i64>,
    #[serde(default)]
    pub carbs: Option<i64>,
    #[serde(default)]
    pub fat: Option<i64>,
    #[serde(default)]
    pub fiber: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthProfile {
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub age: Option<u32>,
    pub activity_level: Option<ActivityLevel>,
    pub health_conditions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalSource {
    Manual,
    Derived,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyGoals {
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
    pub fiber: i64,
    pub source: GoalSource,
}

impl DailyGoals {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_totals(&self) -> MacroTotals {
        MacroTotals {
            calories: self.calories as f64,
            protein: self.protein as f64,
            carbs: self.carbs as f64,
            fat: self.fat as f64,
            fiber: self.fiber as f64,
        }
    }
}

// --- Catalog ---

#[derive(Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Per-unit nutrition.
    pub nutrition: Nutrition,
    pub created_at: String,
}

impl Ingredient {
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub nutrition: Nutrition,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    /// Per-serving nutrition.
    pub nutrition: Nutrition,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    pub nutrition: Nutrition,
}

// --- Meal plans ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlanItem {
    pub ingredient_id: String,
    pub name: String,
    pub quantity: u32,
    pub nutrition: MacroTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedMeal {
    pub meal_type: MealType,
    pub target_calories: f64,
    pub items: Vec<MealPlanItem>,
    pub subtotal: MacroTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub target_calories: i64,
    pub meals: Vec<PlannedMeal>,
    pub total: MacroTotals,
    pub generated_at: String,
    #[serde(default)]
    pub replaced_existing: bool,
}

// --- Finalize ---

#[derive(Debug, Clone, Serialize)]
pub struct MealSummary {
    pub user_id: String,
    pub meal_type: MealType,
    pub date: NaiveDate,
    pub meal_consumed: MacroTotals,
    pub consumed: MacroTotals,
    pub remaining: MacroTotals,
    pub exceeded: bool,
    pub daily_goals: DailyGoals,
}

// --- Validation ---

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        bail!("quantity must be greater than 0");
    }
    Ok(())
}

fn validate_nutrition(nutrition: &Nutrition) -> Result<()> {
    let fields = [
        ("calories", nutrition.calories),
        ("protein", nutrition.protein),
        ("carbs", nutrition.carbs),
        ("fat", nutrition.fat),
        ("fiber", nutrition.fiber),
        ("sugar", nutrition.sugar),
        ("sodium", nutrition.sodium),
    ];
    for (name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            bail!("{name} must not be negative");
        }
    }
    Ok(())
}

/// Catalog ingredient: name and category must not be empty, nutrition must not be negative.
pub fn validate_ingredient_data(ingredient: &NewIngredient) -> Result<()> {
    if ingredient.name.trim().is_empty() {
        bail!("Ingredient name must not be empty");
    }
    if ingredient.category.trim().is_empty() {
        bail!("Ingredient category must not be empty");
    }
    validate_nutrition(&ingredient.nutrition)
}

pub fn validate_recipe_data(recipe: &NewRecipe) -> Result<()> {
    if recipe.name.trim().is_empty() {
        bail!("Recipe name must not be empty");
    }
    validate_nutrition(&recipe.nutrition)
}

pub fn validate_profile(profile: &HealthProfile) -> Result<()> {
    if profile.weight_kg.is_some_and(|w| !w.is_finite() || w <= 0.0) {
        bail!("weight_kg must be greater than 0");
    }
    if profile.height_cm.is_some_and(|h| !h.is_finite() || h <= 0.0) {
        bail!("height_cm must be greater than 0");
    }
    if profile.age == Some(0) {
        bail!("age must be greater than 0");
    }
    Ok(())
}
