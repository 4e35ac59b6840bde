mod catalog;
mod goals;
mod helpers;
mod ledger;
mod log;
mod plan;

use anyhow::Result;
use serde_json::{Map, Value};

use tally_core::TallyError;
use tally_core::models::Nutrition;

use helpers::exit_not_found;

pub(crate) use catalog::{cmd_ingredient_add, cmd_ingredient_list, cmd_recipe_add, cmd_recipe_list};
pub(crate) use goals::{
    cmd_goals_clear, cmd_goals_set, cmd_goals_show, cmd_profile_set, cmd_profile_show,
};
pub(crate) use ledger::{cmd_history, cmd_remove, cmd_summary};
pub(crate) use log::cmd_log;
pub(crate) use plan::{cmd_finalize, cmd_plan_generate, cmd_plan_show};

/// Nutrient flags shared by `log`, `ingredient add` and `recipe add`.
#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct NutritionArgs {
    /// Calories (kcal)
    #[arg(long)]
    pub calories: Option<f64>,
    /// Protein (g)
    #[arg(long)]
    pub protein: Option<f64>,
    /// Carbohydrates (g)
    #[arg(long)]
    pub carbs: Option<f64>,
    /// Fat (g)
    #[arg(long)]
    pub fat: Option<f64>,
    /// Fiber (g)
    #[arg(long)]
    pub fiber: Option<f64>,
    /// Sugar (g)
    #[arg(long)]
    pub sugar: Option<f64>,
    /// Sodium (mg)
    #[arg(long)]
    pub sodium: Option<f64>,
}

impl NutritionArgs {
    fn fields(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("calories", self.calories),
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("fiber", self.fiber),
            ("sugar", self.sugar),
            ("sodium", self.sodium),
        ]
    }

    /// Raw nutrition object for scanned/manual entries, `None` when no flag was given.
    pub(crate) fn to_raw(&self) -> Option<Value> {
        let map: Map<String, Value> = self
            .fields()
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), Value::from(v))))
            .collect();
        if map.is_empty() { None } else { Some(Value::Object(map)) }
    }

    pub(crate) fn to_nutrition(&self) -> Nutrition {
        Nutrition {
            calories: self.calories.unwrap_or(0.0),
            protein: self.protein.unwrap_or(0.0),
            carbs: self.carbs.unwrap_or(0.0),
            fat: self.fat.unwrap_or(0.0),
            fiber: self.fiber.unwrap_or(0.0),
            sugar: self.sugar.unwrap_or(0.0),
            sodium: self.sodium.unwrap_or(0.0),
        }
    }
}

/// Unwrap a service result, turning `NotFound` into exit status 2.
pub(super) fn found_or_exit<T>(result: tally_core::Result<T>, json: bool) -> Result<T> {
    match result {
        Err(TallyError::NotFound(message)) => exit_not_found(&message, json),
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_skips_unset_flags() {
        let args = NutritionArgs {
            calories: Some(250.0),
            protein: Some(12.5),
            ..NutritionArgs::default()
        };
        let raw = args.to_raw().unwrap();
        assert_eq!(raw["calories"], 250.0);
        assert_eq!(raw["protein"], 12.5);
        assert!(raw.get("fat").is_none());
    }

    #[test]
    fn test_to_raw_empty_is_none() {
        assert!(NutritionArgs::default().to_raw().is_none());
    }

    #[test]
    fn test_to_nutrition_defaults_to_zero() {
        let args = NutritionArgs {
            fat: Some(3.0),
            ..NutritionArgs::default()
        };
        let n = args.to_nutrition();
        assert_eq!(n.fat, 3.0);
        assert_eq!(n.calories, 0.0);
    }

    #[test]
    fn test_found_or_exit_passes_other_errors() {
        let err: tally_core::Result<()> = Err(TallyError::validation("bad"));
        let out = found_or_exit(err, false);
        assert_eq!(out.unwrap_err().to_string(), "bad");
    }
}
