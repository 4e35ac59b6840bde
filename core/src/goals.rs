//! Daily calorie and macro targets.
//!
//! Goals are either a manual override stored per user or derived from the
//! health profile. The BMR formula below is the gender-independent variant
//! used since the first release; it is a known approximation.

use crate::error::{Result, TallyError};
use crate::models::{DailyGoals, Goal, GoalSource, HealthProfile, ManualGoalPayload};

pub const FALLBACK_CALORIES: i64 = 2000;
pub const DEFAULT_FIBER_G: i64 = 25;

pub const MIN_MANUAL_CALORIES: i64 = 1000;
pub const MAX_MANUAL_CALORIES: i64 = 5000;

// Manual overrides that only set calories fall back to these macros.
pub const MANUAL_DEFAULT_PROTEIN_G: i64 = 125;
pub const MANUAL_DEFAULT_CARBS_G: i64 = 225;
pub const MANUAL_DEFAULT_FAT_G: i64 = 67;

const PROTEIN_SHARE: f64 = 0.25;
const CARBS_SHARE: f64 = 0.45;
const FAT_SHARE: f64 = 0.30;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

const SEDENTARY_MULTIPLIER: f64 = 1.2;

/// BMR = 88.362 + 13.397·kg + 4.799·cm − 5.677·years
#[must_use]
pub fn basal_metabolic_rate(weight_kg: f64, height_cm: f64, age: u32) -> f64 {
    88.362 + 13.397 * weight_kg + 4.799 * height_cm - 5.677 * f64::from(age)
}

/// Daily calories from the health profile, or [`FALLBACK_CALORIES`] when
/// weight, height, or age is missing.
#[must_use]
pub fn compute_derived_goal(profile: Option<&HealthProfile>) -> i64 {
    let Some(profile) = profile else {
        return FALLBACK_CALORIES;
    };
    let (Some(weight), Some(height), Some(age)) =
        (profile.weight_kg, profile.height_cm, profile.age)
    else {
        return FALLBACK_CALORIES;
    };

    let multiplier = profile
        .activity_level
        .map_or(SEDENTARY_MULTIPLIER, |level| level.multiplier());
    (basal_metabolic_rate(weight, height, age) * multiplier).round() as i64
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn derive_macro_goals(calories: i64) -> DailyGoals {
    let cal = calories as f64;
    DailyGoals {
        calories,
        protein: (cal * PROTEIN_SHARE / KCAL_PER_G_PROTEIN).round() as i64,
        carbs: (cal * CARBS_SHARE / KCAL_PER_G_CARBS).round() as i64,
        fat: (cal * FAT_SHARE / KCAL_PER_G_FAT).round() as i64,
        fiber: DEFAULT_FIBER_G,
        source: GoalSource::Derived,
    }
}

/// The manual override when it is switched on and has calories, otherwise
/// goals derived from the profile.
#[must_use]
pub fn resolve_goals(goal: Option<&Goal>, profile: Option<&HealthProfile>) -> DailyGoals {
    if let Some(goal) = goal.filter(|g| g.use_manual) {
        if let Some(calories) = goal.calories {
            return DailyGoals {
                calories,
                protein: goal.protein.unwrap_or(MANUAL_DEFAULT_PROTEIN_G),
                carbs: goal.carbs.unwrap_or(MANUAL_DEFAULT_CARBS_G),
                fat: goal.fat.unwrap_or(MANUAL_DEFAULT_FAT_G),
                fiber: goal.fiber.unwrap_or(DEFAULT_FIBER_G),
                source: GoalSource::Manual,
            };
        }
    }
    derive_macro_goals(compute_derived_goal(profile))
}

pub fn validate_manual_goals(payload: &ManualGoalPayload) -> Result<()> {
    if !(MIN_MANUAL_CALORIES..=MAX_MANUAL_CALORIES).contains(&payload.calories) {
        return Err(TallyError::validation(format!(
            "calories must be between {MIN_MANUAL_CALORIES} and {MAX_MANUAL_CALORIES} (got {})",
            payload.calories
        )));
    }
    let macros = [
        ("protein", payload.protein),
        ("carbs", payload.carbs),
        ("fat", payload.fat),
        ("fiber", payload.fiber),
    ];
    for (name, value) in macros {
        if value.is_some_and(|v| v < 0) {
            return Err(TallyError::validation(format!(
                "{name} must not be negative"
            )));
        }
    }
    Ok(())
}
