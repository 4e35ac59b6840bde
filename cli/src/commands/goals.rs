use anyhow::Result;

use tally_core::TallyService;
use tally_core::models::{ActivityLevel, DailyGoals, GoalSource, HealthProfile, ManualGoalPayload};

use super::helpers::print_json;

fn print_goals(goals: &DailyGoals) {
    let source = match goals.source {
        GoalSource::Manual => "manual",
        GoalSource::Derived => "derived from profile",
    };
    println!("Daily goals ({source}):");
    println!("  Calories: {} kcal", goals.calories);
    println!("  Protein:  {}g", goals.protein);
    println!("  Carbs:    {}g", goals.carbs);
    println!("  Fat:      {}g", goals.fat);
    println!("  Fiber:    {}g", goals.fiber);
}

pub(crate) fn cmd_goals_show(service: &TallyService, user: &str, json: bool) -> Result<()> {
    let goals = service.get_goals(user)?;
    if json {
        return print_json(&goals);
    }
    print_goals(&goals);
    Ok(())
}

pub(crate) fn cmd_goals_set(
    service: &TallyService,
    user: &str,
    payload: &ManualGoalPayload,
    json: bool,
) -> Result<()> {
    let goals = service.set_goals(user, payload)?;
    if json {
        return print_json(&goals);
    }
    print_goals(&goals);
    Ok(())
}

pub(crate) fn cmd_goals_clear(service: &TallyService, user: &str, json: bool) -> Result<()> {
    let goals = service.clear_goals(user)?;
    if json {
        return print_json(&goals);
    }
    println!("Manual goals cleared.");
    print_goals(&goals);
    Ok(())
}

pub(crate) fn cmd_profile_show(service: &TallyService, user: &str, json: bool) -> Result<()> {
    let profile = service.get_profile(user)?;
    if json {
        return print_json(&profile);
    }
    print_profile(&profile);
    Ok(())
}

/// Flags left unset keep the stored value.
#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_profile_set(
    service: &TallyService,
    user: &str,
    weight_kg: Option<f64>,
    height_cm: Option<f64>,
    age: Option<u32>,
    activity: Option<&str>,
    conditions: Vec<String>,
    clear_conditions: bool,
    json: bool,
) -> Result<()> {
    let mut profile = service.get_profile(user)?;

    if weight_kg.is_some() {
        profile.weight_kg = weight_kg;
    }
    if height_cm.is_some() {
        profile.height_cm = height_cm;
    }
    if age.is_some() {
        profile.age = age;
    }
    if let Some(level) = activity {
        profile.activity_level = Some(level.parse::<ActivityLevel>()?);
    }
    if clear_conditions {
        profile.health_conditions.clear();
    }
    for condition in conditions {
        if !profile
            .health_conditions
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&condition))
        {
            profile.health_conditions.push(condition);
        }
    }

    let stored = service.set_profile(user, &profile)?;
    if json {
        return print_json(&stored);
    }
    print_profile(&stored);
    Ok(())
}

fn print_profile(profile: &HealthProfile) {
    fn show<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
        value.map_or_else(|| "-".to_string(), |v| format!("{v}{unit}"))
    }

    println!("Health profile:");
    println!("  Weight:   {}", show(profile.weight_kg, " kg"));
    println!("  Height:   {}", show(profile.height_cm, " cm"));
    println!("  Age:      {}", show(profile.age, ""));
    println!(
        "  Activity: {}",
        show(profile.activity_level.map(ActivityLevel::as_str), "")
    );
    if profile.health_conditions.is_empty() {
        println!("  Conditions: none");
    } else {
        println!("  Conditions: {}", profile.health_conditions.join(", "));
    }
}
