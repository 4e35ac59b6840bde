use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tally_core::TallyService;
use tally_core::models::{MealPlan, MealType};

use super::found_or_exit;
use super::helpers::{format_totals, parse_date, print_json, truncate};

fn print_plan(plan: &MealPlan) {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Item")]
        item: String,
        #[tabled(rename = "Qty")]
        quantity: u32,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let rows: Vec<PlanRow> = plan
        .meals
        .iter()
        .flat_map(|meal| {
            meal.items.iter().map(move |item| PlanRow {
                meal: meal.meal_type.to_string(),
                item: truncate(&item.name, 30),
                quantity: item.quantity,
                calories: format!("{:.0}", item.nutrition.calories),
                protein: format!("{:.0}g", item.nutrition.protein),
                carbs: format!("{:.0}g", item.nutrition.carbs),
                fat: format!("{:.0}g", item.nutrition.fat),
            })
        })
        .collect();

    println!(
        "Meal plan for {} (target {} kcal)",
        plan.date, plan.target_calories
    );
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!("  TOTAL: {}", format_totals(&plan.total));
}

pub(crate) fn cmd_plan_generate(
    service: &TallyService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let plan = service.generate_meal_plan(user, date)?;

    if json {
        return print_json(&plan);
    }
    if plan.replaced_existing {
        println!("Replaced the existing plan for {date}.");
    }
    print_plan(&plan);
    Ok(())
}

pub(crate) fn cmd_plan_show(
    service: &TallyService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let plan = found_or_exit(service.get_meal_plan(user, date), json)?;

    if json {
        return print_json(&plan);
    }
    print_plan(&plan);
    Ok(())
}

pub(crate) fn cmd_finalize(
    service: &TallyService,
    user: &str,
    meal: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let meal_type: MealType = meal.parse()?;
    let date = parse_date(date)?;
    let summary = service.finalize_meal(user, meal_type, date)?;

    if json {
        return print_json(&summary);
    }

    let label = summary.meal_type.as_str().to_uppercase();
    println!("=== {label} finalized for {date} ===\n");
    println!("  MEAL:      {}", format_totals(&summary.meal_consumed));
    println!("  DAY:       {}", format_totals(&summary.consumed));
    println!("  GOAL:      {}", format_totals(&summary.daily_goals.as_totals()));
    println!("  REMAINING: {}", format_totals(&summary.remaining));
    if summary.exceeded {
        println!("\n  Daily calorie goal exceeded.");
    }
    Ok(())
}
