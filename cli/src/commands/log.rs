use anyhow::Result;

use tally_core::TallyService;
use tally_core::models::{LogRequest, SourceKind};

use super::NutritionArgs;
use super::found_or_exit;
use super::helpers::{format_totals, parse_date, print_json};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_log(
    service: &TallyService,
    user: &str,
    kind: &str,
    source_ref: Option<String>,
    quantity: f64,
    meal: &str,
    date: Option<String>,
    nutrition: &NutritionArgs,
    json: bool,
) -> Result<()> {
    let source_kind: SourceKind = kind.parse()?;
    let date = parse_date(date)?;

    let request = LogRequest {
        source_kind,
        source_ref,
        quantity,
        meal_type: meal.to_string(),
        date: Some(date),
        raw_nutrition: nutrition.to_raw(),
    };

    let outcome = found_or_exit(service.add_entry(user, &request), json)?;

    if json {
        return print_json(&outcome);
    }

    let entry = &outcome.entry;
    let what = entry.source_ref.as_deref().unwrap_or(entry.source_kind.as_str());
    let cal = entry.nutrition.calories;
    println!(
        "Logged {what} x{qty} to {meal} on {date} ({cal:.0} kcal)",
        qty = entry.quantity,
        meal = entry.meal_type,
    );
    println!("  Entry ID: {}", entry.id);
    println!("  Day total: {}", format_totals(&outcome.ledger.totals));

    Ok(())
}
