use anyhow::Result;
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tally_core::TallyService;
use tally_core::models::{DailyGoals, GoalSource, Ledger, MEAL_TYPES, MacroTotals};

use super::found_or_exit;
use super::helpers::{format_totals, no_neg_zero, parse_date, print_json, truncate};

pub(crate) fn cmd_remove(
    service: &TallyService,
    user: &str,
    identifier: &str,
    ledger_id: Option<String>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let ledger_id = match ledger_id {
        Some(id) => id,
        None => service.get_ledger(user, parse_date(date)?)?.id,
    };

    let ledger = found_or_exit(service.remove_entry(user, &ledger_id, identifier), json)?;

    if json {
        return print_json(&ledger);
    }

    println!("Removed entry {identifier} from {}", ledger.date);
    println!("  Day total: {}", format_totals(&ledger.totals));
    Ok(())
}

pub(crate) fn cmd_summary(
    service: &TallyService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct Summary<'a> {
        ledger: &'a Ledger,
        goals: &'a DailyGoals,
        remaining: MacroTotals,
    }

    let date = parse_date(date)?;
    let ledger = service.get_ledger(user, date)?;
    let goals = service.get_goals(user)?;
    let remaining = goals.as_totals().remaining_after(&ledger.totals);

    if json {
        return print_json(&Summary {
            ledger: &ledger,
            goals: &goals,
            remaining,
        });
    }

    if ledger.entries.is_empty() {
        eprintln!("No entries for {date}");
        process::exit(2);
    }

    println!("=== {date} ===\n");

    for &meal_type in MEAL_TYPES {
        let entries: Vec<_> = ledger
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.meal_type == meal_type)
            .collect();
        if entries.is_empty() {
            continue;
        }
        let label = meal_type.as_str().to_uppercase();
        let sub_cal = ledger.meal_totals(meal_type).calories;
        println!("  {label} ({sub_cal:.0} kcal)");
        for (idx, e) in entries {
            let what = truncate(e.source_ref.as_deref().unwrap_or(e.source_kind.as_str()), 30);
            let n = &e.nutrition;
            println!(
                "    [{idx}] {what} x{qty} | {cal:.0} kcal | P:{p:.0}g C:{c:.0}g F:{f:.0}g  ({id})",
                qty = e.quantity,
                cal = n.calories,
                p = n.protein,
                c = n.carbs,
                f = n.fat,
                id = e.id,
            );
        }
        println!();
    }

    println!("  TOTAL: {}", format_totals(&ledger.totals));
    println!("  GOAL ({}): {}", goal_source(&goals), format_totals(&goals.as_totals()));
    println!("  REMAINING: {}", format_totals(&remaining));

    Ok(())
}

fn goal_source(goals: &DailyGoals) -> &'static str {
    match goals.source {
        GoalSource::Manual => "manual",
        GoalSource::Derived => "derived",
    }
}

pub(crate) fn cmd_history(
    service: &TallyService,
    user: &str,
    days: u32,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Entries")]
        entries: usize,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let end = parse_date(end)?;
    let ledgers = service.ledger_history(user, end, days)?;

    if json {
        return print_json(&ledgers);
    }

    if ledgers.is_empty() {
        eprintln!("No ledgers in the {days} days up to {end}");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = ledgers
        .iter()
        .map(|l| {
            let t = &l.totals;
            HistoryRow {
                date: l.date.to_string(),
                entries: l.entries.len(),
                calories: format!("{:.0}", no_neg_zero(t.calories)),
                protein: format!("{:.0}g", no_neg_zero(t.protein)),
                carbs: format!("{:.0}g", no_neg_zero(t.carbs)),
                fat: format!("{:.0}g", no_neg_zero(t.fat)),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
