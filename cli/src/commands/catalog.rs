use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tally_core::TallyService;
use tally_core::models::{NewIngredient, NewRecipe, Nutrition};

use super::NutritionArgs;
use super::helpers::{print_json, truncate};

#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Calories")]
    calories: String,
    #[tabled(rename = "Protein")]
    protein: String,
    #[tabled(rename = "Carbs")]
    carbs: String,
    #[tabled(rename = "Fat")]
    fat: String,
}

impl CatalogRow {
    fn new(id: &str, name: String, n: &Nutrition) -> Self {
        Self {
            id: id.to_string(),
            name,
            calories: format!("{:.0}", n.calories),
            protein: format!("{:.1}g", n.protein),
            carbs: format!("{:.1}g", n.carbs),
            fat: format!("{:.1}g", n.fat),
        }
    }
}

fn print_rows(rows: &[CatalogRow]) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_ingredient_add(
    service: &TallyService,
    name: &str,
    category: &str,
    tags: Vec<String>,
    nutrition: &NutritionArgs,
    json: bool,
) -> Result<()> {
    let ingredient = service.add_ingredient(&NewIngredient {
        name: name.to_string(),
        category: category.to_string(),
        tags,
        nutrition: nutrition.to_nutrition(),
    })?;

    if json {
        return print_json(&ingredient);
    }
    let cal = ingredient.nutrition.calories;
    println!(
        "Added ingredient {} ({}, {cal:.0} kcal per unit)",
        ingredient.name, ingredient.category
    );
    println!("  ID: {}", ingredient.id);
    if !ingredient.tags.is_empty() {
        println!("  Tags: {}", ingredient.tags.join(", "));
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(
    service: &TallyService,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let ingredients = service.list_ingredients(category)?;

    if json {
        return print_json(&ingredients);
    }
    if ingredients.is_empty() {
        eprintln!("No ingredients found");
        process::exit(2);
    }

    let rows: Vec<CatalogRow> = ingredients
        .iter()
        .map(|i| {
            let name = truncate(&format!("{} [{}]", i.name, i.category), 40);
            CatalogRow::new(&i.id, name, &i.nutrition)
        })
        .collect();
    print_rows(&rows);
    Ok(())
}

pub(crate) fn cmd_recipe_add(
    service: &TallyService,
    name: &str,
    nutrition: &NutritionArgs,
    json: bool,
) -> Result<()> {
    let recipe = service.add_recipe(&NewRecipe {
        name: name.to_string(),
        nutrition: nutrition.to_nutrition(),
    })?;

    if json {
        return print_json(&recipe);
    }
    let cal = recipe.nutrition.calories;
    println!("Added recipe {} ({cal:.0} kcal per serving)", recipe.name);
    println!("  ID: {}", recipe.id);
    Ok(())
}

pub(crate) fn cmd_recipe_list(service: &TallyService, json: bool) -> Result<()> {
    let recipes = service.list_recipes()?;

    if json {
        return print_json(&recipes);
    }
    if recipes.is_empty() {
        eprintln!("No recipes found");
        process::exit(2);
    }

    let rows: Vec<CatalogRow> = recipes
        .iter()
        .map(|r| CatalogRow::new(&r.id, truncate(&r.name, 40), &r.nutrition))
        .collect();
    print_rows(&rows);
    Ok(())
}
