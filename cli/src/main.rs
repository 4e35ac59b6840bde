mod commands;
mod config;
mod realtime;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    NutritionArgs, cmd_finalize, cmd_goals_clear, cmd_goals_set, cmd_goals_show, cmd_history,
    cmd_ingredient_add, cmd_ingredient_list, cmd_log, cmd_plan_generate, cmd_plan_show,
    cmd_profile_set, cmd_profile_show, cmd_recipe_add, cmd_recipe_list, cmd_remove, cmd_summary,
};
use crate::config::Config;
use crate::realtime::TopicHub;
use tally_core::TallyService;
use tally_core::models::ManualGoalPayload;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "A per-user nutrition ledger with goals and meal planning"
)]
struct Cli {
    /// User to act as (default: $TALLY_USER or "default")
    #[arg(short, long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log an entry to a day's ledger
    Log {
        /// Source kind: catalog_ingredient, recipe, scanned, manual
        kind: String,
        /// Catalog ingredient or recipe ID (or barcode for scanned items)
        source_ref: Option<String>,
        /// Number of units or servings
        #[arg(short, long, default_value = "1")]
        quantity: f64,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Date to log for (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        nutrition: NutritionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an entry by entry ID, catalog ID, or position
    Remove {
        /// Entry ID, source ref, or zero-based position in the ledger
        identifier: String,
        /// Ledger ID (default: the ledger for --date)
        #[arg(long)]
        ledger: Option<String>,
        /// Date of the ledger (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a day's entries, totals, and remaining budget
    Summary {
        /// Date (YYYY-MM-DD, today, yesterday; default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily totals for recent days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Last day of the window (YYYY-MM-DD, default: today)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage daily nutrition goals
    Goals {
        #[command(subcommand)]
        command: GoalsCommands,
    },
    /// Manage the health profile used to derive goals
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Generate or show a daily meal plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Close out a meal and report consumption against the daily goal
    Finalize {
        /// Meal type: breakfast, lunch, dinner, snack
        meal: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage catalog ingredients
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage catalog recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GoalsCommands {
    /// Show the goals in effect
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set manual goals (macros left unset are derived from calories)
    Set {
        /// Daily calories (kcal)
        calories: i64,
        /// Protein (g)
        #[arg(long)]
        protein: Option<i64>,
        /// Carbohydrates (g)
        #[arg(long)]
        carbs: Option<i64>,
        /// Fat (g)
        #[arg(long)]
        fat: Option<i64>,
        /// Fiber (g)
        #[arg(long)]
        fiber: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop manual goals and fall back to derived ones
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the health profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update the health profile (unset flags keep their value)
    Set {
        /// Body weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Age in years
        #[arg(long)]
        age: Option<u32>,
        /// Activity level: sedentary, light, moderate, active, very_active
        #[arg(long)]
        activity: Option<String>,
        /// Health condition (repeatable, e.g. --condition diabetes)
        #[arg(long = "condition")]
        conditions: Vec<String>,
        /// Remove all stored conditions before adding new ones
        #[arg(long)]
        clear_conditions: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Generate a plan, replacing any plan for the same date
    Generate {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored plan for a date
    Show {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient (nutrition is per unit)
    Add {
        /// Ingredient name
        name: String,
        /// Category (e.g. protein, grain, vegetable)
        #[arg(short, long)]
        category: String,
        /// Tag (repeatable, e.g. --tag diabetes-friendly)
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[command(flatten)]
        nutrition: NutritionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List ingredients
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Add a recipe (nutrition is per serving)
    Add {
        /// Recipe name
        name: String,
        #[command(flatten)]
        nutrition: NutritionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TALLY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config.db_path.to_string_lossy();
    let service = TallyService::new(&db_path)
        .with_context(|| format!("Failed to open ledger database at {db_path}"))?;
    let user = cli.user.unwrap_or_else(|| config.user_id.clone());
    let user = user.as_str();

    match cli.command {
        Commands::Log {
            kind,
            source_ref,
            quantity,
            meal,
            date,
            nutrition,
            json,
        } => cmd_log(
            &service, user, &kind, source_ref, quantity, &meal, date, &nutrition, json,
        ),
        Commands::Remove {
            identifier,
            ledger,
            date,
            json,
        } => cmd_remove(&service, user, &identifier, ledger, date, json),
        Commands::Summary { date, json } => cmd_summary(&service, user, date, json),
        Commands::History { days, end, json } => cmd_history(&service, user, days, end, json),
        Commands::Goals { command } => match command {
            GoalsCommands::Show { json } => cmd_goals_show(&service, user, json),
            GoalsCommands::Set {
                calories,
                protein,
                carbs,
                fat,
                fiber,
                json,
            } => {
                let payload = ManualGoalPayload {
                    calories,
                    protein,
                    carbs,
                    fat,
                    fiber,
                };
                cmd_goals_set(&service, user, &payload, json)
            }
            GoalsCommands::Clear { json } => cmd_goals_clear(&service, user, json),
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&service, user, json),
            ProfileCommands::Set {
                weight,
                height,
                age,
                activity,
                conditions,
                clear_conditions,
                json,
            } => cmd_profile_set(
                &service,
                user,
                weight,
                height,
                age,
                activity.as_deref(),
                conditions,
                clear_conditions,
                json,
            ),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Generate { date, json } => cmd_plan_generate(&service, user, date, json),
            PlanCommands::Show { date, json } => cmd_plan_show(&service, user, date, json),
        },
        Commands::Finalize { meal, date, json } => cmd_finalize(&service, user, &meal, date, json),
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                name,
                category,
                tags,
                nutrition,
                json,
            } => cmd_ingredient_add(&service, &name, &category, tags, &nutrition, json),
            IngredientCommands::List { category, json } => {
                cmd_ingredient_list(&service, category.as_deref(), json)
            }
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Add {
                name,
                nutrition,
                json,
            } => cmd_recipe_add(&service, &name, &nutrition, json),
            RecipeCommands::List { json } => cmd_recipe_list(&service, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, created) = config.load_or_create_api_key()?;
                if created {
                    eprintln!(
                        "Generated API key: {key}\nStored in {}",
                        config.data_dir.join("api_key").display()
                    );
                }
                Some(key)
            };
            let hub = Arc::new(TopicHub::default());
            let service = service.with_broadcaster(hub.clone());
            server::start_server(service, hub, port, &bind, api_key).await
        }
    }
}
