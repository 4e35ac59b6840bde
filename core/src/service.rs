use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use rand::Rng;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, TallyError};
use crate::events::{Broadcaster, LedgerEvent, LogNotifier, MealNotifier, NoopBroadcaster};
use crate::goals::{resolve_goals, validate_manual_goals};
use crate::meal_plan;
use crate::models::{
    AddEntryOutcome, DailyGoals, HealthProfile, Ingredient, Ledger, LogRequest, ManualGoalPayload,
    MealPlan, MealSummary, MealType, NewIngredient, NewRecipe, Recipe, validate_ingredient_data,
    validate_profile, validate_recipe_data,
};
use crate::normalizer::normalize;

pub const MAX_HISTORY_DAYS: u32 = 366;

/// Entry point for every ledger, goal, and planning operation.
///
/// Owns the database connection. Broadcast and notification hooks run after
/// the write has committed; their failures are logged, never returned.
pub struct TallyService {
    db: Database,
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Arc<dyn MealNotifier>,
}

impl TallyService {
    pub fn new(db_path: &str) -> anyhow::Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self::from_database(db))
    }

    pub fn new_in_memory() -> anyhow::Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            broadcaster: Arc::new(NoopBroadcaster),
            notifier: Arc::new(LogNotifier),
        }
    }

    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn MealNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    // --- Ledger ---

    /// Normalize `request` into an entry and append it to the user's ledger
    /// for `request.date` (today when absent).
    pub fn add_entry(&self, user_id: &str, request: &LogRequest) -> Result<AddEntryOutcome> {
        check_user(user_id)?;
        let entry = normalize(request, &self.db)?;
        let date = request.date.unwrap_or_else(today);
        let ledger = self.db.insert_entry(user_id, date, &entry)?;

        tracing::info!(
            user_id,
            ledger_id = %ledger.id,
            entry_id = %entry.id,
            source_kind = %entry.source_kind,
            calories = entry.nutrition.calories,
            "logged entry"
        );
        self.publish(
            user_id,
            &LedgerEvent::Add {
                ledger: ledger.clone(),
                entry: entry.clone(),
            },
        );
        Ok(AddEntryOutcome { ledger, entry })
    }

    /// Remove the entry `identifier` (id, source ref, or index) from one of
    /// the user's ledgers.
    pub fn remove_entry(&self, user_id: &str, ledger_id: &str, identifier: &str) -> Result<Ledger> {
        check_user(user_id)?;
        let (ledger, removed) = self.db.remove_entry(user_id, ledger_id, identifier)?;

        tracing::info!(
            user_id,
            ledger_id,
            entry_id = %removed.id,
            remaining = ledger.entries.len(),
            "removed entry"
        );
        self.publish(
            user_id,
            &LedgerEvent::Remove {
                ledger: ledger.clone(),
                removed_id: removed.id,
            },
        );
        Ok(ledger)
    }

    pub fn get_ledger(&self, user_id: &str, date: NaiveDate) -> Result<Ledger> {
        check_user(user_id)?;
        Ok(self.db.get_or_create_ledger(user_id, date)?)
    }

    pub fn ledger_history(&self, user_id: &str, end: NaiveDate, days: u32) -> Result<Vec<Ledger>> {
        check_user(user_id)?;
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(TallyError::validation(format!(
                "days must be between 1 and {MAX_HISTORY_DAYS}"
            )));
        }
        Ok(self.db.ledger_history(user_id, end, days)?)
    }

    fn publish(&self, user_id: &str, event: &LedgerEvent) {
        if let Err(e) = self.broadcaster.publish(user_id, event) {
            tracing::warn!(user_id, event = event.kind(), error = %e, "ledger broadcast failed");
        }
    }

    // --- Goals ---

    pub fn get_goals(&self, user_id: &str) -> Result<DailyGoals> {
        check_user(user_id)?;
        let goal = self.db.get_goal(user_id)?;
        let profile = self.db.get_profile(user_id)?;
        Ok(resolve_goals(goal.as_ref(), profile.as_ref()))
    }

    /// Store a manual override and return the goals now in effect.
    pub fn set_goals(&self, user_id: &str, payload: &ManualGoalPayload) -> Result<DailyGoals> {
        check_user(user_id)?;
        validate_manual_goals(payload)?;
        self.db.set_manual_goal(user_id, payload)?;
        tracing::info!(user_id, calories = payload.calories, "manual goal set");
        self.get_goals(user_id)
    }

    /// Turn the manual override off; goals fall back to the profile.
    pub fn clear_goals(&self, user_id: &str) -> Result<DailyGoals> {
        check_user(user_id)?;
        if self.db.clear_manual_goal(user_id)? {
            tracing::info!(user_id, "manual goal cleared");
        }
        self.get_goals(user_id)
    }

    // --- Profile ---

    pub fn get_profile(&self, user_id: &str) -> Result<HealthProfile> {
        check_user(user_id)?;
        Ok(self.db.get_profile(user_id)?.unwrap_or_default())
    }

    pub fn set_profile(&self, user_id: &str, profile: &HealthProfile) -> Result<HealthProfile> {
        check_user(user_id)?;
        validate_profile(profile).map_err(invalid)?;
        let stored = self.db.set_profile(user_id, profile)?;
        tracing::info!(user_id, "health profile updated");
        Ok(stored)
    }

    // --- Meal plans ---

    pub fn generate_meal_plan(&self, user_id: &str, date: NaiveDate) -> Result<MealPlan> {
        self.generate_meal_plan_with_rng(user_id, date, &mut rand::rng())
    }

    /// Build and store a plan for `date`, overwriting any earlier plan.
    pub fn generate_meal_plan_with_rng<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        date: NaiveDate,
        rng: &mut R,
    ) -> Result<MealPlan> {
        check_user(user_id)?;
        let goals = self.get_goals(user_id)?;
        let profile = self.db.get_profile(user_id)?.unwrap_or_default();
        let pool = self.db.list_ingredients(None)?;

        let draft =
            meal_plan::generate_meal_plan(goals.calories, pool, &profile.health_conditions, rng)?;

        let mut plan = MealPlan {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            date,
            target_calories: goals.calories,
            meals: draft.meals,
            total: draft.total,
            generated_at: Local::now().to_rfc3339(),
            replaced_existing: false,
        };
        plan.replaced_existing = self.db.upsert_meal_plan(&plan)?;

        tracing::info!(
            user_id,
            %date,
            target_calories = plan.target_calories,
            planned_calories = plan.total.calories,
            replaced = plan.replaced_existing,
            "meal plan generated"
        );
        Ok(plan)
    }

    pub fn get_meal_plan(&self, user_id: &str, date: NaiveDate) -> Result<MealPlan> {
        check_user(user_id)?;
        self.db
            .get_meal_plan(user_id, date)?
            .ok_or_else(|| TallyError::not_found(format!("No meal plan for {date}")))
    }

    // --- Finalize ---

    /// Summarize consumption against goals after a meal and hand the summary
    /// to the notifier.
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize_meal(
        &self,
        user_id: &str,
        meal_type: MealType,
        date: NaiveDate,
    ) -> Result<MealSummary> {
        check_user(user_id)?;
        let ledger = self.db.get_or_create_ledger(user_id, date)?;
        let daily_goals = self.get_goals(user_id)?;

        let consumed = ledger.totals;
        let summary = MealSummary {
            user_id: user_id.to_string(),
            meal_type,
            date,
            meal_consumed: ledger.meal_totals(meal_type),
            consumed,
            remaining: daily_goals.as_totals().remaining_after(&consumed),
            exceeded: consumed.calories > daily_goals.calories as f64,
            daily_goals,
        };

        if let Err(e) = self.notifier.notify(&summary) {
            tracing::warn!(user_id, %meal_type, error = %e, "meal notification failed");
        }
        Ok(summary)
    }

    // --- Catalog ---

    pub fn add_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        validate_ingredient_data(ingredient).map_err(invalid)?;
        let stored = self.db.insert_ingredient(ingredient)?;
        tracing::info!(id = %stored.id, name = %stored.name, "ingredient added");
        Ok(stored)
    }

    pub fn list_ingredients(&self, category: Option<&str>) -> Result<Vec<Ingredient>> {
        Ok(self.db.list_ingredients(category)?)
    }

    pub fn add_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        validate_recipe_data(recipe).map_err(invalid)?;
        let stored = self.db.insert_recipe(recipe)?;
        tracing::info!(id = %stored.id, name = %stored.name, "recipe added");
        Ok(stored)
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        Ok(self.db.list_recipes()?)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn invalid(err: anyhow::Error) -> TallyError {
    TallyError::validation(format!("{err:#}"))
}

fn check_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(TallyError::validation("user id must not be empty"));
    }
    Ok(())
}
