use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::TallyError;
use crate::models::{
    ActivityLevel, Entry, Goal, HealthProfile, Ingredient, Ledger, MacroTotals, ManualGoalPayload,
    MealPlan, NewIngredient, NewRecipe, Nutrition, Recipe,
};
use crate::normalizer::CatalogLookup;
use crate::resolver::resolve_entry;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ledgers (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    total_calories REAL NOT NULL DEFAULT 0,
                    total_protein REAL NOT NULL DEFAULT 0,
                    total_carbs REAL NOT NULL DEFAULT 0,
                    total_fat REAL NOT NULL DEFAULT 0,
                    total_fiber REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(user_id, date)
                );

                CREATE TABLE IF NOT EXISTS ledger_entries (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    ledger_id TEXT NOT NULL REFERENCES ledgers(id),
                    source_kind TEXT NOT NULL,
                    source_ref TEXT,
                    quantity REAL NOT NULL,
                    meal_type TEXT NOT NULL,
                    calories REAL NOT NULL,
                    protein REAL NOT NULL,
                    carbs REAL NOT NULL,
                    fat REAL NOT NULL,
                    fiber REAL NOT NULL,
                    sugar REAL NOT NULL,
                    sodium REAL NOT NULL,
                    logged_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_ledger_entries_ledger ON ledger_entries(ledger_id, seq);
                CREATE INDEX IF NOT EXISTS idx_ledgers_user_date ON ledgers(user_id, date);

                CREATE TABLE IF NOT EXISTS goals (
                    user_id TEXT PRIMARY KEY,
                    calories INTEGER,
                    protein INTEGER,
                    carbs INTEGER,
                    fat INTEGER,
                    fiber INTEGER,
                    use_manual INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS profiles (
                    user_id TEXT PRIMARY KEY,
                    weight_kg REAL,
                    height_cm REAL,
                    age INTEGER,
                    activity_level TEXT,
                    health_conditions TEXT NOT NULL DEFAULT '[]',
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    tags TEXT NOT NULL DEFAULT '[]',
                    calories REAL NOT NULL,
                    protein REAL NOT NULL,
                    carbs REAL NOT NULL,
                    fat REAL NOT NULL,
                    fiber REAL NOT NULL,
                    sugar REAL NOT NULL,
                    sodium REAL NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    calories REAL NOT NULL,
                    protein REAL NOT NULL,
                    carbs REAL NOT NULL,
                    fat REAL NOT NULL,
                    fiber REAL NOT NULL,
                    sugar REAL NOT NULL,
                    sodium REAL NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meal_plans (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    plan TEXT NOT NULL,
                    generated_at TEXT NOT NULL,
                    UNIQUE(user_id, date)
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_category ON ingredients(category);

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects columns:
    // 0: id, 1: user_id, 2: date, 3..=7: totals, 8: created_at, 9: updated_at
    fn ledger_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ledger> {
        Ok(Ledger {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: date_column(row, 2)?,
            entries: Vec::new(),
            totals: MacroTotals {
                calories: row.get(3)?,
                protein: row.get(4)?,
                carbs: row.get(5)?,
                fat: row.get(6)?,
                fiber: row.get(7)?,
            },
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // Expects columns:
    // 0: id, 1: source_kind, 2: source_ref, 3: quantity, 4: meal_type,
    // 5..=11: nutrition, 12: logged_at
    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        Ok(Entry {
            id: row.get(0)?,
            source_kind: parsed_column(row, 1)?,
            source_ref: row.get(2)?,
            quantity: row.get(3)?,
            meal_type: parsed_column(row, 4)?,
            nutrition: nutrition_columns(row, 5)?,
            logged_at: row.get(12)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            tags: json_column(row, 3)?,
            nutrition: nutrition_columns(row, 4)?,
            created_at: row.get(11)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            nutrition: nutrition_columns(row, 2)?,
            created_at: row.get(9)?,
        })
    }

    fn entries_for(conn: &Connection, ledger_id: &str) -> rusqlite::Result<Vec<Entry>> {
        let mut stmt = conn.prepare(
            "SELECT id, source_kind, source_ref, quantity, meal_type,
                    calories, protein, carbs, fat, fiber, sugar, sodium, logged_at
             FROM ledger_entries
             WHERE ledger_id = ?1
             ORDER BY seq",
        )?;
        let entries = stmt
            .query_map(params![ledger_id], Self::entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn with_entries(&self, mut ledger: Ledger) -> Result<Ledger> {
        ledger.entries = Self::entries_for(&self.conn, &ledger.id)?;
        Ok(ledger)
    }

    // --- Ledgers ---

    fn ensure_ledger(conn: &Connection, user_id: &str, date: NaiveDate) -> Result<String> {
        let now = Local::now().to_rfc3339();
        let date_str = date.format(DATE_FORMAT).to_string();
        conn.execute(
            "INSERT OR IGNORE INTO ledgers (id, user_id, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![Uuid::new_v4().to_string(), user_id, date_str, now],
        )?;
        conn.query_row(
            "SELECT id FROM ledgers WHERE user_id = ?1 AND date = ?2",
            params![user_id, date_str],
            |row| row.get(0),
        )
        .context("Ledger not found after insert")
    }

    /// Fetch the ledger for `(user_id, date)`, creating an empty one if absent.
    pub fn get_or_create_ledger(&self, user_id: &str, date: NaiveDate) -> Result<Ledger> {
        let id = Self::ensure_ledger(&self.conn, user_id, date)?;
        self.get_ledger_by_id(&id)
    }

    pub fn get_ledger_by_id(&self, ledger_id: &str) -> Result<Ledger> {
        let ledger = self
            .conn
            .query_row(
                "SELECT id, user_id, date, total_calories, total_protein, total_carbs,
                        total_fat, total_fiber, created_at, updated_at
                 FROM ledgers WHERE id = ?1",
                params![ledger_id],
                Self::ledger_from_row,
            )
            .context("Ledger not found")?;
        self.with_entries(ledger)
    }

    pub fn find_ledger(&self, user_id: &str, date: NaiveDate) -> Result<Option<Ledger>> {
        let ledger = self
            .conn
            .query_row(
                "SELECT id, user_id, date, total_calories, total_protein, total_carbs,
                        total_fat, total_fiber, created_at, updated_at
                 FROM ledgers WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.format(DATE_FORMAT).to_string()],
                Self::ledger_from_row,
            )
            .optional()?;
        ledger.map(|l| self.with_entries(l)).transpose()
    }

    /// Append an entry and bump the ledger totals in one transaction.
    pub fn insert_entry(&self, user_id: &str, date: NaiveDate, entry: &Entry) -> Result<Ledger> {
        let tx = self.conn.unchecked_transaction()?;
        let ledger_id = Self::ensure_ledger(&tx, user_id, date)?;
        let n = &entry.nutrition;
        tx.execute(
            "INSERT INTO ledger_entries (id, ledger_id, source_kind, source_ref, quantity, meal_type,
                                         calories, protein, carbs, fat, fiber, sugar, sodium, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                entry.id,
                ledger_id,
                entry.source_kind.as_str(),
                entry.source_ref,
                entry.quantity,
                entry.meal_type.as_str(),
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                n.sugar,
                n.sodium,
                entry.logged_at,
            ],
        )?;
        tx.execute(
            "UPDATE ledgers SET
                total_calories = total_calories + ?1,
                total_protein = total_protein + ?2,
                total_carbs = total_carbs + ?3,
                total_fat = total_fat + ?4,
                total_fiber = total_fiber + ?5,
                updated_at = ?6
             WHERE id = ?7",
            params![
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                Local::now().to_rfc3339(),
                ledger_id
            ],
        )?;
        tx.commit()?;
        self.get_ledger_by_id(&ledger_id)
    }

    /// Resolve `identifier` within the user's ledger, delete the entry, and
    /// decrement totals. Totals snap back to zero when the ledger empties.
    ///
    /// Returns the updated ledger and the removed entry.
    pub fn remove_entry(
        &self,
        user_id: &str,
        ledger_id: &str,
        identifier: &str,
    ) -> crate::error::Result<(Ledger, Entry)> {
        let tx = self.conn.unchecked_transaction()?;
        let owned: Option<String> = tx
            .query_row(
                "SELECT id FROM ledgers WHERE id = ?1 AND user_id = ?2",
                params![ledger_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if owned.is_none() {
            return Err(TallyError::not_found(format!(
                "Ledger '{ledger_id}' not found"
            )));
        }

        let entries = Self::entries_for(&tx, ledger_id)?;
        let resolved = resolve_entry(&entries, identifier)?;
        let removed = entries[resolved.index].clone();

        tx.execute(
            "DELETE FROM ledger_entries WHERE id = ?1",
            params![removed.id],
        )?;
        let now = Local::now().to_rfc3339();
        if entries.len() == 1 {
            tx.execute(
                "UPDATE ledgers SET total_calories = 0, total_protein = 0, total_carbs = 0,
                        total_fat = 0, total_fiber = 0, updated_at = ?1
                 WHERE id = ?2",
                params![now, ledger_id],
            )?;
        } else {
            let n = &removed.nutrition;
            tx.execute(
                "UPDATE ledgers SET
                    total_calories = total_calories - ?1,
                    total_protein = total_protein - ?2,
                    total_carbs = total_carbs - ?3,
                    total_fat = total_fat - ?4,
                    total_fiber = total_fiber - ?5,
                    updated_at = ?6
                 WHERE id = ?7",
                params![n.calories, n.protein, n.carbs, n.fat, n.fiber, now, ledger_id],
            )?;
        }
        tx.commit()?;

        let ledger = self.get_ledger_by_id(ledger_id)?;
        Ok((ledger, removed))
    }

    /// Existing ledgers for the `days` ending at `end`, newest first.
    pub fn ledger_history(&self, user_id: &str, end: NaiveDate, days: u32) -> Result<Vec<Ledger>> {
        let start = end - Duration::days(i64::from(days.saturating_sub(1)));
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, total_calories, total_protein, total_carbs,
                    total_fat, total_fiber, created_at, updated_at
             FROM ledgers
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date DESC",
        )?;
        let ledgers = stmt
            .query_map(
                params![
                    user_id,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                Self::ledger_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        ledgers.into_iter().map(|l| self.with_entries(l)).collect()
    }

    // --- Goals ---

    pub fn get_goal(&self, user_id: &str) -> Result<Option<Goal>> {
        let goal = self
            .conn
            .query_row(
                "SELECT calories, protein, carbs, fat, fiber, use_manual, updated_at
                 FROM goals WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Goal {
                        calories: row.get(0)?,
                        protein: row.get(1)?,
                        carbs: row.get(2)?,
                        fat: row.get(3)?,
                        fiber: row.get(4)?,
                        use_manual: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(goal)
    }

    pub fn set_manual_goal(&self, user_id: &str, payload: &ManualGoalPayload) -> Result<Goal> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO goals (user_id, calories, protein, carbs, fat, fiber, use_manual, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                calories = excluded.calories,
                protein = excluded.protein,
                carbs = excluded.carbs,
                fat = excluded.fat,
                fiber = excluded.fiber,
                use_manual = 1,
                updated_at = excluded.updated_at",
            params![
                user_id,
                payload.calories,
                payload.protein,
                payload.carbs,
                payload.fat,
                payload.fiber,
                now,
            ],
        )?;
        self.get_goal(user_id)?.context("Goal not found after upsert")
    }

    /// Switch the manual override off. Returns false when nothing was stored.
    pub fn clear_manual_goal(&self, user_id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE goals SET use_manual = 0, updated_at = ?1 WHERE user_id = ?2",
            params![Local::now().to_rfc3339(), user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Profiles ---

    pub fn get_profile(&self, user_id: &str) -> Result<Option<HealthProfile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT weight_kg, height_cm, age, activity_level, health_conditions
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let activity: Option<String> = row.get(3)?;
                    let activity_level: Option<ActivityLevel> = activity
                        .map(|a| a.parse())
                        .transpose()
                        .map_err(|e: anyhow::Error| conversion_error(3, e))?;
                    Ok(HealthProfile {
                        weight_kg: row.get(0)?,
                        height_cm: row.get(1)?,
                        age: row.get(2)?,
                        activity_level,
                        health_conditions: json_column(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    pub fn set_profile(&self, user_id: &str, profile: &HealthProfile) -> Result<HealthProfile> {
        let conditions = serde_json::to_string(&profile.health_conditions)?;
        self.conn.execute(
            "INSERT INTO profiles (user_id, weight_kg, height_cm, age, activity_level, health_conditions, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                weight_kg = excluded.weight_kg,
                height_cm = excluded.height_cm,
                age = excluded.age,
                activity_level = excluded.activity_level,
                health_conditions = excluded.health_conditions,
                updated_at = excluded.updated_at",
            params![
                user_id,
                profile.weight_kg,
                profile.height_cm,
                profile.age,
                profile.activity_level.map(|a| a.as_str()),
                conditions,
                Local::now().to_rfc3339(),
            ],
        )?;
        self.get_profile(user_id)?
            .context("Profile not found after upsert")
    }

    // --- Catalog ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let id = Uuid::new_v4().to_string();
        let n = &ingredient.nutrition;
        let tags: Vec<String> = ingredient
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.conn.execute(
            "INSERT INTO ingredients (id, name, category, tags, calories, protein, carbs, fat, fiber, sugar, sodium, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                ingredient.name.trim(),
                ingredient.category.trim().to_lowercase(),
                serde_json::to_string(&tags)?,
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                n.sugar,
                n.sodium,
                Local::now().to_rfc3339(),
            ],
        )?;
        self.get_ingredient(&id)?.context("Ingredient not found")
    }

    pub fn get_ingredient(&self, id: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                "SELECT * FROM ingredients WHERE id = ?1",
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn list_ingredients(&self, category: Option<&str>) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM ingredients
             WHERE ?1 IS NULL OR category = lower(?1)
             ORDER BY name",
        )?;
        let ingredients = stmt
            .query_map(params![category], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let id = Uuid::new_v4().to_string();
        let n = &recipe.nutrition;
        self.conn.execute(
            "INSERT INTO recipes (id, name, calories, protein, carbs, fat, fiber, sugar, sodium, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                recipe.name.trim(),
                n.calories,
                n.protein,
                n.carbs,
                n.fat,
                n.fiber,
                n.sugar,
                n.sodium,
                Local::now().to_rfc3339(),
            ],
        )?;
        self.get_recipe(&id)?.context("Recipe not found")
    }

    pub fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                "SELECT * FROM recipes WHERE id = ?1",
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare("SELECT * FROM recipes ORDER BY name")?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    // --- Meal plans ---

    /// Store `plan`, replacing any plan for the same user and date. Returns
    /// true when an earlier plan was overwritten; the stored record carries
    /// the same flag.
    pub fn upsert_meal_plan(&self, plan: &MealPlan) -> Result<bool> {
        let date_str = plan.date.format(DATE_FORMAT).to_string();
        let tx = self.conn.unchecked_transaction()?;
        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM meal_plans WHERE user_id = ?1 AND date = ?2)",
            params![plan.user_id, date_str],
            |row| row.get(0),
        )?;
        let stored = MealPlan {
            replaced_existing: existed,
            ..plan.clone()
        };
        tx.execute(
            "INSERT INTO meal_plans (id, user_id, date, plan, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, date) DO UPDATE SET
                id = excluded.id,
                plan = excluded.plan,
                generated_at = excluded.generated_at",
            params![
                plan.id,
                plan.user_id,
                date_str,
                serde_json::to_string(&stored)?,
                plan.generated_at,
            ],
        )?;
        tx.commit()?;
        Ok(existed)
    }

    pub fn get_meal_plan(&self, user_id: &str, date: NaiveDate) -> Result<Option<MealPlan>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT plan FROM meal_plans WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.format(DATE_FORMAT).to_string()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).context("Corrupt meal plan record"))
            .transpose()
    }
}

impl CatalogLookup for Database {
    fn ingredient_nutrition(&self, id: &str) -> Result<Option<Nutrition>> {
        Ok(self.get_ingredient(id)?.map(|i| i.nutrition))
    }

    fn recipe_nutrition(&self, id: &str) -> Result<Option<Nutrition>> {
        Ok(self.get_recipe(id)?.map(|r| r.nutrition))
    }
}

// --- Column decoding ---

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parsed_column<T: FromStr<Err = anyhow::Error>>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| conversion_error(idx, e))
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

// Seven consecutive columns: calories, protein, carbs, fat, fiber, sugar, sodium.
fn nutrition_columns(row: &rusqlite::Row, start: usize) -> rusqlite::Result<Nutrition> {
    Ok(Nutrition {
        calories: row.get(start)?,
        protein: row.get(start + 1)?,
        carbs: row.get(start + 2)?,
        fat: row.get(start + 3)?,
        fiber: row.get(start + 4)?,
        sugar: row.get(start + 5)?,
        sodium: row.get(start + 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealType, PlannedMeal, SourceKind};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn entry(id: &str, source_ref: Option<&str>, calories: f64) -> Entry {
        Entry {
            id: id.to_string(),
            source_kind: SourceKind::CatalogIngredient,
            source_ref: source_ref.map(str::to_string),
            quantity: 1.0,
            meal_type: MealType::Breakfast,
            nutrition: Nutrition {
                calories,
                protein: calories / 25.0,
                carbs: calories / 10.0,
                fat: calories / 50.0,
                fiber: 1.0,
                sugar: 2.0,
                sodium: 3.0,
            },
            logged_at: Local::now().to_rfc3339(),
        }
    }

    fn oats() -> NewIngredient {
        NewIngredient {
            name: "Oats".to_string(),
            category: "Grains".to_string(),
            tags: vec!["Breakfast".to_string(), "diabetes-friendly".to_string()],
            nutrition: Nutrition {
                calories: 150.0,
                protein: 5.0,
                carbs: 27.0,
                fat: 3.0,
                fiber: 4.0,
                sugar: 1.0,
                sodium: 0.0,
            },
        }
    }

    #[test]
    fn test_get_or_create_ledger_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = db.get_or_create_ledger("alice", day()).unwrap();
        let b = db.get_or_create_ledger("alice", day()).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.entries.is_empty());
        assert_eq!(a.totals, MacroTotals::ZERO);

        let other = db.get_or_create_ledger("bob", day()).unwrap();
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_insert_entry_increments_totals() {
        let db = Database::open_in_memory().unwrap();
        db.insert_entry("alice", day(), &entry("e1", Some("oats"), 100.0))
            .unwrap();
        let ledger = db
            .insert_entry("alice", day(), &entry("e2", Some("milk"), 50.0))
            .unwrap();

        assert_eq!(ledger.entry_ids(), vec!["e1", "e2"]);
        assert!((ledger.totals.calories - 150.0).abs() < 1e-9);
        assert!((ledger.totals.protein - 6.0).abs() < 1e-9);
        assert!((ledger.totals.fiber - 2.0).abs() < 1e-9);
        assert_eq!(ledger.entries[0].nutrition.sodium, 3.0);
    }

    #[test]
    fn test_remove_entry_decrements_and_resets() {
        let db = Database::open_in_memory().unwrap();
        db.insert_entry("alice", day(), &entry("e1", Some("oats"), 100.0))
            .unwrap();
        let ledger = db
            .insert_entry("alice", day(), &entry("e2", None, 30.0))
            .unwrap();

        let (ledger, removed) = db.remove_entry("alice", &ledger.id, "oats").unwrap();
        assert_eq!(removed.id, "e1");
        assert_eq!(ledger.entry_ids(), vec!["e2"]);
        assert!((ledger.totals.calories - 30.0).abs() < 1e-9);

        let (ledger, removed) = db.remove_entry("alice", &ledger.id, "0").unwrap();
        assert_eq!(removed.id, "e2");
        assert!(ledger.entries.is_empty());
        assert_eq!(ledger.totals, MacroTotals::ZERO);
    }

    #[test]
    fn test_remove_entry_wrong_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ledger = db
            .insert_entry("alice", day(), &entry("e1", None, 100.0))
            .unwrap();
        let err = db.remove_entry("bob", &ledger.id, "e1").unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));

        // Nothing was removed.
        let ledger = db.get_ledger_by_id(&ledger.id).unwrap();
        assert_eq!(ledger.entries.len(), 1);
    }

    #[test]
    fn test_remove_unknown_entry_leaves_ledger_untouched() {
        let db = Database::open_in_memory().unwrap();
        let ledger = db
            .insert_entry("alice", day(), &entry("e1", None, 100.0))
            .unwrap();
        let err = db.remove_entry("alice", &ledger.id, "nope").unwrap_err();
        assert!(err.to_string().contains("e1"));
        let ledger = db.get_ledger_by_id(&ledger.id).unwrap();
        assert!((ledger.totals.calories - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ledger_history_window() {
        let db = Database::open_in_memory().unwrap();
        for offset in [0, 1, 3, 10] {
            db.get_or_create_ledger("alice", day() - Duration::days(offset))
                .unwrap();
        }
        db.get_or_create_ledger("bob", day()).unwrap();

        let history = db.ledger_history("alice", day(), 7).unwrap();
        let dates: Vec<NaiveDate> = history.iter().map(|l| l.date).collect();
        assert_eq!(
            dates,
            vec![
                day(),
                day() - Duration::days(1),
                day() - Duration::days(3)
            ]
        );
        assert_eq!(db.ledger_history("alice", day(), 1).unwrap().len(), 1);
    }

    #[test]
    fn test_goal_upsert_and_clear() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_goal("alice").unwrap().is_none());
        assert!(!db.clear_manual_goal("alice").unwrap());

        let payload = ManualGoalPayload {
            calories: 1800,
            protein: Some(140),
            carbs: None,
            fat: None,
            fiber: None,
        };
        let goal = db.set_manual_goal("alice", &payload).unwrap();
        assert_eq!(goal.calories, Some(1800));
        assert_eq!(goal.protein, Some(140));
        assert!(goal.use_manual);

        let payload = ManualGoalPayload {
            calories: 2100,
            protein: None,
            carbs: None,
            fat: None,
            fiber: None,
        };
        let goal = db.set_manual_goal("alice", &payload).unwrap();
        assert_eq!(goal.calories, Some(2100));
        assert_eq!(goal.protein, None);

        assert!(db.clear_manual_goal("alice").unwrap());
        let goal = db.get_goal("alice").unwrap().unwrap();
        assert!(!goal.use_manual);
    }

    #[test]
    fn test_profile_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_profile("alice").unwrap().is_none());
        let profile = HealthProfile {
            weight_kg: Some(70.0),
            height_cm: Some(175.0),
            age: Some(30),
            activity_level: Some(ActivityLevel::VeryActive),
            health_conditions: vec!["diabetes".to_string()],
        };
        let stored = db.set_profile("alice", &profile).unwrap();
        assert_eq!(stored, profile);
    }

    #[test]
    fn test_ingredient_catalog_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let ing = db.insert_ingredient(&oats()).unwrap();
        assert_eq!(ing.category, "grains");
        assert_eq!(ing.tags, vec!["breakfast", "diabetes-friendly"]);

        assert_eq!(db.list_ingredients(None).unwrap().len(), 1);
        assert_eq!(db.list_ingredients(Some("GRAINS")).unwrap().len(), 1);
        assert!(db.list_ingredients(Some("dairy")).unwrap().is_empty());

        let n = db.ingredient_nutrition(&ing.id).unwrap().unwrap();
        assert_eq!(n.calories, 150.0);
        assert!(db.ingredient_nutrition("missing").unwrap().is_none());
    }

    #[test]
    fn test_recipe_catalog_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db
            .insert_recipe(&NewRecipe {
                name: "Chili".to_string(),
                nutrition: Nutrition {
                    calories: 420.0,
                    ..Nutrition::default()
                },
            })
            .unwrap();
        assert_eq!(db.list_recipes().unwrap().len(), 1);
        let n = db.recipe_nutrition(&recipe.id).unwrap().unwrap();
        assert_eq!(n.calories, 420.0);
    }

    #[test]
    fn test_meal_plan_upsert_reports_replacement() {
        let db = Database::open_in_memory().unwrap();
        let mut plan = MealPlan {
            id: "p1".to_string(),
            user_id: "alice".to_string(),
            date: day(),
            target_calories: 2000,
            meals: vec![PlannedMeal {
                meal_type: MealType::Snack,
                target_calories: 200.0,
                items: vec![],
                subtotal: MacroTotals::ZERO,
            }],
            total: MacroTotals::ZERO,
            generated_at: Local::now().to_rfc3339(),
            replaced_existing: false,
        };
        assert!(!db.upsert_meal_plan(&plan).unwrap());
        assert!(!db.get_meal_plan("alice", day()).unwrap().unwrap().replaced_existing);
        plan.id = "p2".to_string();
        assert!(db.upsert_meal_plan(&plan).unwrap());

        let stored = db.get_meal_plan("alice", day()).unwrap().unwrap();
        assert_eq!(stored.id, "p2");
        assert_eq!(stored.meals.len(), 1);
        assert!(stored.replaced_existing);
        assert!(db.get_meal_plan("bob", day()).unwrap().is_none());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_entry("alice", day(), &entry("e1", None, 80.0))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let ledger = db.find_ledger("alice", day()).unwrap().unwrap();
        assert_eq!(ledger.entry_ids(), vec!["e1"]);
        assert!((ledger.totals.calories - 80.0).abs() < 1e-9);
    }
}
