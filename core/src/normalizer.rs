//! Turns a heterogeneous logging request into an immutable [`Entry`].

use chrono::Local;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, TallyError};
use crate::models::{
    Entry, LogRequest, MealType, Nutrition, SourceKind, validate_meal_type, validate_quantity,
};

/// Read access to the catalog the normalizer prices entries against.
///
/// Implemented by the SQLite [`Database`](crate::db::Database); tests use an
/// in-memory map.
pub trait CatalogLookup {
    fn ingredient_nutrition(&self, id: &str) -> anyhow::Result<Option<Nutrition>>;
    fn recipe_nutrition(&self, id: &str) -> anyhow::Result<Option<Nutrition>>;
}

const CALORIE_KEYS: &[&str] = &["calories", "kcal", "energy_kcal"];
const PROTEIN_KEYS: &[&str] = &["protein", "proteins"];
const CARB_KEYS: &[&str] = &["carbs", "carbohydrates", "carbohydrate"];
const FAT_KEYS: &[&str] = &["fat", "fats"];
const FIBER_KEYS: &[&str] = &["fiber", "fibre"];
const SUGAR_KEYS: &[&str] = &["sugar", "sugars"];
const SODIUM_KEYS: &[&str] = &["sodium"];

/// Build the entry for a logging request.
///
/// Quantity and meal type are checked before any catalog lookup so an invalid
/// request never reaches storage.
pub fn normalize(request: &LogRequest, catalog: &dyn CatalogLookup) -> Result<Entry> {
    validate_quantity(request.quantity).map_err(|e| TallyError::validation(e.to_string()))?;
    let meal_type: MealType = validate_meal_type(&request.meal_type)
        .map_err(|e| TallyError::validation(e.to_string()))?;

    let nutrition = match request.source_kind {
        SourceKind::CatalogIngredient => {
            let id = required_ref(request)?;
            catalog
                .ingredient_nutrition(id)?
                .ok_or_else(|| TallyError::not_found(format!("Ingredient '{id}' not found")))?
                .scaled(request.quantity)
        }
        SourceKind::Recipe => {
            let id = required_ref(request)?;
            catalog
                .recipe_nutrition(id)?
                .ok_or_else(|| TallyError::not_found(format!("Recipe '{id}' not found")))?
                .scaled(request.quantity)
        }
        SourceKind::Scanned => {
            let raw = raw_object(request)?;
            // Scanned products never contribute sugar or sodium, whatever the payload says.
            let n = Nutrition {
                sugar: 0.0,
                sodium: 0.0,
                ..parse_nutrition(raw)
            };
            check_non_negative(&n)?;
            n.scaled(request.quantity)
        }
        SourceKind::Manual => {
            let raw = raw_object(request)?;
            let calories = read_field(raw, CALORIE_KEYS).ok_or_else(|| {
                TallyError::validation("calories is required for manual entries")
            })?;
            if calories <= 0.0 {
                return Err(TallyError::validation(
                    "calories must be greater than 0 for manual entries",
                ));
            }
            let n = parse_nutrition(raw);
            check_non_negative(&n)?;
            n.scaled(request.quantity)
        }
    };

    Ok(Entry {
        id: Uuid::new_v4().to_string(),
        source_kind: request.source_kind,
        source_ref: request
            .source_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
        quantity: request.quantity,
        meal_type,
        nutrition,
        logged_at: Local::now().to_rfc3339(),
    })
}

fn required_ref(request: &LogRequest) -> Result<&str> {
    request
        .source_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            TallyError::validation(format!(
                "source_ref is required for {} entries",
                request.source_kind
            ))
        })
}

fn raw_object(request: &LogRequest) -> Result<&Map<String, Value>> {
    match &request.raw_nutrition {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(TallyError::validation("raw_nutrition must be an object")),
        None => Err(TallyError::validation(format!(
            "raw_nutrition is required for {} entries",
            request.source_kind
        ))),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

/// First alias present with a numeric value wins.
fn read_field(raw: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| raw.get(*k).and_then(numeric))
}

fn parse_nutrition(raw: &Map<String, Value>) -> Nutrition {
    Nutrition {
        calories: read_field(raw, CALORIE_KEYS).unwrap_or(0.0),
        protein: read_field(raw, PROTEIN_KEYS).unwrap_or(0.0),
        carbs: read_field(raw, CARB_KEYS).unwrap_or(0.0),
        fat: read_field(raw, FAT_KEYS).unwrap_or(0.0),
        fiber: read_field(raw, FIBER_KEYS).unwrap_or(0.0),
        sugar: read_field(raw, SUGAR_KEYS).unwrap_or(0.0),
        sodium: read_field(raw, SODIUM_KEYS).unwrap_or(0.0),
    }
}

fn check_non_negative(n: &Nutrition) -> Result<()> {
    let fields = [
        ("calories", n.calories),
        ("protein", n.protein),
        ("carbs", n.carbs),
        ("fat", n.fat),
        ("fiber", n.fiber),
        ("sugar", n.sugar),
        ("sodium", n.sodium),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| *v < 0.0) {
        return Err(TallyError::validation(format!("{name} must not be negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct MapCatalog {
        ingredients: HashMap<String, Nutrition>,
        recipes: HashMap<String, Nutrition>,
    }

    impl CatalogLookup for MapCatalog {
        fn ingredient_nutrition(&self, id: &str) -> anyhow::Result<Option<Nutrition>> {
            Ok(self.ingredients.get(id).copied())
        }

        fn recipe_nutrition(&self, id: &str) -> anyhow::Result<Option<Nutrition>> {
            Ok(self.recipes.get(id).copied())
        }
    }

    fn apple() -> Nutrition {
        Nutrition {
            calories: 50.0,
            protein: 2.0,
            carbs: 5.0,
            fat: 1.0,
            fiber: 1.0,
            sugar: 4.0,
            sodium: 1.0,
        }
    }

    fn catalog() -> MapCatalog {
        let mut c = MapCatalog::default();
        c.ingredients.insert("apple".to_string(), apple());
        c.recipes.insert("stew".to_string(), apple().scaled(4.0));
        c
    }

    fn request(kind: SourceKind) -> LogRequest {
        LogRequest {
            source_kind: kind,
            source_ref: None,
            quantity: 1.0,
            meal_type: "lunch".to_string(),
            date: None,
            raw_nutrition: None,
        }
    }

    #[test]
    fn test_catalog_ingredient_scales_by_quantity() {
        let mut req = request(SourceKind::CatalogIngredient);
        req.source_ref = Some("apple".to_string());
        req.quantity = 2.0;
        let entry = normalize(&req, &catalog()).unwrap();
        assert_eq!(entry.nutrition.calories, 100.0);
        assert_eq!(entry.nutrition.protein, 4.0);
        assert_eq!(entry.nutrition.sugar, 8.0);
        assert_eq!(entry.source_ref.as_deref(), Some("apple"));
        assert_eq!(entry.meal_type, MealType::Lunch);
    }

    #[test]
    fn test_recipe_lookup() {
        let mut req = request(SourceKind::Recipe);
        req.source_ref = Some("stew".to_string());
        let entry = normalize(&req, &catalog()).unwrap();
        assert_eq!(entry.nutrition.calories, 200.0);
    }

    #[test]
    fn test_unknown_catalog_ref_is_not_found() {
        let mut req = request(SourceKind::CatalogIngredient);
        req.source_ref = Some("durian".to_string());
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::NotFound(_))
        ));

        let mut req = request(SourceKind::Recipe);
        req.source_ref = Some("apple".to_string());
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::NotFound(_))
        ));
    }

    #[test]
    fn test_catalog_entry_requires_ref() {
        let req = request(SourceKind::CatalogIngredient);
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_scanned_forces_sugar_and_sodium_to_zero() {
        let mut req = request(SourceKind::Scanned);
        req.quantity = 3.0;
        req.raw_nutrition = Some(json!({
            "calories": 120,
            "protein": 3,
            "carbs": 20,
            "fat": 2,
            "fiber": 1,
            "sugar": 18,
            "sodium": 400
        }));
        let entry = normalize(&req, &catalog()).unwrap();
        assert_eq!(entry.nutrition.calories, 360.0);
        assert_eq!(entry.nutrition.carbs, 60.0);
        assert_eq!(entry.nutrition.sugar, 0.0);
        assert_eq!(entry.nutrition.sodium, 0.0);
    }

    #[test]
    fn test_scanned_requires_payload() {
        let req = request(SourceKind::Scanned);
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_manual_accepts_field_aliases() {
        let mut req = request(SourceKind::Manual);
        req.raw_nutrition = Some(json!({
            "calories": "250",
            "proteins": 10,
            "carbohydrates": 30.5,
            "fat": "oops",
            "unknown": 99
        }));
        let entry = normalize(&req, &catalog()).unwrap();
        assert_eq!(entry.nutrition.calories, 250.0);
        assert_eq!(entry.nutrition.protein, 10.0);
        assert_eq!(entry.nutrition.carbs, 30.5);
        assert_eq!(entry.nutrition.fat, 0.0);
        assert_eq!(entry.nutrition.fiber, 0.0);
    }

    #[test]
    fn test_manual_requires_positive_calories() {
        let mut req = request(SourceKind::Manual);
        req.raw_nutrition = Some(json!({ "protein": 10 }));
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));

        req.raw_nutrition = Some(json!({ "calories": 0 }));
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_quantity_and_meal_type() {
        let mut req = request(SourceKind::CatalogIngredient);
        req.source_ref = Some("apple".to_string());
        req.quantity = 0.0;
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));

        req.quantity = 1.0;
        req.meal_type = "brunch".to_string();
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_precedes_lookup() {
        // Unknown ref plus a bad quantity reports the quantity, not the lookup.
        let mut req = request(SourceKind::CatalogIngredient);
        req.source_ref = Some("durian".to_string());
        req.quantity = -1.0;
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_values_rejected() {
        let mut req = request(SourceKind::Scanned);
        req.raw_nutrition = Some(json!({ "calories": 100, "fat": -2 }));
        assert!(matches!(
            normalize(&req, &catalog()),
            Err(TallyError::Validation(_))
        ));
    }

    #[test]
    fn test_scanned_ignores_negative_sugar_and_sodium() {
        let mut req = request(SourceKind::Scanned);
        req.raw_nutrition = Some(json!({ "calories": 90, "sugar": -4, "sodium": -1 }));
        let entry = normalize(&req, &catalog()).unwrap();
        assert_eq!(entry.nutrition.calories, 90.0);
        assert_eq!(entry.nutrition.sugar, 0.0);
        assert_eq!(entry.nutrition.sodium, 0.0);
    }

    #[test]
    fn test_source_ref_is_stored_trimmed() {
        let mut req = request(SourceKind::CatalogIngredient);
        req.source_ref = Some("  apple ".to_string());
        let entry = normalize(&req, &catalog()).unwrap();
        assert_eq!(entry.source_ref.as_deref(), Some("apple"));

        let resolved = crate::resolver::resolve_entry(&[entry], " apple").unwrap();
        assert_eq!(resolved.strategy, crate::resolver::ResolveStrategy::BySourceRef);
    }
}
