//! Outbound hooks: ledger change events and finalize-meal notifications.
//!
//! Both are fire-and-forget. The service calls them after the database
//! transaction commits and only logs their failures.

use serde::Serialize;

use crate::error::Result;
use crate::models::{Entry, Ledger, MealSummary};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LedgerEvent {
    Add { ledger: Ledger, entry: Entry },
    Remove { ledger: Ledger, removed_id: String },
}

impl LedgerEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        match self {
            Self::Add { ledger, .. } | Self::Remove { ledger, .. } => ledger,
        }
    }
}

/// Per-user fan-out of ledger changes (the server backs this with SSE).
pub trait Broadcaster: Send + Sync {
    fn publish(&self, user_id: &str, event: &LedgerEvent) -> Result<()>;
}

/// Receives the summary produced when a meal is finalized.
pub trait MealNotifier: Send + Sync {
    fn notify(&self, summary: &MealSummary) -> Result<()>;
}

pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn publish(&self, _user_id: &str, _event: &LedgerEvent) -> Result<()> {
        Ok(())
    }
}

/// Writes finalize summaries to the log.
pub struct LogNotifier;

impl MealNotifier for LogNotifier {
    fn notify(&self, summary: &MealSummary) -> Result<()> {
        tracing::info!(
            user_id = %summary.user_id,
            meal_type = %summary.meal_type,
            date = %summary.date,
            meal_calories = summary.meal_consumed.calories,
            remaining_calories = summary.remaining.calories,
            exceeded = summary.exceeded,
            "meal finalized"
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{MacroTotals, MealType, Nutrition, SourceKind};

    fn ledger() -> Ledger {
        Ledger {
            id: "l1".to_string(),
            user_id: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            entries: vec![],
            totals: MacroTotals::ZERO,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_add_event_json_shape() {
        let event = LedgerEvent::Add {
            ledger: ledger(),
            entry: Entry {
                id: "e1".to_string(),
                source_kind: SourceKind::Manual,
                source_ref: None,
                quantity: 1.0,
                meal_type: MealType::Snack,
                nutrition: Nutrition::default(),
                logged_at: String::new(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "add");
        assert_eq!(json["ledger"]["id"], "l1");
        assert_eq!(json["entry"]["id"], "e1");
        assert_eq!(json["entry"]["source_kind"], "manual");
    }

    #[test]
    fn test_remove_event_json_shape() {
        let event = LedgerEvent::Remove {
            ledger: ledger(),
            removed_id: "e9".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "remove");
        assert_eq!(json["removed_id"], "e9");
        assert_eq!(event.kind(), "remove");
        assert_eq!(event.ledger().id, "l1");
    }
}
