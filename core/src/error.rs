use thiserror::Error;

use crate::models::MealType;

pub type Result<T, E = TallyError> = std::result::Result<T, E>;

/// Failure taxonomy for ledger, goal, and plan operations.
///
/// Storage code works in `anyhow::Result`; `?` lifts those errors into
/// [`TallyError::Upstream`] at the service boundary.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("no suitable ingredients for {0}")]
    NoSuitableIngredients(MealType),

    #[error("storage failure: {0:#}")]
    Upstream(#[from] anyhow::Error),

    #[error("notification failed: {0}")]
    Notification(String),
}

impl TallyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<rusqlite::Error> for TallyError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Upstream(err.into())
    }
}
