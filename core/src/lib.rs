//! Per-user daily nutrition ledgers with goal resolution and meal planning.
//!
//! [`service::TallyService`] is the entry point; the other modules are the
//! pieces it composes.

pub mod db;
pub mod error;
pub mod events;
pub mod goals;
pub mod meal_plan;
pub mod models;
pub mod normalizer;
pub mod resolver;
pub mod service;

pub use error::{Result, TallyError};
pub use service::TallyService;
