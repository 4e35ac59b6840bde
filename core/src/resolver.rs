//! Entry lookup by an identifier of unknown kind.
//!
//! Callers address entries by entry id, by the catalog id they were logged
//! from, or by position. The strategies run in a fixed order and the first
//! hit wins; nothing is guessed when all of them miss.

use std::fmt;

use crate::error::{Result, TallyError};
use crate::models::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    ById,
    BySourceRef,
    ByIndex,
}

pub const STRATEGY_ORDER: [ResolveStrategy; 3] = [
    ResolveStrategy::ById,
    ResolveStrategy::BySourceRef,
    ResolveStrategy::ByIndex,
];

impl ResolveStrategy {
    fn find(self, entries: &[Entry], identifier: &str) -> Option<usize> {
        match self {
            Self::ById => entries.iter().position(|e| e.id == identifier),
            Self::BySourceRef => entries
                .iter()
                .position(|e| e.source_ref.as_deref() == Some(identifier)),
            Self::ByIndex => identifier
                .parse::<usize>()
                .ok()
                .filter(|idx| *idx < entries.len()),
        }
    }
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ById => "id",
            Self::BySourceRef => "source_ref",
            Self::ByIndex => "index",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub index: usize,
    pub strategy: ResolveStrategy,
}

pub fn resolve_entry(entries: &[Entry], identifier: &str) -> Result<Resolved> {
    let identifier = identifier.trim();
    for strategy in STRATEGY_ORDER {
        if let Some(index) = strategy.find(entries, identifier) {
            tracing::debug!(%identifier, %strategy, index, "resolved ledger entry");
            return Ok(Resolved { index, strategy });
        }
    }

    let available = entries
        .iter()
        .map(|e| e.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(TallyError::not_found(format!(
        "Entry '{identifier}' not found. Available entries: [{available}]"
    )))
}
