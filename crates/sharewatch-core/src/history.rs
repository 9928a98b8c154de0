//! Read access to previously recorded daily percentage changes.

use std::collections::BTreeMap;

use serde::Serialize;
use sharewatch_warehouse::{Warehouse, WarehouseError};
use thiserror::Error;
use time::macros::format_description;
use time::Date;

use crate::Symbol;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// One day's recorded percentage change for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangeSnapshot {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub percent_change: f64,
}

impl ChangeSnapshot {
    pub fn new(date: Date, percent_change: f64) -> Self {
        Self {
            date,
            percent_change,
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("stored snapshot date '{value}' is not a YYYY-MM-DD date")]
    InvalidDate { value: String },
}

impl HistoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Warehouse(error) => error.code(),
            Self::InvalidDate { .. } => "history.invalid_date",
        }
    }
}

/// Source of historical change snapshots.
///
/// Implementations return at most `limit` snapshots: the most recent ones,
/// ordered by ascending date. An unknown symbol yields an empty vector.
pub trait ChangeHistoryStore: Send + Sync {
    fn query_recent_changes(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> Result<Vec<ChangeSnapshot>, HistoryError>;
}

impl ChangeHistoryStore for Warehouse {
    fn query_recent_changes(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> Result<Vec<ChangeSnapshot>, HistoryError> {
        let format = format_description!("[year]-[month]-[day]");
        self.recent_changes(symbol.as_str(), limit)?
            .into_iter()
            .map(|row| {
                let date = Date::parse(row.snapshot_date.as_str(), &format).map_err(|_| {
                    HistoryError::InvalidDate {
                        value: row.snapshot_date.clone(),
                    }
                })?;
                Ok(ChangeSnapshot::new(date, row.percent_change))
            })
            .collect()
    }
}

/// Snapshot store held in memory; used by tests and fixture runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    snapshots: BTreeMap<Symbol, BTreeMap<Date, f64>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot, replacing any existing value for the same day.
    pub fn with_snapshot(mut self, symbol: Symbol, snapshot: ChangeSnapshot) -> Self {
        self.snapshots
            .entry(symbol)
            .or_default()
            .insert(snapshot.date, snapshot.percent_change);
        self
    }
}

impl ChangeHistoryStore for InMemoryHistoryStore {
    fn query_recent_changes(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> Result<Vec<ChangeSnapshot>, HistoryError> {
        let Some(days) = self.snapshots.get(symbol) else {
            return Ok(Vec::new());
        };

        let mut recent: Vec<ChangeSnapshot> = days
            .iter()
            .rev()
            .take(limit)
            .map(|(date, percent)| ChangeSnapshot::new(*date, *percent))
            .collect();
        recent.reverse();
        Ok(recent)
    }
}
