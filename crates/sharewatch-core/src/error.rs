use thiserror::Error;

use crate::band::BandError;
use crate::client::FetchError;
use crate::config::ConfigError;
use crate::history::HistoryError;
use crate::watchlist::WatchlistError;
use crate::{Interval, Period, Symbol};

/// Validation and contract errors exposed by `sharewatch-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid period '{value}', expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 3y, 5y, ytd")]
    InvalidPeriod { value: String },
    #[error("invalid interval '{value}', expected one of 1m, 5m, 15m, 1h, 1d, 1wk, 1mo, 3mo")]
    InvalidInterval { value: String },
    #[error("invalid source '{value}', expected one of yahoo, fixture")]
    InvalidSource { value: String },

    #[error("invalid cache mode '{value}', expected one of use, refresh, bypass")]
    InvalidCacheMode { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("window label cannot be empty")]
    EmptyWindowLabel,
    #[error("window label '{label}' is declared more than once")]
    DuplicateWindowLabel { label: String },
    #[error("at least one change window is required")]
    EmptyWindowSet,
    #[error("unknown window label '{label}', expected one of {known}")]
    UnknownWindowLabel { label: String, known: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("trace_id must be 32 hex characters")]
    InvalidTraceId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("source_chain must contain at least one source")]
    EmptySourceChain,

    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Violations detected while turning provider rows into a [`crate::Series`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeriesError {
    #[error("{symbol} returned no observations for period {period} / interval {interval}")]
    EmptySeries {
        symbol: Symbol,
        period: Period,
        interval: Interval,
    },
    #[error("{symbol} observation {index} is not strictly after its predecessor")]
    UnorderedObservations { symbol: Symbol, index: usize },
    #[error("{symbol} observation {index} is invalid: {source}")]
    InvalidObservation {
        symbol: Symbol,
        index: usize,
        #[source]
        source: ValidationError,
    },
}

impl SeriesError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptySeries { .. } => "series.empty",
            Self::UnorderedObservations { .. } => "series.unordered",
            Self::InvalidObservation { .. } => "series.invalid_observation",
        }
    }
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Band(#[from] BandError),

    #[error(transparent)]
    Watchlist(#[from] WatchlistError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Series(error) => error.code(),
            Self::Fetch(error) => error.code(),
            Self::Band(error) => error.code(),
            Self::Watchlist(error) => error.code(),
            Self::History(error) => error.code(),
            Self::Config(error) => error.code(),
            Self::Serialization(_) => "serialization",
        }
    }
}
