//! Market data provider contract.
//!
//! Every upstream the dashboard reads prices from implements
//! [`MarketDataProvider`]. The contract is deliberately narrow: one symbol, one
//! `(period, interval)` request, closing prices back.
//!
//! # Example
//!
//! ```rust,ignore
//! use sharewatch_core::{Interval, MarketDataProvider, Period, ProviderError, Symbol, YahooAdapter};
//!
//! async fn last_close(adapter: &YahooAdapter) -> Result<Option<f64>, ProviderError> {
//!     let symbol = Symbol::parse("AAPL").map_err(|e| ProviderError::invalid_request(e.to_string()))?;
//!     let rows = adapter.fetch_series(&symbol, Period::OneDay, Interval::OneHour).await?;
//!     Ok(rows.last().map(|row| row.close))
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{Interval, Observation, Period, ProviderId, Symbol};

/// Health state reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime provider health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }

    pub const fn degraded() -> Self {
        Self::new(HealthState::Degraded, true)
    }

    pub const fn unhealthy() -> Self {
        Self::new(HealthState::Unhealthy, false)
    }
}

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    UnknownSymbol,
    Unavailable,
    RateLimited,
    Malformed,
    InvalidRequest,
    Internal,
}

/// Structured provider error, attributable to one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    /// Build an error of `kind`; rate limits and unavailability are retryable.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(
                kind,
                ProviderErrorKind::Unavailable | ProviderErrorKind::RateLimited
            ),
        }
    }

    pub fn unknown_symbol(symbol: &Symbol) -> Self {
        Self {
            kind: ProviderErrorKind::UnknownSymbol,
            message: format!("no data found for symbol '{symbol}'"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Malformed,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::UnknownSymbol => "provider.unknown_symbol",
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::Malformed => "provider.malformed",
            ProviderErrorKind::InvalidRequest => "provider.invalid_request",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Boxed future returned by provider fetches.
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Observation>, ProviderError>> + Send + 'a>>;

/// Upstream price-history contract.
///
/// Implementations return raw rows in whatever order the upstream produced
/// them; ordering and emptiness are validated by the caller when the rows are
/// turned into a [`crate::Series`].
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across the
/// engine's concurrent per-symbol tasks.
pub trait MarketDataProvider: Send + Sync {
    /// Returns the unique provider identifier.
    fn id(&self) -> ProviderId;

    /// Fetches closing prices for `symbol` over `period`, sampled at `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if:
    /// - The symbol is unknown upstream
    /// - The provider is unavailable or rate limited
    /// - The payload cannot be parsed
    fn fetch_series<'a>(
        &'a self,
        symbol: &'a Symbol,
        period: Period,
        interval: Interval,
    ) -> FetchFuture<'a>;

    /// Returns the current health status of this provider.
    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;
}
