use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::data_source::{
    FetchFuture, HealthStatus, MarketDataProvider, ProviderError, ProviderErrorKind,
};
use crate::{Interval, Observation, Period, ProviderId, Symbol, UtcDateTime, ValidationError};

type SeriesKey = (Symbol, Period, Interval);

/// Failure loading a fixture document.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fixture is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("fixture entry for '{symbol}' is invalid: {source}")]
    Invalid {
        symbol: String,
        #[source]
        source: ValidationError,
    },
}

/// In-memory provider serving canned rows, for offline runs and tests.
///
/// A symbol with no registered rows at all is reported as unknown; a known symbol
/// asked for an unregistered `(period, interval)` answers with zero rows.
#[derive(Debug, Default)]
pub struct FixtureProvider {
    series: HashMap<SeriesKey, Vec<Observation>>,
    symbol_failures: HashMap<Symbol, ProviderError>,
    window_failures: HashMap<SeriesKey, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(
        mut self,
        symbol: Symbol,
        period: Period,
        interval: Interval,
        observations: Vec<Observation>,
    ) -> Self {
        self.series.insert((symbol, period, interval), observations);
        self
    }

    /// Register closes spaced one `interval` apart, ending at 2024-01-01T00:00:00Z.
    pub fn with_closes(
        self,
        symbol: Symbol,
        period: Period,
        interval: Interval,
        closes: &[f64],
    ) -> Result<Self, ValidationError> {
        let end = UtcDateTime::parse("2024-01-01T00:00:00Z")?.into_inner();
        let step = interval.step();
        let count = closes.len();
        let observations = closes
            .iter()
            .enumerate()
            .map(|(index, close)| {
                let back = i32::try_from(count - 1 - index).unwrap_or(i32::MAX);
                Observation::new(UtcDateTime::from_offset_datetime(end - step * back)?, *close)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_series(symbol, period, interval, observations))
    }

    /// Every request for `symbol` fails with `error`.
    pub fn with_failure(mut self, symbol: Symbol, error: ProviderError) -> Self {
        self.symbol_failures.insert(symbol, error);
        self
    }

    /// Only the `(period, interval)` request for `symbol` fails with `error`.
    pub fn with_window_failure(
        mut self,
        symbol: Symbol,
        period: Period,
        interval: Interval,
        error: ProviderError,
    ) -> Self {
        self.window_failures.insert((symbol, period, interval), error);
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `fetch_series` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Load a fixture document:
    ///
    /// ```json
    /// {"series": [{"symbol": "AAPL", "period": "1mo", "interval": "1wk",
    ///              "observations": [{"ts": "2024-01-01T00:00:00Z", "close": 185.2}]}],
    ///  "failures": [{"symbol": "ZZZZ", "kind": "unknown_symbol", "message": "delisted"}]}
    /// ```
    pub fn from_json_str(text: &str) -> Result<Self, FixtureError> {
        let document: FixtureDocument = serde_json::from_str(text)?;
        let mut provider = Self::new();

        for entry in document.series {
            let invalid = |source| FixtureError::Invalid {
                symbol: entry.symbol.clone(),
                source,
            };
            let symbol = Symbol::parse(&entry.symbol).map_err(invalid)?;
            let observations = entry
                .observations
                .into_iter()
                .map(|row| Observation::new(UtcDateTime::parse(&row.ts)?, row.close))
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?;
            provider = provider.with_series(symbol, entry.period, entry.interval, observations);
        }

        for failure in document.failures {
            let symbol = Symbol::parse(&failure.symbol).map_err(|source| FixtureError::Invalid {
                symbol: failure.symbol.clone(),
                source,
            })?;
            let message = failure
                .message
                .unwrap_or_else(|| format!("injected {:?} failure", failure.kind));
            let error = ProviderError::new(failure.kind, message);
            provider = match (failure.period, failure.interval) {
                (Some(period), Some(interval)) => {
                    provider.with_window_failure(symbol, period, interval, error)
                }
                _ => provider.with_failure(symbol, error),
            };
        }

        Ok(provider)
    }

    fn answer(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<Observation>, ProviderError> {
        if let Some(error) = self.symbol_failures.get(symbol) {
            return Err(error.clone());
        }
        let key = (symbol.clone(), period, interval);
        if let Some(error) = self.window_failures.get(&key) {
            return Err(error.clone());
        }
        if let Some(rows) = self.series.get(&key) {
            return Ok(rows.clone());
        }
        if self.series.keys().any(|(known, _, _)| known == symbol) {
            return Ok(Vec::new());
        }
        Err(ProviderError::unknown_symbol(symbol))
    }
}

impl MarketDataProvider for FixtureProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Fixture
    }

    fn fetch_series<'a>(
        &'a self,
        symbol: &'a Symbol,
        period: Period,
        interval: Interval,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answer(symbol, period, interval)
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { HealthStatus::healthy() })
    }
}

#[derive(Debug, Deserialize)]
struct FixtureDocument {
    #[serde(default)]
    series: Vec<FixtureSeries>,
    #[serde(default)]
    failures: Vec<FixtureFailure>,
}

#[derive(Debug, Deserialize)]
struct FixtureSeries {
    symbol: String,
    period: Period,
    interval: Interval,
    observations: Vec<FixtureRow>,
}

#[derive(Debug, Deserialize)]
struct FixtureRow {
    ts: String,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct FixtureFailure {
    symbol: String,
    kind: ProviderErrorKind,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    period: Option<Period>,
    #[serde(default)]
    interval: Option<Interval>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[tokio::test]
    async fn serves_registered_closes_in_order() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("AAPL"), Period::OneMonth, Interval::OneWeek, &[100.0, 110.0])
            .expect("valid closes");

        let rows = provider
            .fetch_series(&symbol("AAPL"), Period::OneMonth, Interval::OneWeek)
            .await
            .expect("registered");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ts < rows[1].ts);
        assert_eq!(rows[1].close, 110.0);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_symbol_and_missing_window_differ() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("AAPL"), Period::OneMonth, Interval::OneWeek, &[1.0])
            .expect("valid closes");

        let missing = provider
            .fetch_series(&symbol("AAPL"), Period::OneYear, Interval::ThreeMonths)
            .await
            .expect("known symbol");
        assert!(missing.is_empty());

        let error = provider
            .fetch_series(&symbol("MSFT"), Period::OneMonth, Interval::OneWeek)
            .await
            .expect_err("unknown");
        assert_eq!(error.kind(), ProviderErrorKind::UnknownSymbol);
    }

    #[tokio::test]
    async fn window_failure_only_hits_that_window() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("AAPL"), Period::OneMonth, Interval::OneWeek, &[1.0])
            .expect("valid closes")
            .with_closes(symbol("AAPL"), Period::OneYear, Interval::ThreeMonths, &[1.0])
            .expect("valid closes")
            .with_window_failure(
                symbol("AAPL"),
                Period::OneYear,
                Interval::ThreeMonths,
                ProviderError::unavailable("flaky"),
            );

        assert!(provider
            .fetch_series(&symbol("AAPL"), Period::OneMonth, Interval::OneWeek)
            .await
            .is_ok());
        assert!(provider
            .fetch_series(&symbol("AAPL"), Period::OneYear, Interval::ThreeMonths)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn loads_series_and_failures_from_json() {
        let provider = FixtureProvider::from_json_str(
            r#"{
                "series": [{"symbol": "cba.ax", "period": "6mo", "interval": "1mo",
                            "observations": [{"ts": "2024-01-01T00:00:00Z", "close": 101.5},
                                             {"ts": "2024-02-01T00:00:00Z", "close": 99.0}]}],
                "failures": [{"symbol": "ZZZZ", "kind": "rate_limited"}]
            }"#,
        )
        .expect("valid fixture");

        let rows = provider
            .fetch_series(&symbol("CBA.AX"), Period::SixMonths, Interval::OneMonth)
            .await
            .expect("registered");
        assert_eq!(rows.len(), 2);

        let error = provider
            .fetch_series(&symbol("ZZZZ"), Period::SixMonths, Interval::OneMonth)
            .await
            .expect_err("injected");
        assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
        assert!(error.retryable());
    }

    #[test]
    fn rejects_negative_close_in_fixture() {
        let error = FixtureProvider::from_json_str(
            r#"{"series": [{"symbol": "AAPL", "period": "1d", "interval": "1h",
                            "observations": [{"ts": "2024-01-01T00:00:00Z", "close": -1.0}]}]}"#,
        )
        .expect_err("negative close");
        assert!(matches!(error, FixtureError::Invalid { .. }));
    }

    #[test]
    fn load_from_missing_path_reports_io() {
        let error = FixtureProvider::from_path("/definitely/not/here.json").expect_err("missing");
        assert!(matches!(error, FixtureError::Io { .. }));
    }
}
