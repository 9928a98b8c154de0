//! Time-series change engine.
//!
//! For each symbol the engine fetches one "current" series (`1d` / `1h`) and one
//! series per change window, then reports every window's change against the
//! single current value:
//!
//! ```text
//! percent = (current - reference) / current * 100
//! ```
//!
//! where `reference` is the window's first close. The denominator is the
//! current value, not the reference, so every column is measured against the
//! same "now" price.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::band::BandOptions;
use crate::client::ProviderClient;
use crate::{ChangeWindows, Symbol, WindowLabel};

const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Signed change between `reference` and `current`, as a percentage of `current`.
///
/// Returns `None` when `current` is zero or either input is not finite, since the
/// ratio is undefined there.
pub fn percent_change(current: f64, reference: f64) -> Option<f64> {
    if current == 0.0 || !current.is_finite() || !reference.is_finite() {
        return None;
    }
    let percent = (current - reference) / current * 100.0;
    percent.is_finite().then_some(percent)
}

/// Round to two decimal places, halves away from zero: `2.345 -> 2.35`, `-2.345 -> -2.35`.
///
/// The value is taken at its shortest decimal representation, so `2.345` rounds
/// as written rather than as the nearest binary double (`2.34499...`).
pub fn round_half_up(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    let decimal = Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))?;
    let mut rounded = decimal.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    Some(rounded)
}

/// A close as charted: rounded half away from zero to whole cents.
///
/// Non-finite input is returned unchanged.
pub fn round_to_cents(value: f64) -> f64 {
    round_half_up(value)
        .and_then(|cents| cents.to_f64())
        .unwrap_or(value)
}

/// Fixed-point rendering with two decimals, as shown in the price column.
pub fn format_fixed(value: f64) -> String {
    format!("{value:.2}")
}

/// Direction of a change cell or delta tile. Zero counts as up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    pub fn of(value: Decimal) -> Self {
        if value.is_sign_negative() && !value.is_zero() {
            Self::Down
        } else {
            Self::Up
        }
    }
}

/// One window's change; `percent` is `None` when the window could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowChange {
    pub label: WindowLabel,
    pub percent: Option<Decimal>,
}

impl WindowChange {
    pub fn trend(&self) -> Option<Trend> {
        self.percent.map(Trend::of)
    }
}

/// Change row for one symbol, windows in the order they were requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub symbol: Symbol,
    pub current_value: f64,
    pub current_display: String,
    pub changes: Vec<WindowChange>,
}

impl ChangeRecord {
    pub fn percent(&self, label: &str) -> Option<Decimal> {
        self.changes
            .iter()
            .find(|change| change.label.as_str() == label)
            .and_then(|change| change.percent)
    }

    /// Label of the largest defined change; the earliest window wins ties.
    ///
    /// `None` when no window is defined or every defined change is zero.
    pub fn best_window(&self) -> Option<&WindowLabel> {
        let mut best: Option<(&WindowLabel, Decimal)> = None;
        for change in &self.changes {
            let Some(percent) = change.percent else {
                continue;
            };
            if best.map_or(true, |(_, current)| percent > current) {
                best = Some((&change.label, percent));
            }
        }

        let all_zero = self
            .changes
            .iter()
            .filter_map(|change| change.percent)
            .all(|percent| percent.is_zero());
        if all_zero {
            return None;
        }
        best.map(|(label, _)| label)
    }
}

/// An attributable failure. Without a window the whole symbol was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFailure {
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowLabel>,
    pub code: String,
    pub message: String,
}

impl ChangeFailure {
    pub fn symbol(symbol: &Symbol, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.clone(),
            window: None,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn window(
        symbol: &Symbol,
        window: &WindowLabel,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            window: Some(window.clone()),
            ..Self::symbol(symbol, code, message)
        }
    }

    pub fn excludes_symbol(&self) -> bool {
        self.window.is_none()
    }
}

/// Result of a change computation: partial successes plus every failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub records: Vec<ChangeRecord>,
    pub failures: Vec<ChangeFailure>,
}

impl ChangeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record(&self, symbol: &str) -> Option<&ChangeRecord> {
        self.records
            .iter()
            .find(|record| record.symbol.as_str().eq_ignore_ascii_case(symbol))
    }
}

#[derive(Debug, Default)]
struct SymbolOutcome {
    record: Option<ChangeRecord>,
    failures: Vec<ChangeFailure>,
}

/// Reusable engine behind the numbers, thresholds and comparison views.
#[derive(Clone)]
pub struct ChangeEngine {
    client: ProviderClient,
    max_concurrency: usize,
    band_options: BandOptions,
}

impl ChangeEngine {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            band_options: BandOptions::default(),
        }
    }

    /// Upper bound on symbols fetched at once; zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_band_options(mut self, band_options: BandOptions) -> Self {
        self.band_options = band_options;
        self
    }

    pub fn client(&self) -> &ProviderClient {
        &self.client
    }

    pub fn band_options(&self) -> &BandOptions {
        &self.band_options
    }

    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Compute one [`ChangeRecord`] per distinct symbol.
    ///
    /// Symbols are processed concurrently but records come back in input order,
    /// each with its windows in `windows` order. A failing symbol or window is
    /// reported in `failures` and never aborts the batch.
    pub async fn compute_change_records(
        &self,
        symbols: &[Symbol],
        windows: &ChangeWindows,
    ) -> ChangeReport {
        let symbols = distinct(symbols);
        let windows = Arc::new(windows.clone());
        let tasks = symbols.iter().cloned().map(|symbol| {
            let client = self.client.clone();
            let windows = Arc::clone(&windows);
            async move { changes_for_symbol(&client, &symbol, &windows).await }
        });
        let outcomes = run_bounded(tasks, self.max_concurrency).await;

        let mut report = ChangeReport::default();
        for (symbol, outcome) in symbols.iter().zip(outcomes) {
            match outcome {
                Some(outcome) => {
                    report.records.extend(outcome.record);
                    report.failures.extend(outcome.failures);
                }
                None => report.failures.push(ChangeFailure::symbol(
                    symbol,
                    "engine.task_failed",
                    "change computation for this symbol did not complete",
                )),
            }
        }
        report
    }
}

/// Run `futures` on the runtime with at most `max_concurrency` in flight.
///
/// Outputs come back in input order; a task that panicked yields `None`.
pub(crate) async fn run_bounded<I, Fut>(futures: I, max_concurrency: usize) -> Vec<Option<Fut::Output>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut len = 0;
    for (index, future) in futures.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            (index, future.await)
        });
        len = index + 1;
    }

    let mut outputs: Vec<Option<Fut::Output>> = (0..len).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, output)) => outputs[index] = Some(output),
            Err(error) => tracing::error!(%error, "engine task did not complete"),
        }
    }
    outputs
}

async fn changes_for_symbol(
    client: &ProviderClient,
    symbol: &Symbol,
    windows: &ChangeWindows,
) -> SymbolOutcome {
    let mut outcome = SymbolOutcome::default();

    let current = match client.fetch_current(symbol).await {
        Ok(series) => series.current_value(),
        Err(error) => {
            tracing::warn!(%symbol, code = error.code(), %error, "excluding symbol: current price unavailable");
            outcome
                .failures
                .push(ChangeFailure::symbol(symbol, error.code(), error.to_string()));
            return outcome;
        }
    };

    if current == 0.0 {
        tracing::warn!(%symbol, "excluding symbol: current price is zero");
        outcome.failures.push(ChangeFailure::symbol(
            symbol,
            "zero_current_value",
            format!("{symbol} has a current price of zero; percentage changes are undefined"),
        ));
        return outcome;
    }

    let mut changes = Vec::with_capacity(windows.len());
    for window in windows.iter() {
        let percent = match client
            .fetch_series(symbol, window.period, window.interval)
            .await
        {
            Ok(series) => percent_change(current, series.reference_value()).and_then(round_half_up),
            Err(error) => {
                tracing::warn!(%symbol, window = %window.label, code = error.code(), %error, "window change unavailable");
                outcome.failures.push(ChangeFailure::window(
                    symbol,
                    &window.label,
                    error.code(),
                    error.to_string(),
                ));
                None
            }
        };
        changes.push(WindowChange {
            label: window.label.clone(),
            percent,
        });
    }

    outcome.record = Some(ChangeRecord {
        symbol: symbol.clone(),
        current_value: current,
        current_display: format_fixed(current),
        changes,
    });
    outcome
}

pub(crate) fn distinct(symbols: &[Symbol]) -> Vec<Symbol> {
    let mut seen = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        if !seen.contains(symbol) {
            seen.push(symbol.clone());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapters::FixtureProvider;
    use crate::client::ClientOptions;
    use crate::{Interval, Period, ProviderError};

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn engine(provider: FixtureProvider) -> ChangeEngine {
        let client = ProviderClient::new(
            Arc::new(provider),
            ClientOptions {
                requests_per_minute: None,
                ..ClientOptions::default()
            },
        );
        ChangeEngine::new(client)
    }

    fn one_month() -> ChangeWindows {
        ChangeWindows::standard().select(&["1M"]).expect("1M exists")
    }

    #[test]
    fn percent_change_uses_current_as_denominator() {
        assert_eq!(percent_change(100.0, 90.0), Some(10.0));
        assert_eq!(percent_change(0.0, 90.0), None);
        assert_eq!(percent_change(f64::NAN, 1.0), None);
    }

    #[test]
    fn rounds_halves_away_from_zero() {
        assert_eq!(round_half_up(2.345), Some(dec("2.35")));
        assert_eq!(round_half_up(-2.345), Some(dec("-2.35")));
        assert_eq!(round_half_up(1.005), Some(dec("1.01")));
        assert_eq!(round_half_up(2.344), Some(dec("2.34")));
        assert_eq!(round_half_up(f64::INFINITY), None);
    }

    #[test]
    fn rounded_values_keep_two_decimal_places() {
        let rounded = round_half_up(10.0).expect("finite");
        assert_eq!(rounded.to_string(), "10.00");
    }

    #[test]
    fn closes_round_to_whole_cents() {
        assert_eq!(round_to_cents(10.004), 10.0);
        assert_eq!(round_to_cents(12.005), 12.01);
        assert_eq!(round_to_cents(-0.125), -0.13);
        assert!(round_to_cents(f64::NAN).is_nan());
    }

    #[test]
    fn format_fixed_pads_to_two_decimals() {
        assert_eq!(format_fixed(100.0), "100.00");
        assert_eq!(format_fixed(3.14159), "3.14");
    }

    #[test]
    fn trend_treats_zero_as_up() {
        assert_eq!(Trend::of(dec("0.00")), Trend::Up);
        assert_eq!(Trend::of(dec("-0.01")), Trend::Down);
    }

    #[test]
    fn best_window_skips_all_zero_rows() {
        let record = |values: &[Option<&str>]| ChangeRecord {
            symbol: symbol("AAPL"),
            current_value: 1.0,
            current_display: String::from("1.00"),
            changes: values
                .iter()
                .enumerate()
                .map(|(i, value)| WindowChange {
                    label: WindowLabel::parse(&format!("W{i}")).expect("label"),
                    percent: value.map(dec),
                })
                .collect(),
        };

        let mixed = record(&[Some("1.00"), None, Some("3.50"), Some("3.50")]);
        assert_eq!(mixed.best_window().map(WindowLabel::as_str), Some("W2"));

        let flat = record(&[Some("0.00"), Some("0.00"), None]);
        assert_eq!(flat.best_window(), None);
    }

    #[tokio::test]
    async fn one_month_change_against_current_value() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("X"), Period::OneDay, Interval::OneHour, &[99.0, 100.0])
            .expect("valid")
            .with_closes(symbol("X"), Period::OneMonth, Interval::OneWeek, &[90.0, 95.0, 98.0])
            .expect("valid");

        let report = engine(provider)
            .compute_change_records(&[symbol("X")], &one_month())
            .await;

        assert!(report.is_complete());
        let record = report.record("X").expect("record");
        assert_eq!(record.current_display, "100.00");
        assert_eq!(record.percent("1M"), Some(dec("10.00")));
    }

    #[tokio::test]
    async fn empty_current_series_excludes_only_that_symbol() {
        let provider = FixtureProvider::new()
            .with_series(symbol("GONE"), Period::OneDay, Interval::OneHour, Vec::new())
            .with_closes(symbol("OK"), Period::OneDay, Interval::OneHour, &[10.0])
            .expect("valid")
            .with_closes(symbol("OK"), Period::OneMonth, Interval::OneWeek, &[8.0])
            .expect("valid");

        let report = engine(provider)
            .compute_change_records(&[symbol("GONE"), symbol("OK")], &one_month())
            .await;

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].symbol.as_str(), "OK");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol.as_str(), "GONE");
        assert_eq!(report.failures[0].code, "series.empty");
        assert!(report.failures[0].excludes_symbol());
    }

    #[tokio::test]
    async fn failed_window_is_undefined_not_zero() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("AAPL"), Period::OneDay, Interval::OneHour, &[10.0])
            .expect("valid")
            .with_closes(symbol("AAPL"), Period::OneMonth, Interval::OneWeek, &[8.0])
            .expect("valid")
            .with_window_failure(
                symbol("AAPL"),
                Period::FiveDays,
                Interval::OneDay,
                ProviderError::rate_limited("slow down"),
            );
        let windows = ChangeWindows::standard()
            .select(&["5D", "1M"])
            .expect("windows exist");

        let report = engine(provider)
            .compute_change_records(&[symbol("AAPL")], &windows)
            .await;

        let record = report.record("AAPL").expect("record kept");
        assert_eq!(record.percent("5D"), None);
        assert_eq!(record.percent("1M"), Some(dec("20.00")));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].window.as_ref().map(WindowLabel::as_str),
            Some("5D")
        );
        assert_eq!(report.failures[0].code, "provider.rate_limited");
    }

    #[tokio::test]
    async fn zero_current_value_excludes_symbol() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("NIL"), Period::OneDay, Interval::OneHour, &[0.0])
            .expect("valid");

        let report = engine(provider)
            .compute_change_records(&[symbol("NIL")], &one_month())
            .await;

        assert!(report.records.is_empty());
        assert_eq!(report.failures[0].code, "zero_current_value");
    }

    #[tokio::test]
    async fn output_order_follows_input_not_completion() {
        let mut provider = FixtureProvider::new().with_delay(Duration::from_millis(5));
        for name in ["CCC", "AAA", "BBB"] {
            provider = provider
                .with_closes(symbol(name), Period::OneDay, Interval::OneHour, &[10.0])
                .expect("valid")
                .with_closes(symbol(name), Period::OneMonth, Interval::OneWeek, &[5.0])
                .expect("valid");
        }

        let report = engine(provider)
            .with_max_concurrency(3)
            .compute_change_records(
                &[symbol("CCC"), symbol("AAA"), symbol("CCC"), symbol("BBB")],
                &one_month(),
            )
            .await;

        let order: Vec<&str> = report.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, ["CCC", "AAA", "BBB"]);
    }
}
