//! Start/end deltas for the comparison view.
//!
//! Each symbol is fetched on its own over the shared `(period, interval)`; no
//! timestamp alignment happens across symbols. Start and end closes are taken at
//! whole cents, and the fraction is normalized by the end value, matching the
//! change engine's convention.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::band::{compute_combined_band, ThresholdBand};
use crate::change::{
    distinct, round_half_up, round_to_cents, run_bounded, ChangeEngine, ChangeFailure, Trend,
};
use crate::client::FetchError;
use crate::data_source::ProviderError;
use crate::{Interval, Period, Series, Symbol};

/// First-to-last movement of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDelta {
    pub symbol: Symbol,
    pub start_value: f64,
    pub end_value: f64,
    pub delta: f64,
    /// `delta / end_value`; `None` when the end value is zero.
    pub fraction: Option<f64>,
    /// `fraction * 100`, rounded half away from zero to two places.
    pub percent: Option<Decimal>,
    pub trend: Trend,
}

pub fn delta_for_series(series: &Series) -> SymbolDelta {
    let start_value = round_to_cents(series.reference_value());
    let end_value = round_to_cents(series.current_value());
    let delta = end_value - start_value;
    let fraction = (end_value != 0.0)
        .then(|| delta / end_value)
        .filter(|fraction| fraction.is_finite());

    SymbolDelta {
        symbol: series.symbol().clone(),
        start_value,
        end_value,
        delta,
        fraction,
        percent: fraction.and_then(|fraction| round_half_up(fraction * 100.0)),
        trend: if delta >= 0.0 { Trend::Up } else { Trend::Down },
    }
}

/// Deltas for every symbol that could be fetched, plus one shared chart band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub period: Period,
    pub interval: Interval,
    pub deltas: Vec<SymbolDelta>,
    pub failures: Vec<ChangeFailure>,
    /// Combined band over all successful series; `None` when nothing was fetched.
    pub band: Option<ThresholdBand>,
    pub series: Vec<Series>,
}

impl ComparisonReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl ChangeEngine {
    /// Compare start/end movement of `symbols` over one shared window.
    ///
    /// Fetch failures are reported per symbol; the remaining deltas are still returned.
    pub async fn compare(
        &self,
        symbols: &[Symbol],
        period: Period,
        interval: Interval,
    ) -> ComparisonReport {
        let fetches = symbols_in_order(self, &distinct(symbols), period, interval).await;

        let mut deltas = Vec::new();
        let mut failures = Vec::new();
        let mut series = Vec::new();
        for (symbol, fetched) in fetches {
            match fetched {
                Ok(fetched) => {
                    deltas.push(delta_for_series(&fetched));
                    series.push(fetched);
                }
                Err(error) => {
                    tracing::warn!(%symbol, code = error.code(), %error, "excluding symbol from comparison");
                    failures.push(ChangeFailure::symbol(&symbol, error.code(), error.to_string()));
                }
            }
        }

        let band = match compute_combined_band(&series, self.band_options()) {
            Ok(band) => band,
            Err(error) => {
                tracing::warn!(%error, "comparison band unavailable");
                None
            }
        };

        ComparisonReport {
            period,
            interval,
            deltas,
            failures,
            band,
            series,
        }
    }
}

async fn symbols_in_order(
    engine: &ChangeEngine,
    symbols: &[Symbol],
    period: Period,
    interval: Interval,
) -> Vec<(Symbol, Result<Series, FetchError>)> {
    let tasks = symbols.iter().cloned().map(|symbol| {
        let client = engine.client().clone();
        async move { client.fetch_series(&symbol, period, interval).await }
    });
    let outputs = run_bounded(tasks, engine.max_concurrency()).await;

    symbols
        .iter()
        .cloned()
        .zip(outputs)
        .map(|(symbol, output)| {
            let fetched = output.unwrap_or_else(|| {
                Err(FetchError::Provider {
                    symbol: symbol.clone(),
                    period,
                    interval,
                    source: ProviderError::internal("fetch task did not complete"),
                })
            });
            (symbol, fetched)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use super::*;
    use crate::adapters::FixtureProvider;
    use crate::client::{ClientOptions, ProviderClient};

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    fn engine(provider: FixtureProvider) -> ChangeEngine {
        ChangeEngine::new(ProviderClient::new(
            Arc::new(provider),
            ClientOptions {
                requests_per_minute: None,
                ..ClientOptions::default()
            },
        ))
    }

    #[tokio::test]
    async fn deltas_are_normalized_by_end_value() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("A"), Period::OneYear, Interval::OneDay, &[10.0, 11.0, 12.0])
            .expect("valid")
            .with_closes(symbol("B"), Period::OneYear, Interval::OneDay, &[20.0, 18.0])
            .expect("valid");

        let report = engine(provider)
            .compare(&[symbol("A"), symbol("B")], Period::OneYear, Interval::OneDay)
            .await;

        assert!(report.is_complete());
        let a = &report.deltas[0];
        assert_eq!(a.delta, 2.0);
        assert_eq!(a.percent, Some(dec("16.67")));
        assert_eq!(a.trend, Trend::Up);

        let b = &report.deltas[1];
        assert_eq!(b.delta, -2.0);
        assert_eq!(b.percent, Some(dec("-11.11")));
        assert_eq!(b.trend, Trend::Down);

        let band = report.band.expect("band");
        assert!(band.contains(10.0) && band.contains(20.0));
    }

    #[tokio::test]
    async fn deltas_use_closes_at_whole_cents() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("A"), Period::OneYear, Interval::OneDay, &[10.004, 11.5, 12.006])
            .expect("valid");

        let report = engine(provider)
            .compare(&[symbol("A")], Period::OneYear, Interval::OneDay)
            .await;

        let a = &report.deltas[0];
        assert_eq!(a.start_value, 10.0);
        assert_eq!(a.end_value, 12.01);
        assert!((a.delta - 2.01).abs() < 1e-9);
        assert_eq!(a.percent, Some(dec("16.74")));

        let band = report.band.expect("band");
        assert!((band.lower - 9.0).abs() < 1e-9, "{band:?}");
        assert!((band.upper - 13.211).abs() < 1e-9, "{band:?}");
    }

    #[tokio::test]
    async fn failing_symbol_does_not_drop_the_other() {
        let provider = FixtureProvider::new()
            .with_closes(symbol("A"), Period::SixMonths, Interval::OneDay, &[10.0, 12.0])
            .expect("valid");

        let report = engine(provider)
            .compare(&[symbol("A"), symbol("MISSING")], Period::SixMonths, Interval::OneDay)
            .await;

        assert_eq!(report.deltas.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, "provider.unknown_symbol");
    }

    #[test]
    fn zero_end_value_has_no_fraction() {
        let provider_series = Series::new(
            symbol("Z"),
            Period::OneMonth,
            Interval::OneDay,
            vec![
                crate::Observation::new(
                    crate::UtcDateTime::from_unix_timestamp(0).expect("ts"),
                    5.0,
                )
                .expect("valid"),
                crate::Observation::new(
                    crate::UtcDateTime::from_unix_timestamp(86_400).expect("ts"),
                    0.0,
                )
                .expect("valid"),
            ],
        )
        .expect("valid series");

        let delta = delta_for_series(&provider_series);
        assert_eq!(delta.delta, -5.0);
        assert_eq!(delta.fraction, None);
        assert_eq!(delta.percent, None);
        assert_eq!(delta.trend, Trend::Down);
    }
}
