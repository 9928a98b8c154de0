//! Threshold band calculator.
//!
//! A band is the y-axis range of a price chart: the observed range widened by a
//! multiplicative margin, then widened again so every configured alert level is
//! visible. Closes are taken at whole cents.
//!
//! ```text
//! upper = max(max_close * (1 + margin), configured_upper...)
//! lower = min(min_close * (1 - margin), configured_lower...), clamped at `floor`
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change::{round_to_cents, run_bounded, ChangeEngine, ChangeFailure};
use crate::watchlist::{Watchlist, WatchlistEntry};
use crate::{Interval, Period, Series, Symbol};

/// Smallest half-span substituted for a degenerate band, in price units.
const MIN_HALF_SPAN: f64 = 0.01;

/// Tunables for band computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandOptions {
    /// Fraction of each bound's own magnitude added outward. Must be finite and `>= 0`.
    pub margin: f64,
    /// Lowest allowed lower bound; `None` disables clamping.
    pub floor: Option<f64>,
    /// Half-span of a degenerate band as a fraction of its midpoint.
    pub min_span_fraction: f64,
}

impl Default for BandOptions {
    fn default() -> Self {
        Self {
            margin: 0.10,
            floor: Some(0.0),
            min_span_fraction: 0.01,
        }
    }
}

impl BandOptions {
    pub fn with_margin(margin: f64) -> Self {
        Self {
            margin,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BandError {
    #[error("band margin must be a finite non-negative fraction, got {margin}")]
    InvalidMargin { margin: f64 },
    #[error("configured {side} threshold {value} is not finite")]
    NonFiniteThreshold { side: &'static str, value: f64 },
}

impl BandError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidMargin { .. } => "band.invalid_margin",
            Self::NonFiniteThreshold { .. } => "band.non_finite_threshold",
        }
    }
}

/// Visible y-axis range. Always satisfies `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub lower: f64,
    pub upper: f64,
}

impl ThresholdBand {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Band for one series and its configured alert levels.
pub fn compute_band(
    series: &Series,
    configured_lower: &[f64],
    configured_upper: &[f64],
    options: &BandOptions,
) -> Result<ThresholdBand, BandError> {
    validate(options, configured_lower, configured_upper)?;
    let (min, max) = observed_cents(series);
    Ok(band_from_range(min, max, configured_lower, configured_upper, options))
}

/// Shared band across several series (comparison chart); no alert levels apply.
///
/// Returns `Ok(None)` when `series` is empty.
pub fn compute_combined_band(
    series: &[Series],
    options: &BandOptions,
) -> Result<Option<ThresholdBand>, BandError> {
    validate(options, &[], &[])?;
    let range = series
        .iter()
        .map(observed_cents)
        .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)));
    Ok(range.map(|(min, max)| band_from_range(min, max, &[], &[], options)))
}

/// Observed range with each bound rounded to whole cents.
fn observed_cents(series: &Series) -> (f64, f64) {
    let (min, max) = series.observed_range();
    (round_to_cents(min), round_to_cents(max))
}

fn validate(options: &BandOptions, lower: &[f64], upper: &[f64]) -> Result<(), BandError> {
    if !options.margin.is_finite() || options.margin < 0.0 {
        return Err(BandError::InvalidMargin {
            margin: options.margin,
        });
    }
    let sides = [("lower", lower), ("upper", upper)];
    for (side, values) in sides {
        if let Some(value) = values.iter().copied().find(|value| !value.is_finite()) {
            return Err(BandError::NonFiniteThreshold { side, value });
        }
    }
    Ok(())
}

fn band_from_range(
    min: f64,
    max: f64,
    configured_lower: &[f64],
    configured_upper: &[f64],
    options: &BandOptions,
) -> ThresholdBand {
    let raw_upper = max + max * options.margin;
    let raw_lower = min - min * options.margin;

    let upper = configured_upper.iter().copied().fold(raw_upper, f64::max);
    let lower = configured_lower.iter().copied().fold(raw_lower, f64::min);

    widen_if_degenerate(clamp_floor(lower, options), upper, options)
}

fn clamp_floor(lower: f64, options: &BandOptions) -> f64 {
    options.floor.map_or(lower, |floor| lower.max(floor))
}

/// Substitute a minimum span around the midpoint when `lower >= upper`.
fn widen_if_degenerate(lower: f64, upper: f64, options: &BandOptions) -> ThresholdBand {
    if lower < upper {
        return ThresholdBand { lower, upper };
    }

    let mid = (lower + upper) / 2.0;
    let half = (mid.abs() * options.min_span_fraction.abs()).max(MIN_HALF_SPAN);
    let lower = clamp_floor(mid - half, options);
    let upper = (mid + half).max(lower + MIN_HALF_SPAN);
    tracing::debug!(mid, lower, upper, "widened degenerate band");
    ThresholdBand { lower, upper }
}

/// Chart data for one watched symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolBand {
    pub symbol: Symbol,
    pub band: ThresholdBand,
    pub lower_thresholds: Vec<f64>,
    pub upper_thresholds: Vec<f64>,
    pub series: Series,
}

/// Bands for every watched symbol that could be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdReport {
    pub period: Period,
    pub interval: Interval,
    pub bands: Vec<SymbolBand>,
    pub failures: Vec<ChangeFailure>,
}

impl ThresholdReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl ChangeEngine {
    /// Fetch each watchlist symbol over `(period, interval)` and band it with its alert levels.
    pub async fn threshold_bands(
        &self,
        watchlist: &Watchlist,
        period: Period,
        interval: Interval,
    ) -> ThresholdReport {
        let tasks = watchlist.entries().iter().cloned().map(|entry| {
            let client = self.client().clone();
            async move {
                let fetched = client.fetch_series(&entry.symbol, period, interval).await;
                (entry, fetched)
            }
        });
        let outputs = run_bounded(tasks, self.max_concurrency()).await;

        let mut report = ThresholdReport {
            period,
            interval,
            bands: Vec::new(),
            failures: Vec::new(),
        };
        for (entry, output) in watchlist.entries().iter().zip(outputs) {
            let Some((_, fetched)) = output else {
                report.failures.push(ChangeFailure::symbol(
                    &entry.symbol,
                    "engine.task_failed",
                    "threshold computation for this symbol did not complete",
                ));
                continue;
            };
            match fetched {
                Ok(series) => match band_for_entry(entry, series, self.band_options()) {
                    Ok(band) => report.bands.push(band),
                    Err(error) => report.failures.push(ChangeFailure::symbol(
                        &entry.symbol,
                        error.code(),
                        error.to_string(),
                    )),
                },
                Err(error) => {
                    tracing::warn!(symbol = %entry.symbol, code = error.code(), %error, "no band for symbol");
                    report.failures.push(ChangeFailure::symbol(
                        &entry.symbol,
                        error.code(),
                        error.to_string(),
                    ));
                }
            }
        }
        report
    }
}

fn band_for_entry(
    entry: &WatchlistEntry,
    series: Series,
    options: &BandOptions,
) -> Result<SymbolBand, BandError> {
    let band = compute_band(&series, &entry.lower, &entry.upper, options)?;
    Ok(SymbolBand {
        symbol: entry.symbol.clone(),
        band,
        lower_thresholds: entry.lower.clone(),
        upper_thresholds: entry.upper.clone(),
        series,
    })
}
