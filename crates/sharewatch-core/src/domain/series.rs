use serde::{Deserialize, Serialize};

use crate::{Interval, Period, SeriesError, Symbol, UtcDateTime, ValidationError};

/// Single closing price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub ts: UtcDateTime,
    pub close: f64,
}

impl Observation {
    pub fn new(ts: UtcDateTime, close: f64) -> Result<Self, ValidationError> {
        validate_price(close)?;
        Ok(Self { ts, close })
    }
}

/// Ordered, non-empty closes for one symbol over one (period, interval) request.
///
/// Construction is the only way in, so every `Series` in circulation has at least one
/// observation, strictly ascending timestamps and finite non-negative prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    symbol: Symbol,
    period: Period,
    interval: Interval,
    observations: Vec<Observation>,
}

impl Series {
    pub fn new(
        symbol: Symbol,
        period: Period,
        interval: Interval,
        observations: Vec<Observation>,
    ) -> Result<Self, SeriesError> {
        if observations.is_empty() {
            return Err(SeriesError::EmptySeries {
                symbol,
                period,
                interval,
            });
        }

        for (index, observation) in observations.iter().enumerate() {
            if let Err(source) = validate_price(observation.close) {
                return Err(SeriesError::InvalidObservation {
                    symbol,
                    index,
                    source,
                });
            }
        }

        if let Some(index) = observations
            .windows(2)
            .position(|pair| pair[1].ts <= pair[0].ts)
        {
            return Err(SeriesError::UnorderedObservations {
                symbol,
                index: index + 1,
            });
        }

        Ok(Self {
            symbol,
            period,
            interval,
            observations,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub const fn period(&self) -> Period {
        self.period
    }

    pub const fn interval(&self) -> Interval {
        self.interval
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> &Observation {
        &self.observations[0]
    }

    pub fn last(&self) -> &Observation {
        &self.observations[self.observations.len() - 1]
    }

    /// Close of the earliest observation.
    pub fn reference_value(&self) -> f64 {
        self.first().close
    }

    /// Close of the latest observation.
    pub fn current_value(&self) -> f64 {
        self.last().close
    }

    /// Observed `(min, max)` close.
    pub fn observed_range(&self) -> (f64, f64) {
        let first = self.first().close;
        self.observations
            .iter()
            .skip(1)
            .fold((first, first), |(min, max), observation| {
                (min.min(observation.close), max.max(observation.close))
            })
    }
}

fn validate_price(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field: "close" });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field: "close" });
    }
    Ok(())
}
