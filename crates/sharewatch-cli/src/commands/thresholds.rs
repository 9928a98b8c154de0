use serde::Serialize;
use sharewatch_core::{Interval, Observation, Period, Symbol, ThresholdBand};

use crate::cli::ThresholdsArgs;
use crate::error::CliError;
use crate::output::Table;

use super::{failure_errors, CommandResult, Context};

#[derive(Debug, Serialize)]
struct BandRow<'a> {
    symbol: &'a Symbol,
    current_value: f64,
    band: ThresholdBand,
    lower_thresholds: &'a [f64],
    upper_thresholds: &'a [f64],
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<&'a [Observation]>,
}

#[derive(Debug, Serialize)]
struct ThresholdsResponseData<'a> {
    period: Period,
    interval: Interval,
    bands: Vec<BandRow<'a>>,
}

pub async fn run(args: &ThresholdsArgs, context: &Context) -> Result<CommandResult, CliError> {
    let period: Period = args.period.parse()?;
    let interval: Interval = args.interval.parse()?;

    let watchlist = context.watchlist(&args.watchlist).await?;
    let mut result = CommandResult::ok(serde_json::Value::Null);
    if watchlist.is_empty() {
        result = result.with_warning("watchlist has no entries");
    }

    let engine = context.engine()?;
    let report = engine.threshold_bands(&watchlist, period, interval).await;

    let data = ThresholdsResponseData {
        period: report.period,
        interval: report.interval,
        bands: report
            .bands
            .iter()
            .map(|band| BandRow {
                symbol: &band.symbol,
                current_value: band.series.current_value(),
                band: band.band,
                lower_thresholds: &band.lower_thresholds,
                upper_thresholds: &band.upper_thresholds,
                series: args
                    .include_series
                    .then(|| band.series.observations()),
            })
            .collect(),
    };

    let mut table = Table::new(["Symbol", "Current", "Lower", "Upper", "Alerts Low", "Alerts High"]);
    for band in &report.bands {
        table.push_row(vec![
            band.symbol.to_string(),
            format!("{:.2}", band.series.current_value()),
            format!("{:.2}", band.band.lower),
            format!("{:.2}", band.band.upper),
            join_levels(&band.lower_thresholds),
            join_levels(&band.upper_thresholds),
        ]);
    }

    let errors = failure_errors(&report.failures, engine.client().provider_id())?;
    result.data = serde_json::to_value(&data)?;
    Ok(result.with_errors(errors).with_table(table))
}

fn join_levels(levels: &[f64]) -> String {
    levels
        .iter()
        .map(|level| format!("{level:.2}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::join_levels;

    #[test]
    fn alert_levels_are_comma_separated() {
        assert_eq!(join_levels(&[150.0, 280.5]), "150.00,280.50");
        assert_eq!(join_levels(&[]), "");
    }
}
