use serde::Serialize;
use sharewatch_core::{Interval, Period, Series, Symbol, SymbolDelta, ThresholdBand, Trend};

use crate::cli::CompareArgs;
use crate::error::CliError;
use crate::output::Table;

use super::{failure_errors, percent_cell, CommandResult, Context};

#[derive(Debug, Serialize)]
struct CompareResponseData<'a> {
    period: Period,
    interval: Interval,
    deltas: &'a [SymbolDelta],
    band: Option<ThresholdBand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<&'a [Series]>,
}

pub async fn run(args: &CompareArgs, context: &Context) -> Result<CommandResult, CliError> {
    let period: Period = args.period.parse()?;
    let interval: Interval = args.interval.parse()?;
    let symbols = Symbol::parse_unique(&args.symbols)?;

    let engine = context.engine()?;
    let report = engine.compare(&symbols, period, interval).await;

    let data = CompareResponseData {
        period: report.period,
        interval: report.interval,
        deltas: &report.deltas,
        band: report.band,
        series: args.include_series.then_some(report.series.as_slice()),
    };

    let mut table = Table::new(["Symbol", "Start", "End", "Delta", "Percent", "Trend"]);
    for delta in &report.deltas {
        table.push_row(vec![
            delta.symbol.to_string(),
            format!("{:.2}", delta.start_value),
            format!("{:.2}", delta.end_value),
            format!("{:+.2}", delta.delta),
            percent_cell(delta.percent),
            String::from(match delta.trend {
                Trend::Up => "up",
                Trend::Down => "down",
            }),
        ]);
    }

    let mut result = CommandResult::ok(serde_json::to_value(&data)?)
        .with_errors(failure_errors(&report.failures, engine.client().provider_id())?)
        .with_table(table);
    if report.deltas.is_empty() {
        result = result.with_warning("no symbol could be compared");
    }
    Ok(result)
}
