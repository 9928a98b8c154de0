use serde::Serialize;
use sharewatch_core::{ChangeRecord, ChangeWindows, Symbol, WindowLabel};

use crate::cli::NumbersArgs;
use crate::error::CliError;
use crate::output::Table;

use super::{failure_errors, percent_cell, CommandResult, Context};

#[derive(Debug, Serialize)]
struct NumbersRow<'a> {
    #[serde(flatten)]
    record: &'a ChangeRecord,
    best_window: Option<&'a WindowLabel>,
}

#[derive(Debug, Serialize)]
struct NumbersResponseData<'a> {
    windows: Vec<&'a WindowLabel>,
    records: Vec<NumbersRow<'a>>,
}

pub async fn run(args: &NumbersArgs, context: &Context) -> Result<CommandResult, CliError> {
    let windows = if args.windows.is_empty() {
        ChangeWindows::standard()
    } else {
        ChangeWindows::standard().select(&args.windows)?
    };

    let symbols = if args.symbols.is_empty() {
        context.watchlist(&args.watchlist).await?.symbols()
    } else {
        Symbol::parse_unique(&args.symbols)?
    };
    if symbols.is_empty() {
        return Err(CliError::Command(String::from(
            "no symbols given and the watchlist is empty",
        )));
    }

    let engine = context.engine()?;
    let report = engine.compute_change_records(&symbols, &windows).await;

    let labels: Vec<&WindowLabel> = windows.iter().map(|window| &window.label).collect();
    let data = NumbersResponseData {
        windows: labels.clone(),
        records: report
            .records
            .iter()
            .map(|record| NumbersRow {
                record,
                best_window: record.best_window(),
            })
            .collect(),
    };

    let mut headers = vec![String::from("Symbol"), String::from("Current")];
    headers.extend(labels.iter().map(|label| label.to_string()));
    headers.push(String::from("Best"));
    let mut table = Table::new(headers);
    for record in &report.records {
        let mut row = vec![record.symbol.to_string(), record.current_display.clone()];
        row.extend(
            labels
                .iter()
                .map(|label| percent_cell(record.percent(label.as_str()))),
        );
        row.push(
            record
                .best_window()
                .map_or_else(String::new, ToString::to_string),
        );
        table.push_row(row);
    }

    let errors = failure_errors(&report.failures, engine.client().provider_id())?;
    Ok(CommandResult::ok(serde_json::to_value(&data)?)
        .with_errors(errors)
        .with_table(table))
}
