use serde::Serialize;
use sharewatch_core::{ChangeHistoryStore, ChangeSnapshot, Symbol};

use crate::cli::HistoryArgs;
use crate::error::CliError;
use crate::output::Table;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    symbol: Symbol,
    limit: usize,
    snapshots: Vec<ChangeSnapshot>,
}

pub fn run(args: &HistoryArgs, context: &Context) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let limit = args.limit.unwrap_or(context.config.history_limit);
    let warehouse = context.warehouse()?;
    recent_changes(&warehouse, symbol, limit)
}

fn recent_changes(
    store: &dyn ChangeHistoryStore,
    symbol: Symbol,
    limit: usize,
) -> Result<CommandResult, CliError> {
    let snapshots = store.query_recent_changes(&symbol, limit)?;

    let mut table = Table::new(["Date", "Change"]);
    for snapshot in &snapshots {
        table.push_row(vec![
            snapshot.date.to_string(),
            format!("{:.2}%", snapshot.percent_change),
        ]);
    }

    let empty = snapshots.is_empty();
    let data = HistoryResponseData {
        symbol: symbol.clone(),
        limit,
        snapshots,
    };
    let mut result = CommandResult::ok(serde_json::to_value(&data)?).with_table(table);
    if empty {
        result = result.with_warning(format!("no recorded changes for {symbol}"));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharewatch_core::InMemoryHistoryStore;
    use time::macros::date;

    #[test]
    fn unknown_symbol_warns_with_empty_history() {
        let store = InMemoryHistoryStore::new();
        let symbol = Symbol::parse("AAPL").expect("symbol");

        let result = recent_changes(&store, symbol, 5).expect("history");
        assert_eq!(result.data["snapshots"], serde_json::json!([]));
        assert_eq!(result.warnings, vec!["no recorded changes for AAPL"]);
    }

    #[test]
    fn history_rows_are_oldest_first() {
        let symbol = Symbol::parse("CBA.AX").expect("symbol");
        let store = InMemoryHistoryStore::new()
            .with_snapshot(symbol.clone(), ChangeSnapshot::new(date!(2024 - 05 - 02), -0.5))
            .with_snapshot(symbol.clone(), ChangeSnapshot::new(date!(2024 - 05 - 01), 1.25));

        let result = recent_changes(&store, symbol, 10).expect("history");
        assert_eq!(result.data["snapshots"][0]["date"], "2024-05-01");
        assert_eq!(result.data["snapshots"][1]["percent_change"], -0.5);
        assert!(result.warnings.is_empty());
        assert_eq!(result.table.map(|table| table.len()), Some(2));
    }
}
