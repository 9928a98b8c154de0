use crate::cli::WatchlistArgs;
use crate::error::CliError;
use crate::output::Table;

use super::{CommandResult, Context};

pub async fn run(args: &WatchlistArgs, context: &Context) -> Result<CommandResult, CliError> {
    let watchlist = context.watchlist(&args.watchlist).await?;

    let mut table = Table::new(["Symbol", "Lower", "Upper"]);
    for entry in watchlist.entries() {
        table.push_row(vec![
            entry.symbol.to_string(),
            format_levels(&entry.lower),
            format_levels(&entry.upper),
        ]);
    }

    let mut result = CommandResult::ok(serde_json::to_value(&watchlist)?).with_table(table);
    if watchlist.is_empty() {
        result = result.with_warning("watchlist has no entries");
    }
    Ok(result)
}

fn format_levels(levels: &[f64]) -> String {
    if levels.is_empty() {
        return String::from("-");
    }
    levels
        .iter()
        .map(|level| format!("{level:.2}"))
        .collect::<Vec<_>>()
        .join(",")
}
