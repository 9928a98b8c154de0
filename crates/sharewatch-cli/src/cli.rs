//! CLI argument definitions for sharewatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `numbers` | Percentage change per lookback window |
//! | `thresholds` | Chart bands for watchlist symbols and their alert levels |
//! | `compare` | Start/end deltas for several symbols over one window |
//! | `history` | Recorded daily changes from the local warehouse |
//! | `watchlist` | Validated watchlist entries |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings and errors as failures |
//! | `--config` | `$SHAREWATCH_HOME/config.toml` | Configuration file |
//! | `--source` | from config | Market data provider |
//! | `--cache-mode` | `use` | Series cache behaviour |
//!
//! # Examples
//!
//! ```bash
//! sharewatch numbers AAPL MSFT --windows 1D,1M,1Y --format table
//! sharewatch thresholds --watchlist-file watchlist-us.json --period 6mo
//! sharewatch compare AAPL MSFT CBA.AX --period ytd --pretty
//! sharewatch history AAPL --limit 10
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sharewatch_core::CacheMode;

/// Share-price dashboard back-end.
///
/// Computes percentage changes over standard lookback windows, chart bands
/// around configured alert levels, and side-by-side comparisons.
#[derive(Debug, Parser)]
#[command(
    name = "sharewatch",
    author,
    version,
    about = "Share-price change and threshold dashboard",
    long_about = "sharewatch computes the numbers behind a share-price dashboard:\n\
\n\
  • percentage change over 1D/5D/1M/3M/6M/1Y/3Y/5Y windows\n\
  • chart bands that keep every watchlist alert level visible\n\
  • start/end comparisons across several symbols\n\
  • recorded change history from a local DuckDB warehouse\n\
\n\
Use 'sharewatch <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Configuration file (TOML). Defaults to `$SHAREWATCH_HOME/config.toml` when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Market data provider; overrides the configured source.
    #[arg(long, global = true, value_enum)]
    pub source: Option<SourceSelector>,

    /// Fixture file for the `fixture` source (implies `--source fixture`).
    #[arg(long, global = true)]
    pub fixture: Option<PathBuf>,

    /// Serve deterministic synthetic Yahoo data instead of calling the network.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// How fetches use the series cache.
    #[arg(long, global = true, value_enum, default_value_t = CacheModeArg::Use)]
    pub cache_mode: CacheModeArg,

    /// Per-fetch timeout in milliseconds; overrides the configured value.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Maximum number of symbols fetched concurrently; overrides the configured value.
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table for terminal display.
    Table,
    /// Single JSON envelope.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceSelector {
    /// Yahoo Finance chart API.
    Yahoo,
    /// Local JSON fixture file (see `--fixture`).
    Fixture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheModeArg {
    /// Serve cached series when fresh.
    Use,
    /// Refetch and overwrite cached series.
    Refresh,
    /// Ignore the cache entirely.
    Bypass,
}

impl From<CacheModeArg> for CacheMode {
    fn from(value: CacheModeArg) -> Self {
        match value {
            CacheModeArg::Use => Self::Use,
            CacheModeArg::Refresh => Self::Refresh,
            CacheModeArg::Bypass => Self::Bypass,
        }
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Percentage change of each symbol over lookback windows.
    ///
    /// Without symbols, every watchlist symbol is used.
    ///
    /// # Examples
    ///
    ///   sharewatch numbers AAPL
    ///   sharewatch numbers AAPL MSFT --windows 1D,5D,1Y --format table
    Numbers(NumbersArgs),

    /// Chart bands for each watchlist symbol, widened to show its alert levels.
    ///
    /// # Examples
    ///
    ///   sharewatch thresholds
    ///   sharewatch thresholds --watchlist-file watchlist.json --period 6mo
    Thresholds(ThresholdsArgs),

    /// Start/end delta of several symbols over one shared window.
    ///
    /// # Examples
    ///
    ///   sharewatch compare AAPL MSFT --period 1y
    ///   sharewatch compare CBA.AX BHP.AX --period 5y --include-series
    Compare(CompareArgs),

    /// Recorded daily percentage changes for a symbol.
    ///
    /// # Examples
    ///
    ///   sharewatch history AAPL --limit 10
    History(HistoryArgs),

    /// Load, validate and list the watchlist.
    Watchlist(WatchlistArgs),
}

/// Watchlist location shared by commands that read one.
#[derive(Debug, Args)]
pub struct WatchlistLocation {
    /// Local watchlist JSON file(s); defaults to the configured URLs.
    #[arg(long = "watchlist-file")]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct NumbersArgs {
    /// Symbols to compute (e.g., AAPL, CBA.AX).
    pub symbols: Vec<String>,

    /// Window labels to include, comma separated (default: all standard windows).
    #[arg(long, value_delimiter = ',')]
    pub windows: Vec<String>,

    #[command(flatten)]
    pub watchlist: WatchlistLocation,
}

#[derive(Debug, Args)]
pub struct ThresholdsArgs {
    /// Lookback period of the charted series.
    #[arg(long, default_value = "1y")]
    pub period: String,

    /// Sampling interval of the charted series.
    #[arg(long, default_value = "1d")]
    pub interval: String,

    /// Include the charted closes in the output.
    #[arg(long, default_value_t = false)]
    pub include_series: bool,

    #[command(flatten)]
    pub watchlist: WatchlistLocation,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Symbols to compare.
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    /// Lookback period shared by every symbol.
    #[arg(long, default_value = "1y")]
    pub period: String,

    /// Sampling interval shared by every symbol.
    #[arg(long, default_value = "1d")]
    pub interval: String,

    /// Include the charted closes in the output.
    #[arg(long, default_value_t = false)]
    pub include_series: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Symbol to look up.
    pub symbol: String,

    /// Number of most recent days to return; overrides the configured value.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WatchlistArgs {
    #[command(flatten)]
    pub watchlist: WatchlistLocation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_windows_as_comma_list() {
        let cli = Cli::try_parse_from([
            "sharewatch",
            "numbers",
            "AAPL",
            "--windows",
            "1D,1Y",
            "--cache-mode",
            "bypass",
        ])
        .expect("parse");

        assert_eq!(CacheMode::from(cli.cache_mode), CacheMode::Bypass);
        let Command::Numbers(args) = cli.command else {
            panic!("expected numbers command");
        };
        assert_eq!(args.symbols, vec!["AAPL"]);
        assert_eq!(args.windows, vec!["1D", "1Y"]);
    }

    #[test]
    fn compare_requires_a_symbol() {
        assert!(Cli::try_parse_from(["sharewatch", "compare"]).is_err());
    }

    #[test]
    fn warehouse_is_only_reachable_through_history() {
        let names: Vec<String> = Cli::command()
            .get_subcommands()
            .map(|command| command.get_name().to_owned())
            .filter(|name| name != "help")
            .collect();
        assert_eq!(
            names,
            ["numbers", "thresholds", "compare", "history", "watchlist"]
        );
        assert!(Cli::try_parse_from(["sharewatch", "sql", "DELETE FROM change_snapshots"]).is_err());
    }
}
